//! Mission completion and plant rewards
//!
//! Completing an assignment takes the write lock, validates the row,
//! computes experience, levels the plant and marks the row complete in one
//! transaction. A second completion of the same row changes nothing.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::business_day::Clock;
use crate::db::{self, assignments, missions, models::assignment_status, plants, MissionDb, PlantRow};
use crate::error::MissionError;
use crate::leveling::{
    apply_flat, apply_reward, compute_reward, CompletionEvidence, PlantProgress, PlantStatus, RewardSummary,
};

use super::events::{EventBus, MissionEvent};
use super::mission_service::validate_user_id;

/// Result of a completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Reward applied
    Completed(RewardSummary),
    /// Row was already complete; no additional gain
    AlreadyCompleted(RewardSummary),
    /// Past its deadline or marked expired
    Expired,
    /// Row is in some other state (e.g. skipped)
    NotAssignable { status: String },
}

impl CompletionOutcome {
    pub fn exp_gained(&self) -> i64 {
        match self {
            Self::Completed(summary) => summary.exp_gained,
            _ => 0,
        }
    }
}

fn plant_status(plant: &PlantRow) -> PlantStatus {
    PlantStatus {
        level: plant.level,
        experience: plant.experience,
        leveled_up: false,
    }
}

fn plant_not_found(user_id: i64) -> MissionError {
    MissionError::NotFound(format!("Plant for user {} not found", user_id))
}

/// Completion service
pub struct CompletionService {
    db: Arc<MissionDb>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl CompletionService {
    pub fn new(db: Arc<MissionDb>, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self { db, clock, events }
    }

    /// Complete one of the caller's assignments
    pub fn complete(
        &self,
        user_id: i64,
        assignment_id: i64,
        evidence: CompletionEvidence,
    ) -> Result<CompletionOutcome, MissionError> {
        validate_user_id(user_id)?;
        if assignment_id <= 0 {
            return Err(MissionError::InvalidInput(format!("Invalid assignment id: {}", assignment_id)));
        }

        let now = self.clock.now();

        let outcome = self.db.with_conn_mut(|conn| {
            let tx = db::begin_immediate(conn)?;

            let row = assignments::get_assignment(&tx, assignment_id)?
                .filter(|row| row.user_id == user_id)
                .ok_or_else(|| MissionError::NotFound(format!("Assignment {} not found", assignment_id)))?;

            if row.is_expired_at(now) {
                return Ok(CompletionOutcome::Expired);
            }

            if row.is_complete() {
                let plant = plants::get_plant(&tx, user_id)?.ok_or_else(|| plant_not_found(user_id))?;
                return Ok(CompletionOutcome::AlreadyCompleted(RewardSummary::already_completed(
                    plant_status(&plant),
                )));
            }

            if assignment_status::is_terminal(&row.status) {
                return Ok(CompletionOutcome::NotAssignable { status: row.status });
            }

            let mission = missions::get_mission(&tx, row.mission_id)?
                .ok_or_else(|| MissionError::NotFound(format!("Mission {} not found", row.mission_id)))?;
            let plant = plants::get_plant(&tx, user_id)?.ok_or_else(|| plant_not_found(user_id))?;

            let reward = compute_reward(&mission, &evidence);
            let progress = PlantProgress {
                level: plant.level,
                experience: plant.experience,
                likeability: plant.likeability,
            };
            let status = match apply_reward(progress, reward.total()) {
                Ok(status) => status,
                Err(e) => {
                    warn!(user_id, error = %e, "Leveling failed, applying experience without level checks");
                    apply_flat(progress, reward.total())
                }
            };

            plants::update_progress(&tx, user_id, status.level, status.experience)?;
            assignments::mark_complete(&tx, assignment_id, now, &evidence.normalized())?;

            tx.commit()
                .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;

            Ok(CompletionOutcome::Completed(RewardSummary::completed(reward, status)))
        })?;

        if let CompletionOutcome::Completed(summary) = &outcome {
            info!(
                user_id,
                assignment_id,
                exp_gained = summary.exp_gained,
                level = summary.plant_status.level,
                "Mission completed"
            );
            self.events.emit(MissionEvent::MissionCompleted {
                user_id,
                assignment_id,
                exp_gained: summary.exp_gained,
            });
            if summary.plant_status.leveled_up {
                self.events.emit(MissionEvent::PlantLeveledUp {
                    user_id,
                    level: summary.plant_status.level,
                });
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_day::FixedClock;
    use crate::db::CreateMissionInput;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn setup(exp_reward: i64) -> (CompletionService, Arc<MissionDb>, Arc<FixedClock>, i64) {
        let db = Arc::new(MissionDb::open_in_memory().unwrap());
        let assignment_id = db
            .with_conn(|conn| {
                let mission = missions::upsert_mission(conn, CreateMissionInput {
                    code: "wave_at_plant".into(),
                    title: "Wave at your plant".into(),
                    description: None,
                    mission_type: "ar_optional".into(),
                    burden: 1,
                    exp_reward,
                    ar_bonus_exp: 5,
                    requires_ar_action: Some("wave".into()),
                    cooldown_sec: 0,
                    is_active: true,
                })?;
                plants::adopt_plant(conn, 1, Some("Fern"))?;
                assignments::insert_assignment(conn, 1, mission.id, t0(), t0() + Duration::hours(18))
            })
            .unwrap();

        let clock = Arc::new(FixedClock::new(t0() + Duration::hours(1)));
        let svc = CompletionService::new(db.clone(), clock.clone(), Arc::new(EventBus::new()));
        (svc, db, clock, assignment_id)
    }

    #[test]
    fn test_complete_with_ar_bonus() {
        let (svc, db, _, id) = setup(10);
        let evidence = CompletionEvidence {
            ar_used: Some(true),
            ar_action: Some("wave".into()),
            evidence: None,
        };

        let outcome = svc.complete(1, id, evidence).unwrap();
        let CompletionOutcome::Completed(summary) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(summary.base_exp, 10);
        assert_eq!(summary.ar_bonus, 5);
        assert_eq!(summary.exp_gained, 15);
        assert_eq!(summary.plant_status.experience, 15);

        let row = db.with_conn(|c| assignments::get_assignment(c, id)).unwrap().unwrap();
        assert!(row.is_complete());
        assert_eq!(row.evidence.unwrap()["arUsed"], true);
    }

    #[test]
    fn test_second_completion_gains_nothing() {
        let (svc, db, _, id) = setup(10);
        assert_eq!(svc.complete(1, id, CompletionEvidence::default()).unwrap().exp_gained(), 10);

        let again = svc.complete(1, id, CompletionEvidence::default()).unwrap();
        assert!(matches!(again, CompletionOutcome::AlreadyCompleted(ref s) if s.exp_gained == 0));
        let plant = db.with_conn(|c| plants::get_plant(c, 1)).unwrap().unwrap();
        assert_eq!(plant.experience, 10);
    }

    #[test]
    fn test_expired_by_clock() {
        let (svc, db, clock, id) = setup(10);
        clock.advance(Duration::days(1));
        assert_eq!(svc.complete(1, id, CompletionEvidence::default()).unwrap(), CompletionOutcome::Expired);

        let plant = db.with_conn(|c| plants::get_plant(c, 1)).unwrap().unwrap();
        assert_eq!(plant.experience, 0);
    }

    #[test]
    fn test_other_user_and_skipped() {
        let (svc, db, _, id) = setup(10);
        assert!(matches!(svc.complete(2, id, CompletionEvidence::default()), Err(MissionError::NotFound(_))));

        db.with_conn(|c| assignments::set_status(c, id, assignment_status::SKIPPED)).unwrap();
        assert_eq!(
            svc.complete(1, id, CompletionEvidence::default()).unwrap(),
            CompletionOutcome::NotAssignable { status: "skipped".into() }
        );
    }

    #[test]
    fn test_level_up_emits_event() {
        let (svc, db, _, id) = setup(20);
        db.with_conn(|c| plants::update_progress(c, 1, 1, 90)).unwrap();
        let mut receiver = svc.events.subscribe();

        let outcome = svc.complete(1, id, CompletionEvidence::default()).unwrap();
        let CompletionOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.plant_status, PlantStatus { level: 2, experience: 10, leveled_up: true });

        assert!(matches!(receiver.try_recv().unwrap(), MissionEvent::MissionCompleted { exp_gained: 20, .. }));
        assert_eq!(receiver.try_recv().unwrap(), MissionEvent::PlantLeveledUp { user_id: 1, level: 2 });
    }

    #[test]
    fn test_corrupt_plant_degrades_to_flat_gain() {
        let (svc, db, _, id) = setup(10);
        db.with_conn(|c| {
            c.execute("UPDATE plants SET likeability = 400 WHERE user_id = 1", [])
                .map_err(|e| MissionError::Database(e.to_string()))
        })
        .unwrap();

        let outcome = svc.complete(1, id, CompletionEvidence::default()).unwrap();
        assert_eq!(outcome.exp_gained(), 10);
        let plant = db.with_conn(|c| plants::get_plant(c, 1)).unwrap().unwrap();
        assert_eq!((plant.level, plant.experience), (1, 10));
    }
}
