//! Daily recommendation service
//!
//! Hands each user up to three missions per business day. Scoring and
//! selection run without the write lock; the insert step re-checks under
//! `BEGIN IMMEDIATE` so concurrent calls for one user end with one batch.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::business_day::{BusinessDay, Clock};
use crate::context::{ContextProvider, EmotionContext};
use crate::db::{self, assignments, history, missions, AssignmentRow, MissionDb};
use crate::error::MissionError;
use crate::recommend_config::RecommendConfigCache;
use crate::scoring::score_all;
use crate::selection::select;

use super::events::{EventBus, MissionEvent};

/// One of today's missions as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub id: i64,
    pub mission_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub category: String,
    pub reward_exp: i64,
}

impl From<AssignmentRow> for TodaySummary {
    fn from(row: AssignmentRow) -> Self {
        Self {
            id: row.id,
            mission_id: row.mission_id,
            completed: row.is_complete(),
            title: row.mission_title,
            description: row.mission_description,
            category: row.mission_type,
            reward_exp: row.exp_reward,
        }
    }
}

pub(crate) fn validate_user_id(user_id: i64) -> Result<(), MissionError> {
    if user_id <= 0 {
        return Err(MissionError::InvalidInput(format!("Invalid user id: {}", user_id)));
    }
    Ok(())
}

/// Recommendation service
pub struct MissionService {
    db: Arc<MissionDb>,
    config: Arc<RecommendConfigCache>,
    context: Arc<dyn ContextProvider>,
    clock: Arc<dyn Clock>,
    day: BusinessDay,
    rng: Mutex<StdRng>,
    events: Arc<EventBus>,
}

impl MissionService {
    pub fn new(
        db: Arc<MissionDb>,
        config: Arc<RecommendConfigCache>,
        context: Arc<dyn ContextProvider>,
        clock: Arc<dyn Clock>,
        day: BusinessDay,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            config,
            context,
            clock,
            day,
            rng: Mutex::new(StdRng::from_entropy()),
            events,
        }
    }

    /// Replace the random source with a seeded one (reproducible draws)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Today's missions for a user
    pub fn get_today(&self, user_id: i64) -> Result<Vec<TodaySummary>, MissionError> {
        validate_user_id(user_id)?;
        let day_start = self.day.start_of_day(self.clock.now());

        let rows = self.db.with_conn(|conn| assignments::list_since(conn, user_id, day_start))?;
        Ok(rows.into_iter().map(TodaySummary::from).collect())
    }

    /// Return today's missions, choosing and assigning a fresh set first if
    /// the user has none yet
    pub fn recommend_if_empty(&self, user_id: i64, count: usize) -> Result<Vec<TodaySummary>, MissionError> {
        validate_user_id(user_id)?;

        let now = self.clock.now();
        let day_start = self.day.start_of_day(now);

        let existing = self.db.with_conn(|conn| assignments::list_since(conn, user_id, day_start))?;
        if !existing.is_empty() {
            debug!(user_id, count = existing.len(), "Missions already assigned today");
            return Ok(existing.into_iter().map(TodaySummary::from).collect());
        }

        let config = self.config.get()?;
        let catalog = self.db.with_conn(|conn| missions::list_active_missions(conn, config.burden_max))?;
        if catalog.is_empty() {
            info!(user_id, burden_max = ?config.burden_max, "No eligible missions to recommend");
            return Ok(Vec::new());
        }

        let context = match self.context.latest_context(user_id) {
            Ok(context) => context,
            Err(e) => {
                warn!(user_id, error = %e, "Emotion context unavailable, using neutral context");
                EmotionContext::neutral()
            }
        };

        let recent = self.db.with_conn(|conn| {
            history::load_recent_counts(conn, user_id, now, None, None, &config.novelty)
        })?;

        let bucket = self.day.bucket(now);
        let picks = {
            let mut rng = self.rng.lock()
                .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;
            let ranked = score_all(&catalog, bucket, &context, &recent, &config, &mut *rng);
            select(&ranked, count, &config, &mut *rng)
        };
        let mission_ids: Vec<i64> = picks.iter().map(|c| c.mission.id).collect();
        let expires_at = self.day.next_expiry(now);

        let batch = self.db.with_conn_mut(|conn| {
            let tx = db::begin_immediate(conn)?;

            // Another request may have assigned while we were scoring
            let raced = !assignments::list_since(&tx, user_id, day_start)?.is_empty();
            let batch = if raced {
                assignments::BatchInsertResult::default()
            } else {
                assignments::insert_batch(&tx, user_id, &mission_ids, now, day_start, expires_at)?
            };

            tx.commit()
                .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;
            Ok(batch)
        })?;

        if batch.inserted.is_empty() {
            debug!(user_id, "Concurrent request already assigned today's missions");
        } else {
            info!(
                user_id,
                bucket = %bucket,
                count = batch.inserted.len(),
                skipped = batch.skipped.len(),
                "Assigned daily missions"
            );
            self.events.emit(MissionEvent::MissionsAssigned {
                user_id,
                assignment_ids: batch.inserted.clone(),
            });
        }

        self.get_today(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_day::FixedClock;
    use crate::context::StaticContextProvider;
    use crate::db::CreateMissionInput;
    use crate::recommend_config::RecommendConfig;
    use chrono::{TimeZone, Utc};

    struct FailingProvider;

    impl ContextProvider for FailingProvider {
        fn latest_context(&self, _user_id: i64) -> Result<EmotionContext, MissionError> {
            Err(MissionError::Database("emotion store offline".into()))
        }
    }

    fn mission(code: &str, mission_type: &str) -> CreateMissionInput {
        CreateMissionInput {
            code: code.into(),
            title: code.into(),
            description: None,
            mission_type: mission_type.into(),
            burden: 1,
            exp_reward: 10,
            ar_bonus_exp: 0,
            requires_ar_action: None,
            cooldown_sec: 0,
            is_active: true,
        }
    }

    fn service(provider: Arc<dyn ContextProvider>) -> (MissionService, Arc<MissionDb>) {
        let db = Arc::new(MissionDb::open_in_memory().unwrap());
        db.with_conn_mut(|conn| {
            missions::bulk_upsert_missions(conn, vec![
                mission("drink_water", "habit"),
                mission("breathing_1min", "instant"),
                mission("talk_to_plant", "instant"),
                mission("walk_outside", "action"),
            ])
        })
        .unwrap();

        // 2024-03-01 09:00 KST
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        let svc = MissionService::new(
            db.clone(),
            Arc::new(RecommendConfigCache::preloaded(RecommendConfig::default())),
            provider,
            clock,
            BusinessDay::kst(),
            Arc::new(EventBus::new()),
        )
        .with_seed(3);
        (svc, db)
    }

    #[test]
    fn test_recommend_assigns_three_and_is_idempotent() {
        let (svc, db) = service(Arc::new(StaticContextProvider(EmotionContext::neutral())));

        let first = svc.recommend_if_empty(1, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|m| !m.completed));

        let second = svc.recommend_if_empty(1, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.stats().unwrap().assignment_count, 3);
    }

    #[test]
    fn test_context_failure_degrades_to_neutral() {
        let (svc, _) = service(Arc::new(FailingProvider));
        assert_eq!(svc.recommend_if_empty(1, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_user_rejected() {
        let (svc, _) = service(Arc::new(StaticContextProvider(EmotionContext::neutral())));
        assert!(matches!(svc.recommend_if_empty(0, 3), Err(MissionError::InvalidInput(_))));
        assert!(matches!(svc.get_today(-4), Err(MissionError::InvalidInput(_))));
    }

    #[test]
    fn test_events_emitted_on_assignment() {
        let (svc, _) = service(Arc::new(StaticContextProvider(EmotionContext::neutral())));
        let mut receiver = svc.events.subscribe();

        svc.recommend_if_empty(9, 2).unwrap();
        match receiver.try_recv().unwrap() {
            MissionEvent::MissionsAssigned { user_id, assignment_ids } => {
                assert_eq!(user_id, 9);
                assert_eq!(assignment_ids.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // second call assigns nothing new
        svc.recommend_if_empty(9, 2).unwrap();
        assert!(receiver.try_recv().is_err());
    }
}
