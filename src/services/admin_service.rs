//! Operator-side operations
//!
//! Force-assigning by code, clearing a day, the expiry sweep, catalog
//! seeding and plant adoption. None of these go through scoring.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::business_day::{BusinessDay, Clock};
use crate::db::{self, assignments, missions, plants, AssignmentRow, CreateMissionInput, MissionDb, PlantRow};
use crate::error::MissionError;

use super::events::{EventBus, MissionEvent};
use super::mission_service::validate_user_id;

pub struct AdminService {
    db: Arc<MissionDb>,
    clock: Arc<dyn Clock>,
    day: BusinessDay,
    events: Arc<EventBus>,
}

impl AdminService {
    pub fn new(db: Arc<MissionDb>, clock: Arc<dyn Clock>, day: BusinessDay, events: Arc<EventBus>) -> Self {
        Self { db, clock, day, events }
    }

    // =========================================================================
    // Assignments
    // =========================================================================

    /// Assign specific missions for today, skipping codes the user already
    /// has today. Returns the newly created rows.
    pub fn assign_today_by_codes(&self, user_id: i64, codes: &[String]) -> Result<Vec<AssignmentRow>, MissionError> {
        validate_user_id(user_id)?;

        let mut seen = HashSet::new();
        let codes: Vec<String> = codes
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let day_start = self.day.start_of_day(now);
        let expires_at = self.day.next_expiry(now);

        let found = self.db.with_conn(|conn| missions::get_missions_by_codes(conn, &codes))?;
        let mut mission_ids = Vec::with_capacity(codes.len());
        for code in &codes {
            match found.iter().find(|m| &m.code == code) {
                Some(m) if m.is_active => mission_ids.push(m.id),
                Some(_) => warn!(code = %code, "Skipping inactive mission"),
                None => warn!(code = %code, "Skipping unknown mission code"),
            }
        }

        let batch = self.db.with_conn_mut(|conn| {
            let tx = db::begin_immediate(conn)?;
            let batch = assignments::insert_batch(&tx, user_id, &mission_ids, now, day_start, expires_at)?;
            tx.commit()
                .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;
            Ok(batch)
        })?;

        if !batch.inserted.is_empty() {
            info!(user_id, count = batch.inserted.len(), skipped = batch.skipped.len(), "Force-assigned missions");
            self.events.emit(MissionEvent::MissionsAssigned {
                user_id,
                assignment_ids: batch.inserted.clone(),
            });
        }

        self.db.with_conn(|conn| {
            batch
                .inserted
                .iter()
                .filter_map(|&id| assignments::get_assignment(conn, id).transpose())
                .collect()
        })
    }

    /// Delete every assignment the user received today; returns what was removed
    pub fn clear_today(&self, user_id: i64) -> Result<Vec<AssignmentRow>, MissionError> {
        validate_user_id(user_id)?;
        let day_start = self.day.start_of_day(self.clock.now());

        let removed = self.db.with_conn_mut(|conn| {
            let tx = db::begin_immediate(conn)?;
            let rows = assignments::list_since(&tx, user_id, day_start)?;
            assignments::delete_since(&tx, user_id, day_start)?;
            tx.commit()
                .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;
            Ok(rows)
        })?;

        info!(user_id, removed = removed.len(), "Cleared today's missions");
        self.events.emit(MissionEvent::TodayCleared {
            user_id,
            removed: removed.len(),
        });

        Ok(removed)
    }

    /// Mark every overdue `assigned` row as `expired`
    pub fn expire_overdue(&self) -> Result<usize, MissionError> {
        let now = self.clock.now();

        let count = self.db.with_conn_mut(|conn| {
            let tx = db::begin_immediate(conn)?;
            let count = assignments::expire_overdue(&tx, now)?;
            tx.commit()
                .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;
            Ok(count)
        })?;

        if count > 0 {
            info!(count, "Expired overdue assignments");
            self.events.emit(MissionEvent::AssignmentsExpired { count });
        }

        Ok(count)
    }

    // =========================================================================
    // Catalog and plants
    // =========================================================================

    /// Load mission definitions; all or nothing
    pub fn seed_catalog(&self, items: Vec<CreateMissionInput>) -> Result<usize, MissionError> {
        for (i, item) in items.iter().enumerate() {
            if let Err(e) = item.validate() {
                return Err(MissionError::InvalidInput(format!("item[{}]: {}", i, e)));
            }
        }

        let count = self.db.with_conn_mut(|conn| missions::bulk_upsert_missions(conn, items))?;
        info!(count, "Seeded mission catalog");
        Ok(count)
    }

    /// Create a level-1 plant for a user (existing plants are returned as is)
    pub fn adopt_plant(&self, user_id: i64, name: Option<&str>) -> Result<PlantRow, MissionError> {
        validate_user_id(user_id)?;
        self.db.with_conn(|conn| plants::adopt_plant(conn, user_id, name))
    }

    pub fn plant(&self, user_id: i64) -> Result<PlantRow, MissionError> {
        validate_user_id(user_id)?;
        self.db
            .with_conn(|conn| plants::get_plant(conn, user_id))?
            .ok_or_else(|| MissionError::NotFound(format!("Plant for user {} not found", user_id)))
    }
}
