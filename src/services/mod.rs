//! Service layer for the mission engine
//!
//! Services sit between callers (the CLI, or an HTTP layer in the host app)
//! and the repositories in `db/`. Each one adds:
//! - Input validation
//! - Transaction boundaries (`BEGIN IMMEDIATE` for writers)
//! - Event emission
//!
//! ## Architecture
//!
//! ```text
//! Caller (CLI / host app)
//!     ↓
//! Service Layer (recommend, complete, admin)
//!     ↓
//! Scoring / Selection / Leveling (pure)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod mission_service;
pub mod completion_service;
pub mod admin_service;

// Re-exports
pub use events::{EventBus, EventListener, MissionEvent};
pub use mission_service::{MissionService, TodaySummary};
pub use completion_service::{CompletionOutcome, CompletionService};
pub use admin_service::AdminService;

use std::sync::Arc;

use crate::business_day::{BusinessDay, Clock, SystemClock};
use crate::context::{ContextProvider, SqliteContextProvider};
use crate::db::MissionDb;
use crate::recommend_config::RecommendConfigCache;

/// Service container sharing one database, clock and event bus
pub struct Services {
    pub missions: Arc<MissionService>,
    pub completion: Arc<CompletionService>,
    pub admin: Arc<AdminService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Services on the system clock, reading emotion context from the same database
    pub fn new(db: Arc<MissionDb>, config: Arc<RecommendConfigCache>, day: BusinessDay) -> Self {
        let context = Arc::new(SqliteContextProvider::new(db.clone()));
        Self::with_parts(db, config, context, Arc::new(SystemClock), day)
    }

    /// Services with an explicit context provider and clock (tests, embedding)
    pub fn with_parts(
        db: Arc<MissionDb>,
        config: Arc<RecommendConfigCache>,
        context: Arc<dyn ContextProvider>,
        clock: Arc<dyn Clock>,
        day: BusinessDay,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            missions: Arc::new(MissionService::new(
                db.clone(),
                config,
                context,
                clock.clone(),
                day,
                events.clone(),
            )),
            completion: Arc::new(CompletionService::new(db.clone(), clock.clone(), events.clone())),
            admin: Arc::new(AdminService::new(db, clock, day, events.clone())),
            events,
        }
    }
}
