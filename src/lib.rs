//! Plant Missions - daily self-care missions for a plant companion app
//!
//! Each business day (KST, rolling over at 03:00) a user is handed up to
//! three small missions. Finishing one feeds the user's plant experience;
//! enough experience levels the plant up.
//!
//! ## Pipeline
//!
//! ```text
//! catalog (active, burden <= ceiling)
//!     → score: time-of-day bonus + type adjustment + jitter
//!              + emotion context + novelty penalty
//!     → select: top-K, softmax sample, epsilon exploration, type diversity
//!     → assign: BEGIN IMMEDIATE, same-day re-check, insert
//! ```
//!
//! Completion runs under the same write lock: validate the row, compute
//! the reward (AR bonus when the required gesture is confirmed), level the
//! plant and mark the row complete.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/plant-missions/
//! ├── missions.db            # SQLite: catalog, assignments, plants, emotion logs
//! └── config.toml            # Service configuration
//! ```

pub mod config;
pub mod error;
pub mod business_day;
pub mod recommend_config;
pub mod db;
pub mod context;
pub mod scoring;
pub mod selection;
pub mod leveling;
pub mod services;

// Re-exports
pub use config::Config;
pub use error::MissionError;
pub use business_day::{BusinessDay, Clock, FixedClock, SystemClock, TimeBucket};
pub use recommend_config::{ConfigSources, RecommendConfig, RecommendConfigCache};
pub use db::MissionDb;
pub use context::{ContextProvider, EmotionContext, SqliteContextProvider, StaticContextProvider};
pub use leveling::{CompletionEvidence, RewardSummary};
pub use services::{
    AdminService, CompletionOutcome, CompletionService, EventBus, MissionEvent, MissionService, Services,
    TodaySummary,
};
