//! Shared row vocabulary: status/type constants and timestamp helpers
//!
//! SQLite stores timestamps as TEXT. Everything is written in UTC with a
//! fixed millisecond format so string comparison in SQL is time comparison.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::MissionError;

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Format an instant for a TEXT column
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a TEXT column written by [`format_timestamp`] (or SQLite's
/// `datetime('now')` format)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MissionError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| MissionError::Database(format!("Bad timestamp {:?}: {}", raw, e)))
}

/// Get current UTC timestamp for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

// ============================================================================
// Assignment Status
// ============================================================================

/// Assignment lifecycle. Only `assigned` is non-terminal.
pub mod assignment_status {
    pub const ASSIGNED: &str = "assigned";
    pub const COMPLETE: &str = "complete";
    pub const SKIPPED: &str = "skipped";
    pub const EXPIRED: &str = "expired";

    pub const ALL: [&str; 4] = [ASSIGNED, COMPLETE, SKIPPED, EXPIRED];

    /// Check if a status is valid
    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }

    /// Check if a status is terminal
    pub fn is_terminal(status: &str) -> bool {
        status != ASSIGNED
    }
}

// ============================================================================
// Mission Types
// ============================================================================

pub mod mission_types {
    pub const INSTANT: &str = "instant";
    pub const HABIT: &str = "habit";
    pub const ACTION: &str = "action";
    pub const AR_OPTIONAL: &str = "ar_optional";

    pub const ALL: [&str; 4] = [INSTANT, HABIT, ACTION, AR_OPTIONAL];

    pub fn is_valid(mission_type: &str) -> bool {
        ALL.contains(&mission_type)
    }
}
