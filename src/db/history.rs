//! Recent mission history for novelty scoring
//!
//! Counts, per mission, how often a user was handed (or finished) it in a
//! rolling window. A row counts once if either its assignment or its
//! completion timestamp falls inside the window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use super::models::{assignment_status, format_timestamp};
use crate::error::MissionError;
use crate::recommend_config::{NoveltyConfig, MAX_HISTORY_DAYS};

/// missionId -> occurrences in the window (absent means 0)
pub type HistoryCounts = HashMap<i64, u32>;

/// Keep only known statuses; fall back to the configured set when nothing
/// valid remains
pub fn resolve_statuses(requested: Option<&[String]>, defaults: &NoveltyConfig) -> Vec<String> {
    let valid: Vec<String> = requested
        .unwrap_or(&[])
        .iter()
        .filter(|s| {
            let ok = assignment_status::is_valid(s);
            if !ok {
                warn!(status = %s, "Ignoring unknown status in history filter");
            }
            ok
        })
        .cloned()
        .collect();

    if !valid.is_empty() {
        return valid;
    }

    let fallback: Vec<String> = defaults
        .statuses
        .iter()
        .filter(|s| assignment_status::is_valid(s))
        .cloned()
        .collect();

    if fallback.is_empty() {
        vec![
            assignment_status::ASSIGNED.to_string(),
            assignment_status::COMPLETE.to_string(),
        ]
    } else {
        fallback
    }
}

/// Aggregate per-mission occurrence counts for `user_id`
///
/// `days` defaults to the configured window and is clamped to
/// [1, MAX_HISTORY_DAYS].
pub fn load_recent_counts(
    conn: &Connection,
    user_id: i64,
    now: DateTime<Utc>,
    days: Option<i64>,
    statuses: Option<&[String]>,
    defaults: &NoveltyConfig,
) -> Result<HistoryCounts, MissionError> {
    let days = days.unwrap_or(defaults.window_days).clamp(1, MAX_HISTORY_DAYS);
    let statuses = resolve_statuses(statuses, defaults);
    let since = format_timestamp(now - Duration::days(days));

    let placeholders: Vec<_> = statuses.iter().map(|_| "?").collect();
    let sql = format!(
        r#"
        SELECT mission_id, COUNT(*) FROM user_missions
        WHERE user_id = ?
          AND status IN ({})
          AND (assigned_at >= ? OR (completed_at IS NOT NULL AND completed_at >= ?))
        GROUP BY mission_id
        "#,
        placeholders.join(", ")
    );

    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&user_id];
    for status in &statuses {
        params.push(status);
    }
    params.push(&since);
    params.push(&since);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MissionError::Database(format!("Prepare failed: {}", e)))?;

    let counts: HistoryCounts = stmt
        .query_map(params.as_slice(), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u32))
        })
        .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(|e| MissionError::Database(format!("Row parse failed: {}", e)))?;

    debug!(user_id, days, missions = counts.len(), "Loaded recent mission history");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::assignments::{insert_assignment, set_status};
    use crate::db::missions::{upsert_mission, CreateMissionInput};
    use crate::db::schema::init_schema;
    use chrono::TimeZone;

    fn setup() -> (Connection, i64, i64) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let mk = |code: &str| CreateMissionInput {
            code: code.into(),
            title: code.into(),
            description: None,
            mission_type: "instant".into(),
            burden: 1,
            exp_reward: 10,
            ar_bonus_exp: 0,
            requires_ar_action: None,
            cooldown_sec: 0,
            is_active: true,
        };
        let a = upsert_mission(&conn, mk("a")).unwrap().id;
        let b = upsert_mission(&conn, mk("b")).unwrap().id;
        (conn, a, b)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap()
    }

    fn assign(conn: &Connection, user: i64, mission: i64, days_ago: i64) -> i64 {
        let at = now() - Duration::days(days_ago);
        insert_assignment(conn, user, mission, at, at + Duration::hours(18)).unwrap()
    }

    #[test]
    fn test_counts_within_window() {
        let (conn, a, b) = setup();
        assign(&conn, 1, a, 1);
        assign(&conn, 1, a, 3);
        assign(&conn, 1, a, 10); // outside default 7-day window
        assign(&conn, 1, b, 2);
        assign(&conn, 2, b, 1); // other user

        let counts = load_recent_counts(&conn, 1, now(), None, None, &NoveltyConfig::default()).unwrap();
        assert_eq!(counts.get(&a), Some(&2));
        assert_eq!(counts.get(&b), Some(&1));

        let wide = load_recent_counts(&conn, 1, now(), Some(14), None, &NoveltyConfig::default()).unwrap();
        assert_eq!(wide.get(&a), Some(&3));
    }

    #[test]
    fn test_status_filter_and_fallback() {
        let (conn, a, b) = setup();
        let skipped = assign(&conn, 1, a, 1);
        set_status(&conn, skipped, "skipped").unwrap();
        assign(&conn, 1, b, 1);

        let defaults = NoveltyConfig::default();
        let counts = load_recent_counts(&conn, 1, now(), None, None, &defaults).unwrap();
        assert!(!counts.contains_key(&a));

        let only_skipped = vec!["skipped".to_string()];
        let counts = load_recent_counts(&conn, 1, now(), None, Some(&only_skipped), &defaults).unwrap();
        assert_eq!(counts.get(&a), Some(&1));
        assert!(!counts.contains_key(&b));

        // all-invalid filter falls back to the defaults
        let bogus = vec!["done".to_string()];
        let counts = load_recent_counts(&conn, 1, now(), None, Some(&bogus), &defaults).unwrap();
        assert_eq!(counts.get(&b), Some(&1));
    }

    #[test]
    fn test_window_clamped() {
        let (conn, a, _) = setup();
        assign(&conn, 1, a, 0);
        let counts = load_recent_counts(&conn, 1, now() + Duration::hours(1), Some(-5), None, &NoveltyConfig::default()).unwrap();
        assert_eq!(counts.get(&a), Some(&1));
    }
}
