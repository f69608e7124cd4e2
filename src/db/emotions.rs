//! Emotion log access
//!
//! The chat pipeline owns these rows; the mission engine only reads the
//! latest one. `record_emotion` exists for fixtures and the CLI.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use super::models::format_timestamp;
use crate::error::MissionError;

/// Latest raw (emotion, factor_json) pair
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionLogRow {
    pub emotion: Option<String>,
    pub factor_json: Option<String>,
    pub created_at: String,
}

/// Most recent emotion log entry for a user
pub fn latest_emotion(conn: &Connection, user_id: i64) -> Result<Option<EmotionLogRow>, MissionError> {
    let result = conn.query_row(
        "SELECT emotion, factor_json, created_at FROM emotion_logs WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        params![user_id],
        |row| {
            Ok(EmotionLogRow {
                emotion: row.get(0)?,
                factor_json: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(MissionError::Database(format!("Query failed: {}", e))),
    }
}

/// Append an emotion log entry
pub fn record_emotion(
    conn: &Connection,
    user_id: i64,
    emotion: Option<&str>,
    factor: Option<&serde_json::Value>,
    at: DateTime<Utc>,
) -> Result<i64, MissionError> {
    conn.execute(
        "INSERT INTO emotion_logs (user_id, emotion, factor_json, created_at) VALUES (?, ?, ?, ?)",
        params![user_id, emotion, factor.map(|f| f.to_string()), format_timestamp(at)],
    ).map_err(|e| MissionError::Database(format!("Insert failed: {}", e)))?;

    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_latest_wins() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        assert!(latest_emotion(&conn, 1).unwrap().is_none());

        record_emotion(&conn, 1, Some("calm"), None, t).unwrap();
        let factor = serde_json::json!({"arousal": 0.2});
        record_emotion(&conn, 1, Some("sad"), Some(&factor), t + Duration::minutes(1)).unwrap();
        record_emotion(&conn, 2, Some("happy"), None, t + Duration::minutes(2)).unwrap();

        let latest = latest_emotion(&conn, 1).unwrap().unwrap();
        assert_eq!(latest.emotion.as_deref(), Some("sad"));
        assert_eq!(latest.factor_json.as_deref(), Some(r#"{"arousal":0.2}"#));
    }
}
