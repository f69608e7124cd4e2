//! Daily assignment operations
//!
//! Rows are read joined with their mission so callers get title, type and
//! reward without a second lookup. Functions that write take a plain
//! `&Connection`; callers pass a `Transaction` (which derefs to one) when
//! the write must be atomic with its preceding check.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, Row};
use serde::{Deserialize, Serialize};

use super::models::{assignment_status, format_timestamp, parse_timestamp};
use crate::error::MissionError;

/// Assignment row joined with mission catalog fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRow {
    pub id: i64,
    pub user_id: i64,
    pub mission_id: i64,
    pub status: String,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub evidence: Option<serde_json::Value>,
    pub mission_code: String,
    pub mission_title: String,
    pub mission_description: Option<String>,
    pub mission_type: String,
    pub exp_reward: i64,
}

impl AssignmentRow {
    pub fn is_complete(&self) -> bool {
        self.status == assignment_status::COMPLETE
    }

    /// Expired by status or by clock, whichever comes first
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == assignment_status::EXPIRED || self.expires_at < now
    }
}

/// Columns as read from SQLite, before timestamp/JSON parsing
struct RawAssignment {
    id: i64,
    user_id: i64,
    mission_id: i64,
    status: String,
    assigned_at: String,
    expires_at: String,
    completed_at: Option<String>,
    evidence_json: Option<String>,
    mission_code: String,
    mission_title: String,
    mission_description: Option<String>,
    mission_type: String,
    exp_reward: i64,
}

impl RawAssignment {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            mission_id: row.get("mission_id")?,
            status: row.get("status")?,
            assigned_at: row.get("assigned_at")?,
            expires_at: row.get("expires_at")?,
            completed_at: row.get("completed_at")?,
            evidence_json: row.get("evidence_json")?,
            mission_code: row.get("mission_code")?,
            mission_title: row.get("mission_title")?,
            mission_description: row.get("mission_description")?,
            mission_type: row.get("mission_type")?,
            exp_reward: row.get("exp_reward")?,
        })
    }

    fn into_row(self) -> Result<AssignmentRow, MissionError> {
        Ok(AssignmentRow {
            id: self.id,
            user_id: self.user_id,
            mission_id: self.mission_id,
            status: self.status,
            assigned_at: parse_timestamp(&self.assigned_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            evidence: self
                .evidence_json
                .as_deref()
                .map(|raw| serde_json::from_str::<serde_json::Value>(raw))
                .transpose()?,
            mission_code: self.mission_code,
            mission_title: self.mission_title,
            mission_description: self.mission_description,
            mission_type: self.mission_type,
            exp_reward: self.exp_reward,
        })
    }
}

const SELECT_JOINED: &str = r#"
    SELECT um.id, um.user_id, um.mission_id, um.status, um.assigned_at, um.expires_at,
           um.completed_at, um.evidence_json,
           m.code AS mission_code, m.title AS mission_title,
           m.description AS mission_description, m.mission_type, m.exp_reward
    FROM user_missions um
    INNER JOIN missions m ON m.id = um.mission_id
"#;

fn query_rows(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AssignmentRow>, MissionError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| MissionError::Database(format!("Prepare failed: {}", e)))?;

    let raws = stmt
        .query_map(params, |row| RawAssignment::from_row(row))
        .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MissionError::Database(format!("Row parse failed: {}", e)))?;

    raws.into_iter().map(RawAssignment::into_row).collect()
}

/// Get assignment by ID
pub fn get_assignment(conn: &Connection, id: i64) -> Result<Option<AssignmentRow>, MissionError> {
    let sql = format!("{} WHERE um.id = ?", SELECT_JOINED);
    Ok(query_rows(conn, &sql, params![id])?.into_iter().next())
}

/// All of a user's assignments handed out at or after `since`
pub fn list_since(conn: &Connection, user_id: i64, since: DateTime<Utc>) -> Result<Vec<AssignmentRow>, MissionError> {
    let sql = format!(
        "{} WHERE um.user_id = ? AND um.assigned_at >= ? ORDER BY um.id",
        SELECT_JOINED
    );
    let since = format_timestamp(since);
    query_rows(conn, &sql, params![user_id, since])
}

/// Existing non-terminal or completed row for (user, mission) since `since`
///
/// Run inside an immediate transaction so the answer still holds at insert.
pub fn find_same_day(
    conn: &Connection,
    user_id: i64,
    mission_id: i64,
    since: DateTime<Utc>,
) -> Result<Option<i64>, MissionError> {
    let result = conn.query_row(
        r#"
        SELECT id FROM user_missions
        WHERE user_id = ? AND mission_id = ? AND assigned_at >= ?
          AND status IN (?, ?)
        LIMIT 1
        "#,
        params![
            user_id,
            mission_id,
            format_timestamp(since),
            assignment_status::ASSIGNED,
            assignment_status::COMPLETE,
        ],
        |row| row.get(0),
    );

    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(MissionError::Database(format!("Query failed: {}", e))),
    }
}

/// Insert a fresh `assigned` row, returning its id
pub fn insert_assignment(
    conn: &Connection,
    user_id: i64,
    mission_id: i64,
    assigned_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<i64, MissionError> {
    conn.execute(
        r#"
        INSERT INTO user_missions (user_id, mission_id, status, assigned_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            user_id,
            mission_id,
            assignment_status::ASSIGNED,
            format_timestamp(assigned_at),
            format_timestamp(expires_at),
        ],
    ).map_err(|e| MissionError::Database(format!("Insert failed: {}", e)))?;

    Ok(conn.last_insert_rowid())
}

/// Result of a locked batch insert
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchInsertResult {
    pub inserted: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// Insert one assignment per mission, skipping missions already handed out today
pub fn insert_batch(
    conn: &Connection,
    user_id: i64,
    mission_ids: &[i64],
    now: DateTime<Utc>,
    day_start: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<BatchInsertResult, MissionError> {
    let mut result = BatchInsertResult::default();

    for &mission_id in mission_ids {
        if find_same_day(conn, user_id, mission_id, day_start)?.is_some() {
            result.skipped.push(mission_id);
            continue;
        }
        result.inserted.push(insert_assignment(conn, user_id, mission_id, now, expires_at)?);
    }

    Ok(result)
}

/// Transition assigned -> complete, storing normalized evidence
pub fn mark_complete(
    conn: &Connection,
    id: i64,
    completed_at: DateTime<Utc>,
    evidence: &serde_json::Value,
) -> Result<(), MissionError> {
    let changed = conn.execute(
        "UPDATE user_missions SET status = ?, completed_at = ?, evidence_json = ? WHERE id = ? AND status = ?",
        params![
            assignment_status::COMPLETE,
            format_timestamp(completed_at),
            evidence.to_string(),
            id,
            assignment_status::ASSIGNED,
        ],
    ).map_err(|e| MissionError::Database(format!("Update failed: {}", e)))?;

    if changed == 0 {
        return Err(MissionError::Internal(format!(
            "Assignment {} was not in '{}' state at update",
            id,
            assignment_status::ASSIGNED
        )));
    }

    Ok(())
}

/// Delete a user's assignments handed out at or after `since`
pub fn delete_since(conn: &Connection, user_id: i64, since: DateTime<Utc>) -> Result<usize, MissionError> {
    conn.execute(
        "DELETE FROM user_missions WHERE user_id = ? AND assigned_at >= ?",
        params![user_id, format_timestamp(since)],
    ).map_err(|e| MissionError::Database(format!("Delete failed: {}", e)))
}

/// Mark every overdue `assigned` row as `expired`
pub fn expire_overdue(conn: &Connection, now: DateTime<Utc>) -> Result<usize, MissionError> {
    conn.execute(
        "UPDATE user_missions SET status = ? WHERE status = ? AND expires_at < ?",
        params![
            assignment_status::EXPIRED,
            assignment_status::ASSIGNED,
            format_timestamp(now),
        ],
    ).map_err(|e| MissionError::Database(format!("Update failed: {}", e)))
}

/// Set a row's status directly (test fixtures and out-of-band tools)
pub fn set_status(conn: &Connection, id: i64, status: &str) -> Result<bool, MissionError> {
    if !assignment_status::is_valid(status) {
        return Err(MissionError::InvalidInput(format!(
            "Invalid status: {}. Valid statuses: {:?}",
            status,
            assignment_status::ALL
        )));
    }

    let changed = conn
        .execute("UPDATE user_missions SET status = ? WHERE id = ?", params![status, id])
        .map_err(|e| MissionError::Database(format!("Update failed: {}", e)))?;

    Ok(changed > 0)
}
