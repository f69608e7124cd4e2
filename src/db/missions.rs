//! Mission catalog operations

use rusqlite::{Connection, params, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::mission_types;
use crate::error::MissionError;

/// Mission definition row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub mission_type: String,
    /// 1-5 effort rating
    pub burden: i64,
    pub exp_reward: i64,
    pub ar_bonus_exp: i64,
    /// Gesture that earns the AR bonus, if any
    pub requires_ar_action: Option<String>,
    pub cooldown_sec: i64,
    pub is_active: bool,
}

impl MissionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            title: row.get("title")?,
            description: row.get("description")?,
            mission_type: row.get("mission_type")?,
            burden: row.get("burden")?,
            exp_reward: row.get("exp_reward")?,
            ar_bonus_exp: row.get("ar_bonus_exp")?,
            requires_ar_action: row.get("requires_ar_action")?,
            cooldown_sec: row.get("cooldown_sec")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
        })
    }
}

/// Input for creating or replacing a catalog entry (keyed by code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMissionInput {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_mission_type", rename = "type")]
    pub mission_type: String,
    #[serde(default = "default_burden")]
    pub burden: i64,
    #[serde(default)]
    pub exp_reward: i64,
    #[serde(default)]
    pub ar_bonus_exp: i64,
    #[serde(default)]
    pub requires_ar_action: Option<String>,
    #[serde(default)]
    pub cooldown_sec: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_mission_type() -> String { mission_types::INSTANT.to_string() }
fn default_burden() -> i64 { 1 }
fn default_active() -> bool { true }

impl CreateMissionInput {
    pub fn validate(&self) -> Result<(), MissionError> {
        if self.code.trim().is_empty() {
            return Err(MissionError::InvalidInput("code is required".into()));
        }
        if !mission_types::is_valid(&self.mission_type) {
            return Err(MissionError::InvalidInput(format!(
                "type '{}' is not valid. Valid types: {:?}",
                self.mission_type,
                mission_types::ALL
            )));
        }
        if !(1..=5).contains(&self.burden) {
            return Err(MissionError::InvalidInput(format!(
                "burden must be within 1..=5, got {}",
                self.burden
            )));
        }
        if self.exp_reward < 0 || self.ar_bonus_exp < 0 {
            return Err(MissionError::InvalidInput("rewards must be non-negative".into()));
        }
        Ok(())
    }
}

/// Get mission by ID
pub fn get_mission(conn: &Connection, id: i64) -> Result<Option<MissionRow>, MissionError> {
    let mut stmt = conn
        .prepare("SELECT * FROM missions WHERE id = ?")
        .map_err(|e| MissionError::Database(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params![id])
        .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))?;

    match rows.next().map_err(|e| MissionError::Database(format!("Row fetch failed: {}", e)))? {
        Some(row) => MissionRow::from_row(row)
            .map(Some)
            .map_err(|e| MissionError::Database(format!("Row parse failed: {}", e))),
        None => Ok(None),
    }
}

/// Active missions, optionally capped by burden
pub fn list_active_missions(conn: &Connection, burden_max: Option<i64>) -> Result<Vec<MissionRow>, MissionError> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM missions WHERE is_active = 1 AND (?1 IS NULL OR burden <= ?1) ORDER BY id",
        )
        .map_err(|e| MissionError::Database(format!("Prepare failed: {}", e)))?;

    let missions = stmt
        .query_map(params![burden_max], |row| MissionRow::from_row(row))
        .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MissionError::Database(format!("Row parse failed: {}", e)))?;

    debug!(count = missions.len(), burden_max = ?burden_max, "Loaded active missions");
    Ok(missions)
}

/// Look up missions by code (any activity state)
pub fn get_missions_by_codes(conn: &Connection, codes: &[String]) -> Result<Vec<MissionRow>, MissionError> {
    if codes.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<_> = codes.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT * FROM missions WHERE code IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MissionError::Database(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = codes.iter().map(|c| c as &dyn rusqlite::ToSql).collect();

    let missions = stmt
        .query_map(param_refs.as_slice(), |row| MissionRow::from_row(row))
        .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MissionError::Database(format!("Row parse failed: {}", e)))?;

    Ok(missions)
}

fn upsert_in(conn: &Connection, input: &CreateMissionInput) -> Result<(), MissionError> {
    input.validate()?;

    conn.execute(
        r#"
        INSERT INTO missions (
            code, title, description, mission_type, burden,
            exp_reward, ar_bonus_exp, requires_ar_action, cooldown_sec, is_active
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(code) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            mission_type = excluded.mission_type,
            burden = excluded.burden,
            exp_reward = excluded.exp_reward,
            ar_bonus_exp = excluded.ar_bonus_exp,
            requires_ar_action = excluded.requires_ar_action,
            cooldown_sec = excluded.cooldown_sec,
            is_active = excluded.is_active
        "#,
        params![
            input.code,
            input.title,
            input.description,
            input.mission_type,
            input.burden,
            input.exp_reward,
            input.ar_bonus_exp,
            input.requires_ar_action,
            input.cooldown_sec,
            input.is_active as i64,
        ],
    ).map_err(|e| MissionError::Database(format!("Upsert failed: {}", e)))?;

    Ok(())
}

/// Create or replace a catalog entry
pub fn upsert_mission(conn: &Connection, input: CreateMissionInput) -> Result<MissionRow, MissionError> {
    upsert_in(conn, &input)?;

    get_missions_by_codes(conn, std::slice::from_ref(&input.code))?
        .into_iter()
        .next()
        .ok_or_else(|| MissionError::Internal("Mission not found after upsert".to_string()))
}

/// Bulk create or replace catalog entries (for seeding); all or nothing
pub fn bulk_upsert_missions(conn: &mut Connection, items: Vec<CreateMissionInput>) -> Result<usize, MissionError> {
    let tx = conn.transaction()
        .map_err(|e| MissionError::Database(format!("Transaction failed: {}", e)))?;

    for input in &items {
        upsert_in(&tx, input)?;
    }

    tx.commit()
        .map_err(|e| MissionError::Database(format!("Commit failed: {}", e)))?;

    Ok(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn input(code: &str, mission_type: &str, burden: i64) -> CreateMissionInput {
        CreateMissionInput {
            code: code.into(),
            title: code.replace('_', " "),
            description: None,
            mission_type: mission_type.into(),
            burden,
            exp_reward: 10,
            ar_bonus_exp: 0,
            requires_ar_action: None,
            cooldown_sec: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_upsert_replaces_by_code() {
        let conn = setup();
        let first = upsert_mission(&conn, input("drink_water", "habit", 1)).unwrap();

        let mut changed = input("drink_water", "habit", 2);
        changed.exp_reward = 25;
        let second = upsert_mission(&conn, changed).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.burden, 2);
        assert_eq!(second.exp_reward, 25);
    }

    #[test]
    fn test_list_active_respects_burden_and_flag() {
        let conn = setup();
        upsert_mission(&conn, input("breathing_1min", "instant", 1)).unwrap();
        upsert_mission(&conn, input("walk_outside", "action", 4)).unwrap();
        let mut retired = input("old_mission", "instant", 1);
        retired.is_active = false;
        upsert_mission(&conn, retired).unwrap();

        let all = list_active_missions(&conn, None).unwrap();
        assert_eq!(all.len(), 2);

        let capped = list_active_missions(&conn, Some(2)).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].code, "breathing_1min");
    }

    #[test]
    fn test_validation() {
        let conn = setup();
        assert!(upsert_mission(&conn, input("x", "quest", 1)).is_err());
        assert!(upsert_mission(&conn, input("x", "instant", 6)).is_err());
        assert!(upsert_mission(&conn, input(" ", "instant", 1)).is_err());
    }

    #[test]
    fn test_bulk_upsert_is_atomic() {
        let mut conn = setup();
        let result = bulk_upsert_missions(&mut conn, vec![
            input("a", "instant", 1),
            input("b", "bogus", 1),
        ]);
        assert!(result.is_err());
        assert!(list_active_missions(&conn, None).unwrap().is_empty());

        let count = bulk_upsert_missions(&mut conn, vec![
            input("a", "instant", 1),
            input("b", "habit", 1),
        ]).unwrap();
        assert_eq!(count, 2);
        let found = get_missions_by_codes(&conn, &["b".to_string(), "zzz".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
    }
}
