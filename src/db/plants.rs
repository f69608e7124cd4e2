//! Plant progress operations

use rusqlite::{Connection, params, Row};
use serde::{Deserialize, Serialize};

use super::models::current_timestamp;
use crate::error::MissionError;

/// Plant row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRow {
    pub user_id: i64,
    pub name: Option<String>,
    pub level: i64,
    pub experience: i64,
    /// 0-100
    pub likeability: i64,
    pub updated_at: String,
}

impl PlantRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            level: row.get("level")?,
            experience: row.get("experience")?,
            likeability: row.get("likeability")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Get a user's plant
pub fn get_plant(conn: &Connection, user_id: i64) -> Result<Option<PlantRow>, MissionError> {
    let result = conn.query_row(
        "SELECT * FROM plants WHERE user_id = ?",
        params![user_id],
        |row| PlantRow::from_row(row),
    );

    match result {
        Ok(plant) => Ok(Some(plant)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(MissionError::Database(format!("Query failed: {}", e))),
    }
}

/// Create a level-1 plant for a user; returns the existing one if present
pub fn adopt_plant(conn: &Connection, user_id: i64, name: Option<&str>) -> Result<PlantRow, MissionError> {
    conn.execute(
        "INSERT OR IGNORE INTO plants (user_id, name, level, experience, likeability, updated_at) VALUES (?, ?, 1, 0, 0, ?)",
        params![user_id, name, current_timestamp()],
    ).map_err(|e| MissionError::Database(format!("Insert failed: {}", e)))?;

    get_plant(conn, user_id)?
        .ok_or_else(|| MissionError::Internal("Plant not found after insert".to_string()))
}

/// Persist level and experience after a reward
pub fn update_progress(conn: &Connection, user_id: i64, level: i64, experience: i64) -> Result<(), MissionError> {
    let changed = conn.execute(
        "UPDATE plants SET level = ?, experience = ?, updated_at = ? WHERE user_id = ?",
        params![level, experience, current_timestamp(), user_id],
    ).map_err(|e| MissionError::Database(format!("Update failed: {}", e)))?;

    if changed == 0 {
        return Err(MissionError::NotFound(format!("Plant for user {} not found", user_id)));
    }
    Ok(())
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

    #[test]
    fn test_adopt_is_idempotent() {
        let conn = setup();
        let plant = adopt_plant(&conn, 3, Some("Fern")).unwrap();
        assert_eq!(plant.level, 1);
        assert_eq!(plant.experience, 0);
        assert_eq!(plant.likeability, 0);

        update_progress(&conn, 3, 2, 40).unwrap();
        let again = adopt_plant(&conn, 3, Some("Other")).unwrap();
        assert_eq!(again.level, 2);
        assert_eq!(again.name.as_deref(), Some("Fern"));
    }

    #[test]
    fn test_missing_plant() {
        let conn = setup();
        assert!(get_plant(&conn, 99).unwrap().is_none());
        assert!(matches!(update_progress(&conn, 99, 1, 0), Err(MissionError::NotFound(_))));
    }
}
