//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::MissionError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), MissionError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, MissionError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| MissionError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), MissionError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| MissionError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| MissionError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), MissionError> {
    conn.execute_batch(MISSIONS_SCHEMA)
        .map_err(|e| MissionError::Database(format!("Failed to create mission tables: {}", e)))?;

    conn.execute_batch(PLANTS_SCHEMA)
        .map_err(|e| MissionError::Database(format!("Failed to create plant tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| MissionError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Mission catalog and per-user assignments
const MISSIONS_SCHEMA: &str = r#"
-- Read-only mission catalog
CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    mission_type TEXT NOT NULL DEFAULT 'instant',
    burden INTEGER NOT NULL DEFAULT 1 CHECK (burden BETWEEN 1 AND 5),
    exp_reward INTEGER NOT NULL DEFAULT 0,
    ar_bonus_exp INTEGER NOT NULL DEFAULT 0,
    requires_ar_action TEXT,
    cooldown_sec INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per mission handed to a user on a business day.
-- No unique key on (user, mission, day): writers lock and check instead.
CREATE TABLE IF NOT EXISTS user_missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    mission_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'assigned',
    assigned_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    completed_at TEXT,
    evidence_json TEXT,
    FOREIGN KEY (mission_id) REFERENCES missions(id)
);
"#;

/// Plant progress and the emotion log read by the context provider
const PLANTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS plants (
    user_id INTEGER PRIMARY KEY NOT NULL,
    name TEXT,
    level INTEGER NOT NULL DEFAULT 1,
    experience INTEGER NOT NULL DEFAULT 0,
    likeability INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Written by the chat pipeline; factor_json may carry valence/arousal/tags
CREATE TABLE IF NOT EXISTS emotion_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    emotion TEXT,
    factor_json TEXT,
    created_at TEXT NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_missions_active ON missions(is_active, burden);
CREATE INDEX IF NOT EXISTS idx_user_missions_user_assigned ON user_missions(user_id, assigned_at);
CREATE INDEX IF NOT EXISTS idx_user_missions_user_mission ON user_missions(user_id, mission_id);
CREATE INDEX IF NOT EXISTS idx_user_missions_status_expiry ON user_missions(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_emotion_logs_user ON emotion_logs(user_id, created_at);
"#;
