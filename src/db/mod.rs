//! SQLite database module for missions, assignments and plant progress
//!
//! ## Tables
//!
//! - `missions` - Read-only mission catalog
//! - `user_missions` - Daily assignments and their lifecycle
//! - `plants` - Per-user plant progress (level, experience, likeability)
//! - `emotion_logs` - Latest emotion context written by the chat pipeline
//!
//! Writers that must not race (batch assignment, completion, clear, sweep)
//! open `BEGIN IMMEDIATE` transactions, which take the database write lock
//! before their lookups run.

pub mod schema;
pub mod models;
pub mod missions;
pub mod assignments;
pub mod plants;
pub mod history;
pub mod emotions;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, debug};

use crate::error::MissionError;

/// SQLite database for the mission engine
pub struct MissionDb {
    conn: Mutex<Connection>,
}

impl MissionDb {
    /// Open or create the mission database
    pub fn open(storage_dir: &Path) -> Result<Self, MissionError> {
        let db_path = storage_dir.join("missions.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| MissionError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers; busy_timeout so a second process waits for the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
            .map_err(|e| MissionError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, MissionError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| MissionError::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MissionError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), MissionError> {
        let conn = self.conn.lock()
            .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read with shared access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MissionError>
    where
        F: FnOnce(&Connection) -> Result<T, MissionError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, MissionError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MissionError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, MissionError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, MissionError> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(|e| MissionError::Database(format!("Query failed: {}", e)))
            };

            Ok(DbStats {
                mission_count: count("SELECT COUNT(*) FROM missions")?,
                active_mission_count: count("SELECT COUNT(*) FROM missions WHERE is_active = 1")?,
                assignment_count: count("SELECT COUNT(*) FROM user_missions")?,
                plant_count: count("SELECT COUNT(*) FROM plants")?,
            })
        })
    }
}

/// Begin a transaction that holds the write lock from its first statement
pub fn begin_immediate(conn: &mut Connection) -> Result<Transaction<'_>, MissionError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| MissionError::Database(format!("Transaction failed: {}", e)))
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub mission_count: u64,
    pub active_mission_count: u64,
    pub assignment_count: u64,
    pub plant_count: u64,
}

// Re-exports
pub use missions::{MissionRow, CreateMissionInput};
pub use assignments::AssignmentRow;
pub use plants::PlantRow;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_backed_and_stats() {
        let dir = TempDir::new().unwrap();
        let db = MissionDb::open(dir.path()).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.mission_count, 0);
        assert_eq!(stats.assignment_count, 0);
        assert!(dir.path().join("missions.db").exists());
    }
}
