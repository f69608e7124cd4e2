//! Configuration for plant-missions
//!
//! This is the service-level config (where the database lives, which
//! timezone defines "today"). Scoring weights live in
//! [`crate::recommend_config`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::business_day::BusinessDay;
use crate::error::MissionError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plant-missions")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config.toml
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Missions requested per day when the caller does not say
    #[serde(default = "default_mission_count")]
    pub default_mission_count: usize,

    /// Offset of the business timezone from UTC, in hours (KST = 9)
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Local hour at which the day's assignments expire
    #[serde(default = "default_expiry_hour")]
    pub expiry_hour: u32,

    /// Optional scoring override file (TOML, or JSON by extension)
    #[serde(default)]
    pub recommend_config_path: Option<PathBuf>,
}

fn default_mission_count() -> usize {
    3
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_expiry_hour() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            default_mission_count: default_mission_count(),
            utc_offset_hours: default_utc_offset_hours(),
            expiry_hour: default_expiry_hour(),
            recommend_config_path: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("missions.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Build the business-day calendar described by this config
    pub fn business_day(&self) -> Result<BusinessDay, MissionError> {
        BusinessDay::new(self.utc_offset_hours, self.expiry_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_kst() {
        let config = Config::default();
        assert_eq!(config.utc_offset_hours, 9);
        assert_eq!(config.expiry_hour, 3);
        assert_eq!(config.default_mission_count, 3);
        assert!(config.business_day().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.storage_dir = dir.path().to_path_buf();
        config.default_mission_count = 2;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.default_mission_count, 2);
        assert_eq!(loaded.database_path(), dir.path().join("missions.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("utc_offset_hours = 0").unwrap();
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.expiry_hour, 3);
        assert!(config.recommend_config_path.is_none());
    }

    #[test]
    fn test_invalid_expiry_hour_rejected() {
        let config = Config {
            expiry_hour: 24,
            ..Config::default()
        };
        assert!(config.business_day().is_err());
    }
}
