//! Error types for plant-missions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MissionError {
    /// True when the caller sent something wrong (bad id, unknown row),
    /// false for server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MissionError::InvalidInput(_) | MissionError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(MissionError::InvalidInput("user_id".into()).is_client_error());
        assert!(MissionError::NotFound("assignment 7".into()).is_client_error());
        assert!(!MissionError::Database("locked".into()).is_client_error());
        assert!(!MissionError::Config("bad".into()).is_client_error());
    }
}
