//! Emotion context boundary
//!
//! The chat pipeline records the user's latest emotion plus a free-form
//! factor payload. Scoring only needs the (emotion, arousal, tags) triple;
//! anything missing or unreadable is treated as neutral.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::{emotions, MissionDb};
use crate::error::MissionError;

/// The user's most recent emotional context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionContext {
    pub emotion: Option<String>,
    pub valence: Option<f64>,
    pub arousal: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EmotionContext {
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Emotion and tags, lowercased, for rule matching
    pub fn signals(&self) -> Vec<String> {
        self.emotion
            .iter()
            .chain(self.tags.iter())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Build from the raw log columns
    pub fn from_log(emotion: Option<String>, factor_json: Option<&str>) -> Self {
        let mut context = Self {
            emotion: emotion.filter(|e| !e.trim().is_empty()),
            ..Self::default()
        };

        let Some(raw) = factor_json else {
            return context;
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(factor) => {
                context.valence = factor.get("valence").and_then(|v| v.as_f64());
                context.arousal = factor.get("arousal").and_then(|v| v.as_f64());
                context.tags = match factor.get("tags") {
                    Some(serde_json::Value::Array(items)) => items
                        .iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect(),
                    Some(serde_json::Value::String(joined)) => joined
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                    _ => Vec::new(),
                };
            }
            Err(e) => {
                warn!(error = %e, "Unreadable emotion factor, using neutral factor");
            }
        }

        context
    }
}

/// Source of the latest emotion context for a user
pub trait ContextProvider: Send + Sync {
    fn latest_context(&self, user_id: i64) -> Result<EmotionContext, MissionError>;
}

/// Reads the `emotion_logs` table
pub struct SqliteContextProvider {
    db: Arc<MissionDb>,
}

impl SqliteContextProvider {
    pub fn new(db: Arc<MissionDb>) -> Self {
        Self { db }
    }
}

impl ContextProvider for SqliteContextProvider {
    fn latest_context(&self, user_id: i64) -> Result<EmotionContext, MissionError> {
        let latest = self.db.with_conn(|conn| emotions::latest_emotion(conn, user_id))?;

        Ok(match latest {
            Some(row) => EmotionContext::from_log(row.emotion, row.factor_json.as_deref()),
            None => EmotionContext::neutral(),
        })
    }
}

/// Always returns the same context
pub struct StaticContextProvider(pub EmotionContext);

impl ContextProvider for StaticContextProvider {
    fn latest_context(&self, _user_id: i64) -> Result<EmotionContext, MissionError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_from_log_parses_factor() {
        let ctx = EmotionContext::from_log(
            Some("Sad".into()),
            Some(r#"{"valence": -0.4, "arousal": 0.1, "tags": ["Lonely", "tired"]}"#),
        );
        assert_eq!(ctx.arousal, Some(0.1));
        assert_eq!(ctx.valence, Some(-0.4));
        assert_eq!(ctx.signals(), vec!["sad", "lonely", "tired"]);
    }

    #[test]
    fn test_comma_tags_and_bad_json() {
        let ctx = EmotionContext::from_log(None, Some(r#"{"tags": "stressed, work"}"#));
        assert_eq!(ctx.tags, vec!["stressed", "work"]);

        let ctx = EmotionContext::from_log(Some("calm".into()), Some("{not json"));
        assert_eq!(ctx.emotion.as_deref(), Some("calm"));
        assert!(ctx.arousal.is_none());
        assert!(ctx.tags.is_empty());
    }

    #[test]
    fn test_sqlite_provider_defaults_to_neutral() {
        let db = Arc::new(MissionDb::open_in_memory().unwrap());
        let provider = SqliteContextProvider::new(db.clone());
        assert_eq!(provider.latest_context(5).unwrap(), EmotionContext::neutral());

        db.with_conn(|conn| {
            let factor = serde_json::json!({"arousal": 0.9});
            emotions::record_emotion(conn, 5, Some("excited"), Some(&factor), Utc::now())
        })
        .unwrap();
        let ctx = provider.latest_context(5).unwrap();
        assert_eq!(ctx.emotion.as_deref(), Some("excited"));
        assert_eq!(ctx.arousal, Some(0.9));
    }
}
