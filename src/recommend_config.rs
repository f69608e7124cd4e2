//! Recommendation scoring configuration
//!
//! Weights and thresholds are merged from four layers, later layers winning:
//!
//! 1. built-in defaults ([`RecommendConfig::default`])
//! 2. an optional override file (TOML, or JSON when the extension is `.json`)
//! 3. an optional inline JSON override
//! 4. named scalar overrides (burden ceiling, jitter, AR penalty, novelty
//!    window and novelty penalty array)
//!
//! Objects merge key by key; arrays and scalars replace. The merged result
//! is validated and held by [`RecommendConfigCache`] for the life of the
//! process; `reset` drops it so tests can load a different snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::db::models::{assignment_status, mission_types};
use crate::error::MissionError;

/// Upper bound for the novelty history window
pub const MAX_HISTORY_DAYS: i64 = 30;

/// Scoring weights and sampling knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Candidates kept after ranking
    pub top_k: usize,
    /// Softmax temperature (lower = greedier)
    pub temperature: f64,
    /// Probability of injecting one candidate from below the top K
    pub epsilon: f64,
    /// Upper bound of the uniform tie-break jitter
    pub jitter: f64,
    /// Only missions with burden <= this are candidates
    pub burden_max: Option<i64>,
    /// bucket name -> mission code -> bonus
    pub bucket_bonus: HashMap<String, HashMap<String, f64>>,
    /// mission type -> additive adjustment
    pub type_adjustments: HashMap<String, f64>,
    pub low_arousal: LowArousalRule,
    pub emotion_boosts: Vec<EmotionBoostRule>,
    pub novelty: NoveltyConfig,
}

/// Penalize demanding missions when the user's arousal is low
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LowArousalRule {
    pub threshold: f64,
    pub min_burden: i64,
    /// Subtracted from the context score
    pub penalty: f64,
}

impl Default for LowArousalRule {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_burden: 3,
            penalty: 0.5,
        }
    }
}

/// Boost missions matching a condition when the user shows one of `tags`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionBoostRule {
    pub tags: Vec<String>,
    pub boost: f64,
    /// OR-combined; empty matches every mission
    #[serde(default)]
    pub when: Vec<MatchCondition>,
}

/// Mission matcher; every field that is set must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_includes: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mission_type: Option<String>,
}

/// Rolling-window repetition penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    pub window_days: i64,
    /// Penalty for a mission seen N times; counts past the end use the last slot
    pub penalty_by_count: Vec<f64>,
    /// Assignment statuses that count as "seen"
    pub statuses: Vec<String>,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            penalty_by_count: vec![0.0, -0.3, -0.6, -1.0],
            statuses: vec![
                assignment_status::ASSIGNED.to_string(),
                assignment_status::COMPLETE.to_string(),
            ],
        }
    }
}

fn bonus_table(entries: &[(&str, f64)]) -> HashMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

impl Default for RecommendConfig {
    fn default() -> Self {
        let mut bucket_bonus = HashMap::new();
        bucket_bonus.insert(
            "morning".to_string(),
            bonus_table(&[("drink_water", 1.0), ("morning_stretch", 1.2), ("sunlight_minute", 0.8)]),
        );
        bucket_bonus.insert(
            "afternoon".to_string(),
            bonus_table(&[("drink_water", 0.6), ("walk_outside", 0.8), ("breathing_1min", 0.5)]),
        );
        bucket_bonus.insert(
            "evening".to_string(),
            bonus_table(&[("gratitude_note", 1.0), ("talk_to_plant", 0.8)]),
        );
        bucket_bonus.insert(
            "night".to_string(),
            bonus_table(&[("breathing_1min", 1.0), ("gratitude_note", 0.6)]),
        );

        Self {
            top_k: 8,
            temperature: 0.7,
            epsilon: 0.1,
            jitter: 0.05,
            burden_max: Some(3),
            bucket_bonus,
            type_adjustments: bonus_table(&[(mission_types::AR_OPTIONAL, -0.1)]),
            low_arousal: LowArousalRule::default(),
            emotion_boosts: vec![
                EmotionBoostRule {
                    tags: vec!["anxious".into(), "stressed".into(), "anxiety".into()],
                    boost: 0.6,
                    when: vec![MatchCondition {
                        code_includes: Some("breath".into()),
                        ..Default::default()
                    }],
                },
                EmotionBoostRule {
                    tags: vec!["sad".into(), "lonely".into()],
                    boost: 0.5,
                    when: vec![
                        MatchCondition {
                            code: Some("talk_to_plant".into()),
                            ..Default::default()
                        },
                        MatchCondition {
                            mission_type: Some(mission_types::INSTANT.into()),
                            ..Default::default()
                        },
                    ],
                },
            ],
            novelty: NoveltyConfig::default(),
        }
    }
}

impl RecommendConfig {
    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<(), MissionError> {
        if self.top_k == 0 {
            return Err(MissionError::Config("top_k must be at least 1".into()));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(MissionError::Config(format!(
                "temperature must be a positive number, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(MissionError::Config(format!(
                "epsilon must be within [0, 1], got {}",
                self.epsilon
            )));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(MissionError::Config(format!(
                "jitter must be non-negative, got {}",
                self.jitter
            )));
        }
        if self.novelty.penalty_by_count.iter().any(|p| !p.is_finite()) {
            return Err(MissionError::Config(format!(
                "novelty.penalty_by_count must be finite, got {:?}",
                self.novelty.penalty_by_count
            )));
        }
        if let Some((mission_type, value)) = self.type_adjustments.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MissionError::Config(format!(
                "type_adjustments.{} must be finite, got {}",
                mission_type, value
            )));
        }
        for (bucket, codes) in &self.bucket_bonus {
            if let Some((code, value)) = codes.iter().find(|(_, v)| !v.is_finite()) {
                return Err(MissionError::Config(format!(
                    "bucket_bonus.{}.{} must be finite, got {}",
                    bucket, code, value
                )));
            }
        }
        if self.novelty.penalty_by_count.is_empty() {
            return Err(MissionError::Config("novelty.penalty_by_count must not be empty".into()));
        }
        if self
            .novelty
            .penalty_by_count
            .windows(2)
            .any(|pair| pair[1] > pair[0])
        {
            return Err(MissionError::Config(format!(
                "novelty.penalty_by_count must be non-increasing, got {:?}",
                self.novelty.penalty_by_count
            )));
        }
        for key in self.bucket_bonus.keys() {
            if !["morning", "afternoon", "evening", "night"].contains(&key.as_str()) {
                return Err(MissionError::Config(format!("unknown bucket '{}'", key)));
            }
        }
        Ok(())
    }

    /// History window clamped to [1, MAX_HISTORY_DAYS]
    pub fn novelty_window_days(&self) -> i64 {
        self.novelty.window_days.clamp(1, MAX_HISTORY_DAYS)
    }

    /// Merge every configured layer on top of the defaults
    pub fn load(sources: &ConfigSources) -> Result<Self, MissionError> {
        let mut merged = serde_json::to_value(RecommendConfig::default())?;

        if let Some(ref path) = sources.file {
            let overlay = read_override_file(path)?;
            info!(path = %path.display(), "Applying recommendation config file");
            merge_values(&mut merged, overlay);
        }

        if let Some(ref inline) = sources.inline {
            let overlay: Value = serde_json::from_str(inline)
                .map_err(|e| MissionError::Config(format!("inline override is not valid JSON: {}", e)))?;
            merge_values(&mut merged, overlay);
        }

        let mut config: RecommendConfig = serde_json::from_value(merged)
            .map_err(|e| MissionError::Config(format!("merged config does not deserialize: {}", e)))?;
        sources.scalars.apply(&mut config);
        config.validate()?;

        debug!(
            top_k = config.top_k,
            temperature = config.temperature,
            epsilon = config.epsilon,
            burden_max = ?config.burden_max,
            "Recommendation config loaded"
        );

        Ok(config)
    }
}

fn read_override_file(path: &Path) -> Result<Value, MissionError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MissionError::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content)
            .map_err(|e| MissionError::Config(format!("{} is not valid JSON: {}", path.display(), e)))
    } else {
        let parsed: toml::Value = toml::from_str(&content)
            .map_err(|e| MissionError::Config(format!("{} is not valid TOML: {}", path.display(), e)))?;
        serde_json::to_value(parsed).map_err(MissionError::from)
    }
}

/// Deep-merge `overlay` into `base`: objects merge, everything else replaces
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Named scalar overrides applied after the structured layers
#[derive(Debug, Clone, Default)]
pub struct ScalarOverrides {
    pub burden_max: Option<i64>,
    pub jitter: Option<f64>,
    pub ar_penalty: Option<f64>,
    pub novelty_window_days: Option<i64>,
    pub novelty_penalty: Option<Vec<f64>>,
}

impl ScalarOverrides {
    fn apply(&self, config: &mut RecommendConfig) {
        if let Some(burden) = self.burden_max {
            config.burden_max = Some(burden);
        }
        if let Some(jitter) = self.jitter {
            config.jitter = jitter;
        }
        if let Some(penalty) = self.ar_penalty {
            config
                .type_adjustments
                .insert(mission_types::AR_OPTIONAL.to_string(), penalty);
        }
        if let Some(days) = self.novelty_window_days {
            config.novelty.window_days = days;
        }
        if let Some(ref penalties) = self.novelty_penalty {
            config.novelty.penalty_by_count = penalties.clone();
        }
    }
}

/// Where the override layers come from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    pub inline: Option<String>,
    pub scalars: ScalarOverrides,
}

impl ConfigSources {
    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self, MissionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MissionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            file: get("MISSION_CONFIG_FILE").map(PathBuf::from),
            inline: get("MISSION_CONFIG_JSON"),
            scalars: ScalarOverrides {
                burden_max: parse_scalar(&get, "MISSION_BURDEN_MAX")?,
                jitter: parse_scalar(&get, "MISSION_JITTER")?,
                ar_penalty: parse_scalar(&get, "MISSION_AR_PENALTY")?,
                novelty_window_days: parse_scalar(&get, "MISSION_NOVELTY_DAYS")?,
                novelty_penalty: get("MISSION_NOVELTY_PENALTY")
                    .map(|raw| parse_penalty_list(&raw))
                    .transpose()?,
            },
        })
    }
}

fn parse_scalar<T, G>(get: &G, key: &str) -> Result<Option<T>, MissionError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| MissionError::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}

fn parse_penalty_list(raw: &str) -> Result<Vec<f64>, MissionError> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| MissionError::Config(format!("MISSION_NOVELTY_PENALTY entry {:?}: {}", s, e)))
        })
        .collect()
}

/// Process-wide holder for the merged config
///
/// Built once at startup and shared by `Arc`. The first `get` merges the
/// layers; later calls return the same snapshot until `reset`.
pub struct RecommendConfigCache {
    sources: ConfigSources,
    slot: RwLock<Option<Arc<RecommendConfig>>>,
}

impl RecommendConfigCache {
    pub fn new(sources: ConfigSources) -> Self {
        Self {
            sources,
            slot: RwLock::new(None),
        }
    }

    /// Cache that already holds `config` (sources are empty, so a reset
    /// falls back to defaults)
    pub fn preloaded(config: RecommendConfig) -> Self {
        Self {
            sources: ConfigSources::default(),
            slot: RwLock::new(Some(Arc::new(config))),
        }
    }

    /// Get the cached snapshot, merging it on first access
    pub fn get(&self) -> Result<Arc<RecommendConfig>, MissionError> {
        {
            let guard = self.slot.read()
                .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;
            if let Some(ref config) = *guard {
                return Ok(config.clone());
            }
        }

        let mut guard = self.slot.write()
            .map_err(|e| MissionError::Internal(format!("Lock poisoned: {}", e)))?;
        if let Some(ref config) = *guard {
            return Ok(config.clone());
        }

        let config = Arc::new(RecommendConfig::load(&self.sources)?);
        *guard = Some(config.clone());
        Ok(config)
    }

    /// Drop the cached snapshot; the next `get` merges again
    pub fn reset(&self) {
        if let Ok(mut guard) = self.slot.write() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = RecommendConfig::default();
        config.validate().unwrap();
        assert_eq!(config.type_adjustments.get("ar_optional"), Some(&-0.1));
        assert_eq!(config.novelty_window_days(), 7);
    }

    #[test]
    fn test_merge_objects_and_replace_arrays() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "list": [1, 2, 3]});
        merge_values(&mut base, serde_json::json!({"a": {"y": 5}, "list": [9]}));
        assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 5}, "list": [9]}));
    }

    #[test]
    fn test_file_then_inline_then_scalars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.toml");
        std::fs::write(
            &path,
            r#"
top_k = 4
jitter = 0.2

[bucket_bonus.morning]
breathing_1min = 2.5
"#,
        )
        .unwrap();

        let sources = ConfigSources {
            file: Some(path),
            inline: Some(r#"{"top_k": 5, "epsilon": 0.0}"#.into()),
            scalars: ScalarOverrides {
                jitter: Some(0.0),
                ..Default::default()
            },
        };

        let config = RecommendConfig::load(&sources).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.epsilon, 0.0);
        assert_eq!(config.jitter, 0.0);
        let morning = &config.bucket_bonus["morning"];
        assert_eq!(morning.get("breathing_1min"), Some(&2.5));
        // untouched default keys survive the merge
        assert_eq!(morning.get("drink_water"), Some(&1.0));
    }

    #[test]
    fn test_json_file_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(&path, r#"{"novelty": {"window_days": 14}}"#).unwrap();

        let config = RecommendConfig::load(&ConfigSources {
            file: Some(path),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.novelty.window_days, 14);
        assert_eq!(config.novelty.penalty_by_count, vec![0.0, -0.3, -0.6, -1.0]);
    }

    #[test]
    fn test_env_scalars() {
        let sources = ConfigSources::from_lookup(lookup_from(&[
            ("MISSION_BURDEN_MAX", "2"),
            ("MISSION_AR_PENALTY", "-0.4"),
            ("MISSION_NOVELTY_DAYS", "90"),
            ("MISSION_NOVELTY_PENALTY", "[0, -0.5, -2]"),
        ]))
        .unwrap();

        let config = RecommendConfig::load(&sources).unwrap();
        assert_eq!(config.burden_max, Some(2));
        assert_eq!(config.type_adjustments["ar_optional"], -0.4);
        assert_eq!(config.novelty.penalty_by_count, vec![0.0, -0.5, -2.0]);
        assert_eq!(config.novelty_window_days(), MAX_HISTORY_DAYS);
    }

    #[test]
    fn test_bad_scalar_is_config_error() {
        let result = ConfigSources::from_lookup(lookup_from(&[("MISSION_JITTER", "lots")]));
        assert!(matches!(result, Err(MissionError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let inline = |json: &str| {
            RecommendConfig::load(&ConfigSources {
                inline: Some(json.into()),
                ..Default::default()
            })
        };
        assert!(inline(r#"{"temperature": 0}"#).is_err());
        assert!(inline(r#"{"epsilon": 1.5}"#).is_err());
        assert!(inline(r#"{"top_k": 0}"#).is_err());
        assert!(inline(r#"{"novelty": {"penalty_by_count": [0, 0.5]}}"#).is_err());
        assert!(inline(r#"{"bucket_bonus": {"brunch": {}}}"#).is_err());
        assert!(inline("not json").is_err());
    }

    #[test]
    fn test_validation_rejects_non_finite_tables() {
        let nan_penalty = ConfigSources::from_lookup(lookup_from(&[("MISSION_NOVELTY_PENALTY", "0,nan")])).unwrap();
        assert!(matches!(RecommendConfig::load(&nan_penalty), Err(MissionError::Config(_))));

        let nan_ar = ConfigSources::from_lookup(lookup_from(&[("MISSION_AR_PENALTY", "NaN")])).unwrap();
        assert!(matches!(RecommendConfig::load(&nan_ar), Err(MissionError::Config(_))));

        let mut config = RecommendConfig::default();
        config.type_adjustments.insert("habit".into(), f64::INFINITY);
        assert!(matches!(config.validate(), Err(MissionError::Config(_))));

        let mut config = RecommendConfig::default();
        config
            .bucket_bonus
            .entry("morning".into())
            .or_default()
            .insert("drink_water".into(), f64::NAN);
        assert!(matches!(config.validate(), Err(MissionError::Config(_))));
    }

    #[test]
    fn test_cache_loads_once_and_resets() {
        let cache = RecommendConfigCache::preloaded(RecommendConfig {
            top_k: 2,
            ..Default::default()
        });
        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.top_k, 2);

        cache.reset();
        let reloaded = cache.get().unwrap();
        assert_eq!(reloaded.top_k, 8);
        assert!(!Arc::ptr_eq(&first, &reloaded));
    }
}
