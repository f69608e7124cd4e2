//! Reward and plant leveling arithmetic
//!
//! Pure functions. The completion service loads the plant row, calls into
//! here, and persists the outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::MissionRow;

/// Hard ceiling on levels gained in one reward
const MAX_LEVEL_STEPS: u32 = 10_000;

/// Experience needed to leave `level`: `floor(100 * level^1.2)`
pub fn required_exp(level: i64) -> i64 {
    (100.0 * (level.max(1) as f64).powf(1.2)).floor() as i64
}

/// Stored plant progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantProgress {
    pub level: i64,
    pub experience: i64,
    pub likeability: i64,
}

/// Progress after a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelOutcome {
    pub level: i64,
    pub experience: i64,
    pub leveled_up: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum LevelingError {
    #[error("invalid plant state: level {level}, experience {experience}, likeability {likeability}")]
    InvalidState {
        level: i64,
        experience: i64,
        likeability: i64,
    },

    #[error("negative reward: {0}")]
    NegativeReward(i64),

    #[error("non-finite experience while leveling")]
    NonFinite,

    #[error("level loop did not converge")]
    Runaway,
}

/// Apply `gained` experience, boosted by likeability, and level up as often
/// as the new total allows
pub fn apply_reward(progress: PlantProgress, gained: i64) -> Result<LevelOutcome, LevelingError> {
    if progress.level < 1 || progress.experience < 0 || !(0..=100).contains(&progress.likeability) {
        return Err(LevelingError::InvalidState {
            level: progress.level,
            experience: progress.experience,
            likeability: progress.likeability,
        });
    }
    if gained < 0 {
        return Err(LevelingError::NegativeReward(gained));
    }

    let bonus = gained as f64 * (progress.likeability as f64 / 1000.0);
    let mut experience = progress.experience as f64 + gained as f64 + bonus;
    if !experience.is_finite() {
        return Err(LevelingError::NonFinite);
    }

    let mut level = progress.level;
    let mut steps = 0;
    while experience >= required_exp(level) as f64 {
        experience -= required_exp(level) as f64;
        level += 1;
        steps += 1;
        if steps > MAX_LEVEL_STEPS {
            return Err(LevelingError::Runaway);
        }
    }

    Ok(LevelOutcome {
        level,
        experience: experience.floor() as i64,
        leveled_up: level > progress.level,
    })
}

/// Degraded path: add the gain without bonus or level checks
pub fn apply_flat(progress: PlantProgress, gained: i64) -> LevelOutcome {
    LevelOutcome {
        level: progress.level,
        experience: progress.experience.saturating_add(gained.max(0)),
        leveled_up: false,
    }
}

/// Caller-supplied completion evidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvidence {
    #[serde(default)]
    pub ar_used: Option<bool>,
    #[serde(default)]
    pub ar_action: Option<String>,
    #[serde(default)]
    pub evidence: Option<serde_json::Value>,
}

impl CompletionEvidence {
    pub fn claims_ar(&self) -> bool {
        self.ar_used.unwrap_or(false)
    }

    /// Shape stored on the assignment row
    pub fn normalized(&self) -> serde_json::Value {
        serde_json::json!({
            "arUsed": self.claims_ar(),
            "arAction": self.ar_action,
            "evidence": self.evidence.clone().unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Experience earned for one mission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub base_exp: i64,
    pub ar_bonus: i64,
}

impl Reward {
    pub fn total(&self) -> i64 {
        self.base_exp + self.ar_bonus
    }
}

/// Base reward plus the AR bonus when the claimed gesture is the required one
pub fn compute_reward(mission: &MissionRow, evidence: &CompletionEvidence) -> Reward {
    let ar_confirmed = evidence.claims_ar()
        && match (&mission.requires_ar_action, &evidence.ar_action) {
            (Some(required), Some(claimed)) => required == claimed,
            _ => false,
        };

    Reward {
        base_exp: mission.exp_reward.max(0),
        ar_bonus: if ar_confirmed { mission.ar_bonus_exp.max(0) } else { 0 },
    }
}

/// Plant fields reported back to the client
pub type PlantStatus = LevelOutcome;

/// Completion response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSummary {
    pub message: String,
    pub base_exp: i64,
    pub ar_bonus: i64,
    pub exp_gained: i64,
    pub plant_status: PlantStatus,
}

impl RewardSummary {
    pub fn completed(reward: Reward, status: PlantStatus) -> Self {
        let message = if status.leveled_up {
            format!("Mission complete! Your plant grew to level {}.", status.level)
        } else {
            format!("Mission complete! Your plant gained {} exp.", reward.total())
        };
        Self {
            message,
            base_exp: reward.base_exp,
            ar_bonus: reward.ar_bonus,
            exp_gained: reward.total(),
            plant_status: status,
        }
    }

    pub fn already_completed(status: PlantStatus) -> Self {
        Self {
            message: "Mission already completed.".to_string(),
            base_exp: 0,
            ar_bonus: 0,
            exp_gained: 0,
            plant_status: PlantStatus { leveled_up: false, ..status },
        }
    }
}
