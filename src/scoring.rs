//! Candidate scoring
//!
//! `final = soft + context + novelty`
//!
//! - **soft**: bucket bonus for the mission code, plus a per-type
//!   adjustment, plus a small uniform jitter that breaks ties.
//! - **context**: low-arousal penalty for demanding missions, plus every
//!   emotion-boost rule whose tags intersect the user's emotion/tags and
//!   whose conditions match the mission.
//! - **novelty**: penalty indexed by how often the mission appeared in the
//!   recent history window (clamped to the last slot).
//!
//! Apart from the jitter draw, scoring is a pure function of its inputs.

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::business_day::TimeBucket;
use crate::context::EmotionContext;
use crate::db::history::HistoryCounts;
use crate::db::MissionRow;
use crate::recommend_config::{EmotionBoostRule, MatchCondition, RecommendConfig};

/// The three score terms for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub soft: f64,
    pub context: f64,
    pub novelty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.soft + self.context + self.novelty
    }
}

/// A mission with its score, alive for one recommendation call
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub mission: MissionRow,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Bucket bonus + type adjustment + jitter
pub fn soft_score(mission: &MissionRow, bucket: TimeBucket, config: &RecommendConfig, jitter: f64) -> f64 {
    let bucket_bonus = config
        .bucket_bonus
        .get(bucket.as_str())
        .and_then(|codes| codes.get(&mission.code))
        .copied()
        .unwrap_or(0.0);

    let type_adjustment = config
        .type_adjustments
        .get(&mission.mission_type)
        .copied()
        .unwrap_or(0.0);

    bucket_bonus + type_adjustment + jitter
}

/// True when every field set on the condition matches; a condition with no
/// fields set matches nothing
pub fn condition_matches(condition: &MatchCondition, mission: &MissionRow) -> bool {
    let mut constrained = false;

    if let Some(ref code) = condition.code {
        if mission.code != *code {
            return false;
        }
        constrained = true;
    }
    if let Some(ref fragment) = condition.code_includes {
        if !mission.code.contains(fragment.as_str()) {
            return false;
        }
        constrained = true;
    }
    if let Some(ref mission_type) = condition.mission_type {
        if mission.mission_type != *mission_type {
            return false;
        }
        constrained = true;
    }

    constrained
}

fn rule_applies(rule: &EmotionBoostRule, signals: &[String], mission: &MissionRow) -> bool {
    let tagged = rule
        .tags
        .iter()
        .any(|tag| {
            let tag = tag.trim().to_lowercase();
            signals.iter().any(|s| *s == tag)
        });

    tagged && (rule.when.is_empty() || rule.when.iter().any(|c| condition_matches(c, mission)))
}

/// Low-arousal penalty plus matching emotion boosts
pub fn context_score(mission: &MissionRow, context: &EmotionContext, config: &RecommendConfig) -> f64 {
    let mut score = 0.0;

    let low = &config.low_arousal;
    if let Some(arousal) = context.arousal {
        if arousal <= low.threshold && mission.burden >= low.min_burden {
            score -= low.penalty;
        }
    }

    let signals = context.signals();
    if !signals.is_empty() {
        for rule in &config.emotion_boosts {
            if rule_applies(rule, &signals, mission) {
                score += rule.boost;
            }
        }
    }

    score
}

/// Penalty for a mission seen `count` times recently
pub fn novelty_penalty(count: u32, penalty_by_count: &[f64]) -> f64 {
    match penalty_by_count.last() {
        None => 0.0,
        Some(last) => penalty_by_count
            .get(count as usize)
            .copied()
            .unwrap_or(*last),
    }
}

/// Score one mission
pub fn score<R: Rng + ?Sized>(
    mission: &MissionRow,
    bucket: TimeBucket,
    context: &EmotionContext,
    history: &HistoryCounts,
    config: &RecommendConfig,
    rng: &mut R,
) -> ScoredCandidate {
    let jitter = if config.jitter > 0.0 {
        rng.gen_range(0.0..config.jitter)
    } else {
        0.0
    };

    let count = history.get(&mission.id).copied().unwrap_or(0);
    let breakdown = ScoreBreakdown {
        soft: soft_score(mission, bucket, config, jitter),
        context: context_score(mission, context, config),
        novelty: novelty_penalty(count, &config.novelty.penalty_by_count),
    };
    let total = breakdown.total();

    debug!(
        code = %mission.code,
        bucket = %bucket,
        soft = breakdown.soft,
        context = breakdown.context,
        novelty = breakdown.novelty,
        recent = count,
        score = total,
        "Scored mission candidate"
    );

    ScoredCandidate {
        mission: mission.clone(),
        score: total,
        breakdown,
    }
}

/// Score every mission and sort best first
pub fn score_all<R: Rng + ?Sized>(
    missions: &[MissionRow],
    bucket: TimeBucket,
    context: &EmotionContext,
    history: &HistoryCounts,
    config: &RecommendConfig,
    rng: &mut R,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = missions
        .iter()
        .map(|m| score(m, bucket, context, history, config, rng))
        .collect();
    sort_by_score(&mut scored);
    scored
}

/// Descending by score; equal scores keep catalog order
pub fn sort_by_score(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}
