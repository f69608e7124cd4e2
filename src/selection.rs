//! Mission selection: top-K, softmax sampling, exploration, diversity
//!
//! Given candidates ranked best first:
//!
//! 1. keep the top K;
//! 2. turn their scores into probabilities with a temperature softmax;
//! 3. draw `min(n, 3, K)` of them without replacement;
//! 4. with probability epsilon, add one random candidate from below the
//!    top K, then re-sort and truncate back to the target size by score;
//! 5. drop duplicates and cap each mission type at two, backfilling from
//!    the ranked list.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use tracing::debug;

use crate::recommend_config::RecommendConfig;
use crate::scoring::{sort_by_score, ScoredCandidate};

/// Most missions handed out per day
pub const MAX_DAILY_PICKS: usize = 3;

/// Most missions of one type in a day's selection
pub const TYPE_CAP: usize = 2;

/// Temperature softmax: `p_i = exp(s_i / T) / sum_j exp(s_j / T)`
///
/// Shifted by the max score for numerical stability. A non-positive or
/// non-finite temperature falls back to 1.0.
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let temperature = if temperature.is_finite() && temperature > 0.0 {
        temperature
    } else {
        1.0
    };

    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| ((s - max) / temperature).exp())
        .collect();
    let sum: f64 = exps.iter().sum();

    if !(sum.is_finite() && sum > 0.0) {
        let uniform = 1.0 / scores.len() as f64;
        return vec![uniform; scores.len()];
    }

    exps.into_iter().map(|e| e / sum).collect()
}

/// One cumulative-probability draw over the unused items
///
/// `draw` is a uniform sample in [0, 1). Returns `None` only when every
/// item is used. When rounding leaves the draw past the last cumulative
/// bound (or the remaining weights sum to zero), the first unused index is
/// returned.
pub fn pick_index(weights: &[f64], used: &[bool], draw: f64) -> Option<usize> {
    let first_unused = (0..weights.len()).find(|&i| !used[i])?;

    let weight = |i: usize| {
        let w = weights[i];
        if w.is_finite() && w > 0.0 { w } else { 0.0 }
    };

    let total: f64 = (0..weights.len()).filter(|&i| !used[i]).map(weight).sum();
    if total <= 0.0 {
        return Some(first_unused);
    }

    let target = draw * total;
    let mut cumulative = 0.0;
    for i in (0..weights.len()).filter(|&i| !used[i]) {
        cumulative += weight(i);
        if target < cumulative {
            return Some(i);
        }
    }

    Some(first_unused)
}

/// Draw up to `count` distinct indices proportional to `weights`
pub fn sample_without_replacement<R: Rng + ?Sized>(weights: &[f64], count: usize, rng: &mut R) -> Vec<usize> {
    let mut used = vec![false; weights.len()];
    let mut picks = Vec::with_capacity(count.min(weights.len()));

    for _ in 0..count.min(weights.len()) {
        let draw: f64 = rng.gen();
        match pick_index(weights, &used, draw) {
            Some(i) => {
                used[i] = true;
                picks.push(i);
            }
            None => break,
        }
    }

    picks
}

/// How many missions a request may receive
pub fn target_size(requested: usize, top_k_len: usize) -> usize {
    requested.min(MAX_DAILY_PICKS).min(top_k_len)
}

/// Epsilon-greedy injection of one below-the-cut candidate
///
/// The candidate competes on score: picks are re-sorted and truncated back
/// to `target`. Returns the injected code when it survived the cut.
pub fn explore_tail<R: Rng + ?Sized>(
    picked: &mut Vec<ScoredCandidate>,
    tail: &[ScoredCandidate],
    target: usize,
    epsilon: f64,
    rng: &mut R,
) -> Option<String> {
    if tail.is_empty() || target == 0 || !rng.gen_bool(epsilon.clamp(0.0, 1.0)) {
        return None;
    }

    let choice = &tail[rng.gen_range(0..tail.len())];
    if picked.iter().any(|c| c.mission.code == choice.mission.code) {
        return None;
    }

    picked.push(choice.clone());
    sort_by_score(picked);
    picked.truncate(target);

    picked
        .iter()
        .any(|c| c.mission.code == choice.mission.code)
        .then(|| choice.mission.code.clone())
}

/// Unique codes, at most [`TYPE_CAP`] per type, `target` items if possible
///
/// Walks `picked` in score order first, then backfills from `ranked`. Only
/// when the type cap makes `target` unreachable does a final pass ignore it.
pub fn enforce_diversity(
    mut picked: Vec<ScoredCandidate>,
    ranked: &[ScoredCandidate],
    target: usize,
) -> Vec<ScoredCandidate> {
    sort_by_score(&mut picked);

    let mut kept: Vec<ScoredCandidate> = Vec::with_capacity(target);
    let mut codes: HashSet<String> = HashSet::new();
    let mut per_type: HashMap<String, usize> = HashMap::new();

    let mut admit = |candidate: &ScoredCandidate, respect_cap: bool, kept: &mut Vec<ScoredCandidate>| {
        if kept.len() >= target || codes.contains(&candidate.mission.code) {
            return;
        }
        let used = per_type.get(&candidate.mission.mission_type).copied().unwrap_or(0);
        if respect_cap && used >= TYPE_CAP {
            return;
        }
        codes.insert(candidate.mission.code.clone());
        *per_type.entry(candidate.mission.mission_type.clone()).or_insert(0) += 1;
        kept.push(candidate.clone());
    };

    for candidate in &picked {
        admit(candidate, true, &mut kept);
    }
    for candidate in ranked {
        admit(candidate, true, &mut kept);
    }
    for candidate in picked.iter().chain(ranked.iter()) {
        admit(candidate, false, &mut kept);
    }

    sort_by_score(&mut kept);
    kept
}

/// Full selection over candidates ranked best first
pub fn select<R: Rng + ?Sized>(
    ranked: &[ScoredCandidate],
    requested: usize,
    config: &RecommendConfig,
    rng: &mut R,
) -> Vec<ScoredCandidate> {
    let k = config.top_k.min(ranked.len());
    let target = target_size(requested, k);
    if target == 0 {
        return Vec::new();
    }

    let (top, tail) = ranked.split_at(k);
    let scores: Vec<f64> = top.iter().map(|c| c.score).collect();
    let probabilities = softmax(&scores, config.temperature);

    let mut picked: Vec<ScoredCandidate> = sample_without_replacement(&probabilities, target, rng)
        .into_iter()
        .map(|i| top[i].clone())
        .collect();

    if let Some(code) = explore_tail(&mut picked, tail, target, config.epsilon, rng) {
        debug!(code = %code, "Exploration injected a low-ranked mission");
    }

    let selected = enforce_diversity(picked, ranked, target);
    debug!(
        requested,
        top_k = k,
        selected = ?selected.iter().map(|c| c.mission.code.as_str()).collect::<Vec<_>>(),
        "Mission selection finished"
    );
    selected
}
