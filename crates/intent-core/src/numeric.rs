//! Numerically stable helpers shared by every updater.
//!
//! Everything here works on plain slices so the updaters can compose the steps in
//! their own order. Log-space inputs are max-shifted before exponentiation, and any
//! normalization whose mass underflows is reported instead of dividing by zero.

use crate::error::{InferenceError, Result};

/// Total mass below which a normalization is treated as degenerate.
pub const DEGENERATE_MASS: f64 = 1e-300;

/// Posterior temperatures this close to one skip the tempering step.
pub const BETA_TOLERANCE: f64 = 1e-9;

/// Uniform simplex over `n` entries.
pub fn uniform(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Maps NaN to negative infinity and positive infinity to the largest finite value.
fn sanitize_log(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else if value == f64::INFINITY {
        f64::MAX
    } else {
        value
    }
}

/// Max-subtract, exponentiate and normalize a vector of log-weights.
pub fn normalize_log(log_weights: &[f64], stage: &'static str) -> Result<Vec<f64>> {
    let max = log_weights
        .iter()
        .copied()
        .map(sanitize_log)
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(InferenceError::DegenerateNormalization { stage });
    }

    let mut probs: Vec<f64> = log_weights
        .iter()
        .map(|&value| (sanitize_log(value) - max).exp())
        .collect();
    let total: f64 = probs.iter().sum();
    if !total.is_finite() || total < DEGENERATE_MASS {
        return Err(InferenceError::DegenerateNormalization { stage });
    }
    for p in &mut probs {
        *p /= total;
    }
    Ok(probs)
}

/// Like [`normalize_log`], falling back to the uniform distribution on degeneracy.
pub fn normalize_log_or_uniform(log_weights: &[f64], stage: &'static str) -> Vec<f64> {
    match normalize_log(log_weights, stage) {
        Ok(probs) => probs,
        Err(err) => {
            tracing::warn!(
                target: "intent_core::belief",
                stage,
                len = log_weights.len(),
                error = %err,
                "falling back to uniform distribution"
            );
            uniform(log_weights.len())
        }
    }
}

/// Normalizes non-negative weights; negative or non-finite entries carry no mass.
pub fn normalize_mass(weights: &[f64], stage: &'static str) -> Result<Vec<f64>> {
    let cleaned: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();
    if !total.is_finite() || total < DEGENERATE_MASS {
        return Err(InferenceError::DegenerateNormalization { stage });
    }
    Ok(cleaned.into_iter().map(|w| w / total).collect())
}

/// Stable `ln(sum(exp(values)))`; negative infinity for an empty or all-`-inf` input.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values
        .iter()
        .copied()
        .map(sanitize_log)
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let total: f64 = values
        .iter()
        .map(|&value| (sanitize_log(value) - max).exp())
        .sum();
    max + total.ln()
}

/// Log-probability of `action` under the softmax of `logits`, floored before the log.
pub fn softmax_log_prob(logits: &[f64], action: usize, floor: f64) -> f64 {
    let probs = normalize_log_or_uniform(logits, "likelihood softmax");
    let p = probs.get(action).copied().unwrap_or(0.0);
    (p + floor).ln()
}

/// In-place `post <- (1 - weight) * post + weight * uniform`.
pub fn mix_uniform(post: &mut [f64], weight: f64) {
    if post.is_empty() || weight <= 0.0 {
        return;
    }
    let share = weight / post.len() as f64;
    for p in post.iter_mut() {
        *p = (1.0 - weight) * *p + share;
    }
}

/// Raises a simplex to `1 / beta` and renormalizes; skipped when `beta` is effectively one.
///
/// Logs are shifted by the largest entry before dividing so tiny temperatures sharpen
/// towards the mode instead of overflowing.
pub fn temper(post: &[f64], beta: f64) -> Vec<f64> {
    if (beta - 1.0).abs() <= BETA_TOLERANCE {
        return post.to_vec();
    }
    let logs: Vec<f64> = post.iter().map(|p| sanitize_log(p.ln())).collect();
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return normalize_log_or_uniform(&logs, "posterior temperature");
    }
    let scaled: Vec<f64> = logs.iter().map(|l| (l - max) / beta).collect();
    normalize_log_or_uniform(&scaled, "posterior temperature")
}

/// Raises every entry to at least `floor` and renormalizes, keeping the simplex interior.
pub fn floor_simplex(post: &mut [f64], floor: f64) {
    if post.is_empty() {
        return;
    }
    for p in post.iter_mut() {
        if !p.is_finite() || *p < floor {
            *p = floor;
        }
    }
    let total: f64 = post.iter().sum();
    for p in post.iter_mut() {
        *p /= total;
    }
}

/// Converts a simplex to log-space with an additive floor guarding `ln(0)`.
pub fn to_log(post: &[f64], floor: f64) -> Vec<f64> {
    post.iter().map(|p| (p + floor).ln()).collect()
}
