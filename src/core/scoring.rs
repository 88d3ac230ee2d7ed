//! Confidence Scoring
//!
//! Shared helpers for the `[0, 1]` confidence values every stage reports.
//! Call sites pass their own weights and bands; nothing here knows about a
//! particular component.

/// Clamp a score into `[0, 1]`. NaN collapses to 0.
#[inline]
pub fn clamp_unit(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Weighted combination of `(score, weight)` pairs, normalized by total weight.
///
/// Returns 0.0 when all weights are zero.
pub fn weighted_score(parts: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = parts.iter().map(|&(_, w)| w.max(0.0)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let sum: f64 = parts
        .iter()
        .map(|&(score, w)| clamp_unit(score) * w.max(0.0))
        .sum();
    clamp_unit(sum / total_weight)
}

/// A closed interval mapped to a score.
#[derive(Debug, Clone, Copy)]
pub struct ScoreBand {
    pub min: f64,
    pub max: f64,
    pub score: f64,
}

impl ScoreBand {
    pub const fn new(min: f64, max: f64, score: f64) -> Self {
        Self { min, max, score }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Score of the first band containing `value`, or `fallback` when none does.
///
/// Bands are checked in order, so list the tightest band first.
pub fn banded_score(value: f64, bands: &[ScoreBand], fallback: f64) -> f64 {
    bands
        .iter()
        .find(|band| band.contains(value))
        .map(|band| band.score)
        .unwrap_or(fallback)
}

/// Mean of `values` weighted by `weights`; 0.0 for empty or zero-weight input.
pub fn weighted_mean(values: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let mut sum = 0.0;
    let mut total = 0.0;
    for (value, weight) in values {
        sum += value * weight;
        total += weight;
    }
    if total <= 0.0 {
        0.0
    } else {
        sum / total
    }
}

/// Coefficient of variation (std / mean) of a sample. 0.0 for fewer than two values
/// or a zero mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean.abs()
}
