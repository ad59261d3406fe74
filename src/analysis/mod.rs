//! Time-series analysis of per-frame indicators.
//!
//! The reducer's outputs become a [`signal::Signal`], extrema are located in
//! it, the half period is estimated from their spacing and converted to RPM.
//! Physical dimensions are aggregated straight from the reductions.

pub mod dimensions;
pub mod extrema;
pub mod period;
pub mod rate;
pub mod signal;

use std::collections::BTreeMap;

use thiserror::Error;

pub use dimensions::{aggregate_dimensions, Dimensions};
pub use extrema::{detect_extrema, ExtremaOutcome, ExtremumKind, ExtremumMark};
pub use period::{estimate_period, PeriodEstimate, PeriodReport};
pub use rate::{rpm_from_normals, rpm_from_period, RateMethodUsed, RpmResult};
pub use signal::Signal;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient signal for {stage}: {reason}")]
    InsufficientSignal { stage: &'static str, reason: String },
}

impl AnalysisError {
    pub(crate) fn insufficient(stage: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::InsufficientSignal {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Arithmetic mean, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between closest ranks.
///
/// Position `q * (n - 1)` in the sorted values; a fractional position blends
/// its two neighbors.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Most frequent value after rounding to `decimals` places.
///
/// Ties go to the smallest rounded value.
pub fn mode_rounded(values: &[f64], decimals: u32) -> Option<f64> {
    let scale = 10f64.powi(decimals as i32);
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &v in values.iter().filter(|v| v.is_finite()) {
        *counts.entry((v * scale).round() as i64).or_default() += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (&key, &count) in &counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((key, count));
        }
    }
    best.map(|(key, _)| key as f64 / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(100.0));
        assert_eq!(quantile(&[0.0, 10.0], 0.25), Some(2.5));
    }

    #[test]
    fn test_mode_rounded_ties_to_smallest() {
        assert_eq!(mode_rounded(&[1.004, 1.001, 2.0, 2.0], 2), Some(1.0));
        assert_eq!(mode_rounded(&[3.0, 1.5, 1.52, 3.01], 1), Some(1.5));
        assert_eq!(mode_rounded(&[0.26, 0.31, 0.31], 2), Some(0.31));
        assert_eq!(mode_rounded(&[], 2), None);
    }
}
