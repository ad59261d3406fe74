//! Half-period estimation from extremum spacing.

use log::{debug, warn};
use serde::Serialize;

use super::extrema::{ExtremaOutcome, ExtremumKind, ExtremumMark};
use super::{mean, median, mode_rounded, AnalysisError, Result};
use crate::config::{CentralTendency, PeriodConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PeriodEstimate {
    /// Spacing between same-kind extrema, averaged over the usable kinds.
    HalfPeriod { seconds: f64, sample_count: usize },
    /// The object is not rotating.
    Idle,
}

/// Estimate plus the extremum kinds left out for having too few marks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub estimate: PeriodEstimate,
    pub excluded: Vec<ExtremumKind>,
}

fn central_value(intervals: &[f64], tendency: CentralTendency) -> Option<f64> {
    match tendency {
        CentralTendency::Mean => mean(intervals),
        CentralTendency::Median => median(intervals),
        CentralTendency::Mode { decimals } => mode_rounded(intervals, decimals),
    }
}

fn intervals_of(marks: &[ExtremumMark], kind: ExtremumKind) -> Vec<f64> {
    let times: Vec<f64> = marks
        .iter()
        .filter(|m| m.kind == kind)
        .map(|m| m.timestamp)
        .collect();
    times.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Turn extrema into a half-period estimate.
///
/// Consecutive same-kind marks give one interval each; a kind with fewer
/// than two marks is excluded. The half period is the mean of the included
/// kinds' central values.
///
/// # Errors
///
/// [`AnalysisError::InsufficientSignal`] when both kinds are excluded.
pub fn estimate_period(outcome: &ExtremaOutcome, config: &PeriodConfig) -> Result<PeriodReport> {
    let marks = match outcome {
        ExtremaOutcome::Idle { .. } => {
            return Ok(PeriodReport {
                estimate: PeriodEstimate::Idle,
                excluded: Vec::new(),
            })
        }
        ExtremaOutcome::Marks(marks) => marks,
    };

    let mut excluded = Vec::new();
    let mut centrals = Vec::new();
    let mut sample_count = 0;

    for (kind, tendency) in [
        (ExtremumKind::Max, config.max_tendency),
        (ExtremumKind::Min, config.min_tendency),
    ] {
        let intervals = intervals_of(marks, kind);
        match central_value(&intervals, tendency) {
            Some(value) => {
                debug!(
                    "{:?} spacing {:.4}s over {} intervals",
                    kind,
                    value,
                    intervals.len()
                );
                centrals.push(value);
                sample_count += intervals.len();
            }
            None => {
                warn!("excluding {:?} extrema: fewer than two marks", kind);
                excluded.push(kind);
            }
        }
    }

    let seconds = mean(&centrals).ok_or_else(|| {
        AnalysisError::insufficient(
            "period",
            format!("{} extrema, need two of one kind", marks.len()),
        )
    })?;

    Ok(PeriodReport {
        estimate: PeriodEstimate::HalfPeriod {
            seconds,
            sample_count,
        },
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(index: usize, timestamp: f64, kind: ExtremumKind) -> ExtremumMark {
        ExtremumMark {
            index,
            timestamp,
            value: 0.0,
            kind,
        }
    }

    #[test]
    fn test_single_kind_half_period() {
        let outcome = ExtremaOutcome::Marks(vec![
            mark(2, 0.2, ExtremumKind::Max),
            mark(4, 0.4, ExtremumKind::Min),
            mark(6, 0.6, ExtremumKind::Max),
        ]);

        let report = estimate_period(&outcome, &PeriodConfig::default()).unwrap();

        match report.estimate {
            PeriodEstimate::HalfPeriod {
                seconds,
                sample_count,
            } => {
                assert!((seconds - 0.4).abs() < 1e-12);
                assert_eq!(sample_count, 1);
            }
            PeriodEstimate::Idle => panic!("unexpected idle"),
        }
        assert_eq!(report.excluded, vec![ExtremumKind::Min]);
    }

    #[test]
    fn test_both_kinds_averaged() {
        let outcome = ExtremaOutcome::Marks(vec![
            mark(1, 0.0, ExtremumKind::Max),
            mark(2, 0.5, ExtremumKind::Min),
            mark(3, 1.0, ExtremumKind::Max),
            mark(4, 1.7, ExtremumKind::Min),
            mark(5, 2.0, ExtremumKind::Max),
        ]);

        let report = estimate_period(&outcome, &PeriodConfig::default()).unwrap();

        // Max spacing 1.0, min spacing 1.2
        match report.estimate {
            PeriodEstimate::HalfPeriod {
                seconds,
                sample_count,
            } => {
                assert!((seconds - 1.1).abs() < 1e-12);
                assert_eq!(sample_count, 3);
            }
            PeriodEstimate::Idle => panic!("unexpected idle"),
        }
        assert!(report.excluded.is_empty());
    }

    #[test]
    fn test_median_tendency() {
        let outcome = ExtremaOutcome::Marks(vec![
            mark(0, 0.0, ExtremumKind::Max),
            mark(1, 1.0, ExtremumKind::Max),
            mark(2, 2.0, ExtremumKind::Max),
            mark(3, 10.0, ExtremumKind::Max),
        ]);
        let config = PeriodConfig {
            max_tendency: CentralTendency::Median,
            ..PeriodConfig::default()
        };

        let report = estimate_period(&outcome, &config).unwrap();

        assert_eq!(
            report.estimate,
            PeriodEstimate::HalfPeriod {
                seconds: 1.0,
                sample_count: 3
            }
        );
    }

    #[test]
    fn test_idle_passes_through() {
        let report =
            estimate_period(&ExtremaOutcome::Idle { at: 7 }, &PeriodConfig::default()).unwrap();
        assert_eq!(report.estimate, PeriodEstimate::Idle);
    }

    #[test]
    fn test_too_few_marks() {
        let outcome = ExtremaOutcome::Marks(vec![
            mark(2, 0.2, ExtremumKind::Max),
            mark(4, 0.4, ExtremumKind::Min),
        ]);
        let err = estimate_period(&outcome, &PeriodConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientSignal { stage: "period", .. }
        ));
    }
}
