//! Symmetric-window extrema detection with idle detection.

use log::debug;
use serde::Serialize;

use super::signal::Signal;
use crate::config::{ExtremaConfig, IdleTolerance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremumMark {
    pub index: usize,
    pub timestamp: f64,
    pub value: f64,
    pub kind: ExtremumKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtremaOutcome {
    /// Marks in frame order, at most one per sample.
    Marks(Vec<ExtremumMark>),
    /// The signal stayed flat long enough to call the object stationary;
    /// `at` is the sample that completed the run.
    Idle { at: usize },
}

impl ExtremaOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExtremaOutcome::Idle { .. })
    }
}

/// Scan the signal once, marking strict local extrema and watching for idle.
///
/// A sample is a maximum when it is strictly greater than every other sample
/// within `half_window` on both sides (minimum mirrored). The first and last
/// `half_window` samples are never marked, nor is any sample whose window
/// holds an invalid sample.
///
/// Every sample, edges included, is also checked for being stuck: valid and
/// within the idle tolerance of each valid neighbor in its window. Reaching
/// `idle_run_length` consecutive stuck samples ends the scan with
/// [`ExtremaOutcome::Idle`].
pub fn detect_extrema(signal: &Signal, config: &ExtremaConfig) -> ExtremaOutcome {
    let values = signal.values();
    let valid = signal.valid();
    let timestamps = signal.timestamps();
    let n = values.len();
    let w = config.half_window;

    let tolerance = match config.idle_tolerance {
        IdleTolerance::Absolute(t) => t,
        IdleTolerance::Relative(f) => f * valid_spread(values, valid),
    };

    let mut marks = Vec::new();
    let mut stuck_run = 0usize;

    for i in 0..n {
        let lo = i.saturating_sub(w);
        let hi = (i + w).min(n.saturating_sub(1));
        let neighbors = || (lo..=hi).filter(move |&j| j != i);

        let mut valid_neighbors = neighbors().filter(|&j| valid[j]).peekable();
        let stuck = valid[i]
            && valid_neighbors.peek().is_some()
            && valid_neighbors.all(|j| (values[j] - values[i]).abs() <= tolerance);

        if stuck {
            stuck_run += 1;
            if stuck_run >= config.idle_run_length {
                debug!("idle after {} flat samples ending at {}", stuck_run, i);
                return ExtremaOutcome::Idle { at: i };
            }
        } else {
            stuck_run = 0;
        }

        if i < w || i + w >= n || !(lo..=hi).all(|j| valid[j]) {
            continue;
        }

        let kind = if neighbors().all(|j| values[i] > values[j]) {
            ExtremumKind::Max
        } else if neighbors().all(|j| values[i] < values[j]) {
            ExtremumKind::Min
        } else {
            continue;
        };

        marks.push(ExtremumMark {
            index: i,
            timestamp: timestamps[i],
            value: values[i],
            kind,
        });
    }

    debug!("found {} extrema in {} samples", marks.len(), n);
    ExtremaOutcome::Marks(marks)
}

/// Peak-to-peak range of the valid samples; 0 when none are valid.
fn valid_spread(values: &[f64], valid: &[bool]) -> f64 {
    let (lo, hi) = values
        .iter()
        .zip(valid)
        .filter(|(_, &ok)| ok)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (&v, _)| {
            (lo.min(v), hi.max(v))
        });
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}
