//! Index-aligned indicator signal.

use crate::config::{IndicatorConfig, IndicatorKind};
use crate::core::frame::{validate_timestamps, InputError};
use crate::processors::reducer::FrameReduction;

/// Value written into the slot of a frame with no usable indicator.
pub const GAP_VALUE: f64 = 0.0;

/// One scalar sample per frame, in frame order.
///
/// Timestamps are finite and strictly increasing. Frames whose reduction
/// failed keep their slot with [`GAP_VALUE`] and `valid = false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    timestamps: Vec<f64>,
    values: Vec<f64>,
    valid: Vec<bool>,
}

impl Signal {
    /// Build a signal from parallel vectors.
    pub fn new(timestamps: Vec<f64>, values: Vec<f64>, valid: Vec<bool>) -> Result<Self, InputError> {
        validate_timestamps(values.len(), &timestamps)?;
        if valid.len() != values.len() {
            return Err(InputError::CountMismatch {
                frames: values.len(),
                timestamps: valid.len(),
            });
        }
        Ok(Self {
            timestamps,
            values,
            valid,
        })
    }

    /// Signal where every sample is valid.
    pub fn from_samples(timestamps: Vec<f64>, values: Vec<f64>) -> Result<Self, InputError> {
        let valid = vec![true; values.len()];
        Self::new(timestamps, values, valid)
    }

    /// Assemble the chosen indicator from per-frame reductions.
    ///
    /// `reductions` must be in frame order, one per timestamp.
    pub fn assemble(
        reductions: &[FrameReduction],
        timestamps: &[f64],
        config: &IndicatorConfig,
    ) -> Result<Self, InputError> {
        validate_timestamps(reductions.len(), timestamps)?;

        let (values, valid): (Vec<f64>, Vec<bool>) = reductions
            .iter()
            .map(|r| match indicator_value(r, config) {
                Some(v) => (v, true),
                None => (GAP_VALUE, false),
            })
            .unzip();

        Ok(Self {
            timestamps: timestamps.to_vec(),
            values,
            valid,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// Indices of invalid samples.
    pub fn gaps(&self) -> Vec<usize> {
        self.valid
            .iter()
            .enumerate()
            .filter(|(_, &v)| !v)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Scalar indicator of one reduction, `None` if the frame has none.
pub fn indicator_value(reduction: &FrameReduction, config: &IndicatorConfig) -> Option<f64> {
    if !reduction.valid {
        return None;
    }
    match config.kind {
        IndicatorKind::Area => Some(reduction.area),
        IndicatorKind::Extent => {
            let e = reduction.extents.map(|v| v as f64);
            Some(match config.scalar_axis {
                Some(axis) => e[axis],
                None => (e[0] * e[0] + e[1] * e[1] + e[2] * e[2]).sqrt(),
            })
        }
        IndicatorKind::Normal => reduction
            .normal
            .map(|n| n[config.scalar_axis.unwrap_or(0)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::reducer::{CleanedCluster, StageCounts};

    fn reduction(index: usize, valid: bool, area: f64) -> FrameReduction {
        FrameReduction {
            index,
            cluster: CleanedCluster::default(),
            valid,
            failed_stage: None,
            extents: [3.0, 4.0, 0.0],
            area,
            depth: 1.0,
            normal: valid.then_some([0.6, 0.8, 0.0]),
            counts: StageCounts::default(),
            subsampled: false,
        }
    }

    #[test]
    fn test_assemble_area_with_gap() {
        let reductions = vec![
            reduction(0, true, 2.0),
            reduction(1, false, 0.0),
            reduction(2, true, 5.0),
        ];
        let signal = Signal::assemble(&reductions, &[0.0, 0.1, 0.2], &IndicatorConfig::default())
            .unwrap();

        assert_eq!(signal.len(), 3);
        assert_eq!(signal.values(), &[2.0, GAP_VALUE, 5.0]);
        assert_eq!(signal.gaps(), vec![1]);
        assert!(!signal.is_valid(1));
        assert!(!signal.is_valid(10));
    }

    #[test]
    fn test_extent_and_normal_indicators() {
        let r = reduction(0, true, 1.0);
        let extent = IndicatorConfig {
            kind: IndicatorKind::Extent,
            scalar_axis: None,
        };
        assert_eq!(indicator_value(&r, &extent), Some(5.0));

        let extent_y = IndicatorConfig {
            kind: IndicatorKind::Extent,
            scalar_axis: Some(1),
        };
        assert_eq!(indicator_value(&r, &extent_y), Some(4.0));

        let normal = IndicatorConfig {
            kind: IndicatorKind::Normal,
            scalar_axis: None,
        };
        assert_eq!(indicator_value(&r, &normal), Some(0.6));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let reductions = vec![reduction(0, true, 1.0), reduction(1, true, 1.0)];
        let err = Signal::assemble(&reductions, &[0.0], &IndicatorConfig::default()).unwrap_err();
        assert_eq!(
            err,
            InputError::CountMismatch {
                frames: 2,
                timestamps: 1
            }
        );
    }

    #[test]
    fn test_non_increasing_timestamps_rejected() {
        let err = Signal::from_samples(vec![0.0, 0.2, 0.2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, InputError::NotIncreasing { index: 2, .. }));
    }
}
