//! Physical size of the object from per-frame extents and depths.

use log::debug;
use serde::Serialize;

use super::{mean, quantile, AnalysisError, Result};
use crate::config::DimensionConfig;
use crate::processors::reducer::FrameReduction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimensions {
    /// Mean depth over valid frames
    pub mean_depth: f64,
    /// Per-axis mean extent after outlier rejection, in input units
    pub mean_extents: [f64; 3],
    /// Depth-dependent scale factor
    pub scale: f64,
    /// Scaled dimensions in output units
    pub dimensions: [f64; 3],
    pub frames_used: usize,
}

/// Aggregate dimensions over the valid reductions.
///
/// Each axis is averaged over valid frames. On `outlier_axis` only values at
/// or above the `outlier_quantile` are kept before averaging, which drops the
/// frames where the object was seen edge-on. The means are multiplied by
/// `scale_slope * mean_depth + scale_intercept` and `unit_conversion`.
///
/// # Errors
///
/// [`AnalysisError::InsufficientSignal`] when no frame is valid.
pub fn aggregate_dimensions(
    reductions: &[FrameReduction],
    config: &DimensionConfig,
) -> Result<Dimensions> {
    let valid: Vec<&FrameReduction> = reductions.iter().filter(|r| r.valid).collect();
    if valid.is_empty() {
        return Err(AnalysisError::insufficient(
            "dimensions",
            format!("none of {} frames reduced to an object", reductions.len()),
        ));
    }

    let depths: Vec<f64> = valid.iter().map(|r| r.depth).collect();
    let mean_depth = mean(&depths).unwrap_or(0.0);

    let mut mean_extents = [0.0; 3];
    for (axis, slot) in mean_extents.iter_mut().enumerate() {
        let values: Vec<f64> = valid.iter().map(|r| r.extents[axis] as f64).collect();
        let kept = if axis == config.outlier_axis {
            let cut = quantile(&values, config.outlier_quantile).unwrap_or(f64::NEG_INFINITY);
            values.into_iter().filter(|&v| v >= cut).collect()
        } else {
            values
        };
        *slot = mean(&kept).unwrap_or(0.0);
    }

    let scale = config.scale_slope * mean_depth + config.scale_intercept;
    let dimensions = mean_extents.map(|e| e * scale * config.unit_conversion);
    debug!(
        "dimensions {:?} at mean depth {:.3} over {} frames",
        dimensions,
        mean_depth,
        valid.len()
    );

    Ok(Dimensions {
        mean_depth,
        mean_extents,
        scale,
        dimensions,
        frames_used: valid.len(),
    })
}
