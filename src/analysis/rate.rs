//! Conversion of periodicity or orientation change into RPM.

use std::f64::consts::PI;

use log::{debug, warn};
use serde::Serialize;

use super::period::PeriodEstimate;
use super::{mode_rounded, AnalysisError, Result};
use crate::config::RateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMethodUsed {
    ExtremaBased,
    OrientationBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpmResult {
    pub rpm: f64,
    /// Angular velocity (rad/s) per consecutive frame pair
    pub angular_velocities: Vec<f64>,
    pub method: RateMethodUsed,
    /// Pairs that contributed 0 for lack of a usable measurement
    pub skipped_pairs: usize,
}

/// RPM from a half-period estimate.
///
/// `rpm = 60 / (symmetry_order * half_period)`. The angular-velocity series
/// repeats the implied rate for each of the `frame_count - 1` frame pairs.
/// An idle estimate is 0 RPM.
///
/// # Errors
///
/// [`AnalysisError::InsufficientSignal`] for a non-positive or non-finite
/// half period.
pub fn rpm_from_period(
    estimate: &PeriodEstimate,
    frame_count: usize,
    config: &RateConfig,
) -> Result<RpmResult> {
    let pairs = frame_count.saturating_sub(1);

    let rpm = match *estimate {
        PeriodEstimate::Idle => 0.0,
        PeriodEstimate::HalfPeriod { seconds, .. } => {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(AnalysisError::insufficient(
                    "rate",
                    format!("half period {seconds} is not a positive duration"),
                ));
            }
            60.0 / (config.symmetry_order.max(1) as f64 * seconds)
        }
    };

    let omega = 2.0 * PI * rpm / 60.0;
    debug!("extrema-based rate {:.3} rpm", rpm);

    Ok(RpmResult {
        rpm,
        angular_velocities: vec![omega; pairs],
        method: RateMethodUsed::ExtremaBased,
        skipped_pairs: 0,
    })
}

/// RPM from the rotation of a tracked surface normal.
///
/// Each consecutive pair yields `acos(clamp(n1 . n2)) / dt`. Pairs with a
/// missing normal or a non-positive `dt` contribute 0 to the series and are
/// left out of the aggregate, which is the mode of the velocities rounded to
/// `mode_decimals` places.
///
/// `normals` and `timestamps` are index-aligned, one entry per frame.
///
/// # Errors
///
/// [`AnalysisError::InsufficientSignal`] when no pair is usable.
pub fn rpm_from_normals(
    normals: &[Option<[f64; 3]>],
    timestamps: &[f64],
    config: &RateConfig,
) -> Result<RpmResult> {
    let n = normals.len().min(timestamps.len());
    let mut angular_velocities = Vec::with_capacity(n.saturating_sub(1));
    let mut usable = Vec::new();
    let mut skipped_pairs = 0;

    for i in 1..n {
        let dt = timestamps[i] - timestamps[i - 1];
        let omega = match (normals[i - 1], normals[i]) {
            (Some(a), Some(b)) if dt > 0.0 => {
                let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
                Some(dot.clamp(-1.0, 1.0).acos() / dt)
            }
            _ => None,
        };

        match omega {
            Some(w) => {
                angular_velocities.push(w);
                usable.push(w);
            }
            None => {
                angular_velocities.push(0.0);
                skipped_pairs += 1;
            }
        }
    }

    if skipped_pairs > 0 {
        warn!("{} of {} normal pairs unusable", skipped_pairs, n.saturating_sub(1));
    }

    let omega = mode_rounded(&usable, config.mode_decimals).ok_or_else(|| {
        AnalysisError::insufficient("rate", "no consecutive frames with usable normals")
    })?;
    let rpm = omega * 60.0 / (2.0 * PI);
    debug!("orientation-based rate {:.3} rpm", rpm);

    Ok(RpmResult {
        rpm,
        angular_velocities,
        method: RateMethodUsed::OrientationBased,
        skipped_pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_period(seconds: f64) -> PeriodEstimate {
        PeriodEstimate::HalfPeriod {
            seconds,
            sample_count: 1,
        }
    }

    #[test]
    fn test_rpm_from_half_period() {
        let result = rpm_from_period(&half_period(0.5), 10, &RateConfig::default()).unwrap();
        assert!((result.rpm - 60.0).abs() < 1e-9);
        assert_eq!(result.angular_velocities.len(), 9);
        assert!((result.angular_velocities[0] - 2.0 * PI).abs() < 1e-9);
        assert_eq!(result.method, RateMethodUsed::ExtremaBased);

        let result = rpm_from_period(&half_period(0.4), 10, &RateConfig::default()).unwrap();
        assert!((result.rpm - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_symmetry_order_scales_rate() {
        let config = RateConfig {
            symmetry_order: 4,
            ..RateConfig::default()
        };
        let result = rpm_from_period(&half_period(0.5), 3, &config).unwrap();
        assert!((result.rpm - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_is_zero_rpm() {
        let result = rpm_from_period(&PeriodEstimate::Idle, 5, &RateConfig::default()).unwrap();
        assert_eq!(result.rpm, 0.0);
        assert_eq!(result.angular_velocities, vec![0.0; 4]);
    }

    #[test]
    fn test_degenerate_half_period() {
        for seconds in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = rpm_from_period(&half_period(seconds), 5, &RateConfig::default());
            assert!(err.is_err(), "{seconds}");
        }
    }

    #[test]
    fn test_quarter_turn_normals() {
        let normals = vec![Some([0.0, 0.0, 1.0]), Some([0.0, 1.0, 0.0])];

        let result = rpm_from_normals(&normals, &[0.0, 0.1], &RateConfig::default()).unwrap();

        assert_eq!(result.angular_velocities.len(), 1);
        assert!((result.angular_velocities[0] - PI / 2.0 / 0.1).abs() < 1e-9);
        // Mode of 15.71 rad/s
        assert!((result.rpm - 15.71 * 60.0 / (2.0 * PI)).abs() < 1e-9);
        assert_eq!(result.method, RateMethodUsed::OrientationBased);
    }

    #[test]
    fn test_unusable_pairs_contribute_zero() {
        let normals = vec![
            Some([1.0, 0.0, 0.0]),
            None,
            Some([1.0, 0.0, 0.0]),
            Some([0.0, 1.0, 0.0]),
        ];

        let result =
            rpm_from_normals(&normals, &[0.0, 0.1, 0.2, 0.3], &RateConfig::default()).unwrap();

        assert_eq!(result.skipped_pairs, 2);
        assert_eq!(result.angular_velocities[0], 0.0);
        assert_eq!(result.angular_velocities[1], 0.0);
        assert!(result.angular_velocities[2] > 15.0);
        assert!(result.rpm > 0.0);
    }

    #[test]
    fn test_non_positive_dt_is_skipped() {
        let normals = vec![Some([1.0, 0.0, 0.0]), Some([0.0, 1.0, 0.0])];
        let err = rpm_from_normals(&normals, &[0.5, 0.5], &RateConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientSignal { .. }));
    }

    #[test]
    fn test_clamped_dot_product() {
        // Slightly over-unit normals must not produce NaN
        let normals = vec![Some([0.0, 0.0, 1.0000001]), Some([0.0, 0.0, 1.0000001])];
        let result = rpm_from_normals(&normals, &[0.0, 1.0], &RateConfig::default()).unwrap();
        assert_eq!(result.rpm, 0.0);
    }
}
