//! Batch orchestration: validate a session, reduce every frame and run the
//! signal analysis over the results.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{
    aggregate_dimensions, detect_extrema, estimate_period, rpm_from_normals, rpm_from_period,
    AnalysisError, Dimensions, ExtremaOutcome, ExtremumKind, ExtremumMark, PeriodEstimate,
    PeriodReport, RpmResult, Signal,
};
use crate::config::{ConfigError, PipelineConfig, RateMethod};
use crate::core::frame::{frames_from_parts, validate_timestamps, Frame, InputError, PointCloud};
use crate::core::writers::FrameRow;
use crate::processors::geometry::GeometryOps;
use crate::processors::reducer::{FrameReducer, FrameReduction, ReductionStage};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("run cancelled after {completed} of {total} frames")]
    Cancelled { completed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// What was dropped, skipped or excluded on the way to the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Audit {
    pub frames: usize,
    pub valid_frames: usize,
    /// Invalid frames counted by the stage that emptied them
    pub dropped_by_stage: BTreeMap<ReductionStage, usize>,
    /// Points removed per stage, summed over frames
    pub points_removed: BTreeMap<ReductionStage, usize>,
    pub subsampled_frames: Vec<usize>,
    pub signal_gaps: Vec<usize>,
    pub excluded_extrema: Vec<ExtremumKind>,
    pub skipped_rate_pairs: usize,
    /// Sample that completed the idle run, if the object never turned
    pub idle_at: Option<usize>,
}

/// Result of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub timestamps: Vec<f64>,
    pub extents: Vec<[f32; 3]>,
    pub areas: Vec<f64>,
    pub depths: Vec<f64>,
    pub valid: Vec<bool>,
    pub mean_depth: f64,
    pub dimensions: Dimensions,
    /// Absent when the orientation method ran and the signal had no usable
    /// periodicity
    pub period: Option<PeriodEstimate>,
    pub extrema: Vec<ExtremumMark>,
    pub rpm: RpmResult,
    pub audit: Audit,
}

impl SessionReport {
    /// Per-frame rows for CSV export.
    pub fn frame_rows(&self) -> Vec<FrameRow> {
        (0..self.timestamps.len())
            .map(|i| FrameRow {
                frame: i,
                timestamp: self.timestamps[i],
                valid: self.valid[i],
                extent_0: self.extents[i][0],
                extent_1: self.extents[i][1],
                extent_2: self.extents[i][2],
                area: self.areas[i],
                depth: self.depths[i],
                angular_velocity: i
                    .checked_sub(1)
                    .and_then(|pair| self.rpm.angular_velocities.get(pair).copied()),
            })
            .collect()
    }
}

/// Extrema, period and rate derived from a scalar signal.
#[derive(Debug, Clone, PartialEq)]
pub struct RateAnalysis {
    pub extrema: ExtremaOutcome,
    pub period: PeriodReport,
    pub rpm: RpmResult,
}

/// Extrema-based rate of a ready-made signal.
pub fn estimate_rate(signal: &Signal, config: &PipelineConfig) -> Result<RateAnalysis> {
    let extrema = detect_extrema(signal, &config.extrema);
    let period = estimate_period(&extrema, &config.period)?;
    let rpm = rpm_from_period(&period.estimate, signal.len(), &config.rate)?;
    Ok(RateAnalysis {
        extrema,
        period,
        rpm,
    })
}

pub struct Pipeline {
    config: PipelineConfig,
    reducer: FrameReducer,
}

impl Pipeline {
    /// # Errors
    ///
    /// [`PipelineError::Config`] when the configuration fails
    /// [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let reducer = FrameReducer::new(config.reducer.clone())?;
        Ok(Self { config, reducer })
    }

    /// Pipeline with a custom geometry backend.
    pub fn with_geometry(config: PipelineConfig, geometry: Arc<dyn GeometryOps>) -> Result<Self> {
        config.validate()?;
        let reducer = FrameReducer::with_geometry(config.reducer.clone(), geometry)?;
        Ok(Self { config, reducer })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pair point sets with timestamps and run the session.
    pub fn run_session(&self, clouds: Vec<PointCloud>, timestamps: &[f64]) -> Result<SessionReport> {
        let frames = frames_from_parts(clouds, timestamps)?;
        self.run(&frames)
    }

    pub fn run(&self, frames: &[Frame]) -> Result<SessionReport> {
        self.run_with_progress(frames, &AtomicBool::new(false), &|| {})
    }

    /// Run, stopping with [`PipelineError::Cancelled`] once `cancel` is set.
    pub fn run_with_cancel(&self, frames: &[Frame], cancel: &AtomicBool) -> Result<SessionReport> {
        self.run_with_progress(frames, cancel, &|| {})
    }

    /// Run, calling `on_frame` after each frame is reduced.
    pub fn run_with_progress(
        &self,
        frames: &[Frame],
        cancel: &AtomicBool,
        on_frame: &(dyn Fn() + Sync),
    ) -> Result<SessionReport> {
        let timestamps: Vec<f64> = frames.iter().map(|f| f.timestamp).collect();
        validate_timestamps(frames.len(), &timestamps)?;

        info!(
            "reducing {} frames ({})",
            frames.len(),
            if self.config.parallel {
                "parallel"
            } else {
                "sequential"
            }
        );
        let reductions = self.reduce_frames(frames, cancel, on_frame)?;
        self.analyze(&reductions, &timestamps)
    }

    /// Reduce every frame, results in frame order.
    pub fn reduce_frames(
        &self,
        frames: &[Frame],
        cancel: &AtomicBool,
        on_frame: &(dyn Fn() + Sync),
    ) -> Result<Vec<FrameReduction>> {
        let total = frames.len();
        let completed = AtomicUsize::new(0);

        let reduce_one = |frame: &Frame| -> Option<FrameReduction> {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let reduction = self.reducer.reduce(frame);
            completed.fetch_add(1, Ordering::Relaxed);
            on_frame();
            Some(reduction)
        };

        let reductions: Option<Vec<FrameReduction>> = if self.config.parallel {
            frames.par_iter().map(reduce_one).collect()
        } else {
            frames.iter().map(reduce_one).collect()
        };

        reductions.ok_or_else(|| {
            let completed = completed.load(Ordering::Relaxed);
            warn!("cancelled after {} of {} frames", completed, total);
            PipelineError::Cancelled { completed, total }
        })
    }

    /// Signal analysis and aggregation over finished reductions.
    pub fn analyze(&self, reductions: &[FrameReduction], timestamps: &[f64]) -> Result<SessionReport> {
        let config = &self.config;
        let signal = Signal::assemble(reductions, timestamps, &config.indicator)?;

        let mut audit = audit_reductions(reductions);
        audit.signal_gaps = signal.gaps();

        let extrema = detect_extrema(&signal, &config.extrema);
        if let ExtremaOutcome::Idle { at } = extrema {
            audit.idle_at = Some(at);
        }

        let (period, rpm) = match config.rate.method {
            _ if extrema.is_idle() => {
                let rpm = rpm_from_period(&PeriodEstimate::Idle, reductions.len(), &config.rate)?;
                (Some(PeriodEstimate::Idle), rpm)
            }
            RateMethod::Extrema => {
                let report = estimate_period(&extrema, &config.period)?;
                let rpm = rpm_from_period(&report.estimate, reductions.len(), &config.rate)?;
                audit.excluded_extrema = report.excluded;
                (Some(report.estimate), rpm)
            }
            RateMethod::Orientation => {
                let normals: Vec<Option<[f64; 3]>> = reductions
                    .iter()
                    .map(|r| if r.valid { r.normal } else { None })
                    .collect();
                let rpm = rpm_from_normals(&normals, timestamps, &config.rate)?;
                let period = match estimate_period(&extrema, &config.period) {
                    Ok(report) => {
                        audit.excluded_extrema = report.excluded;
                        Some(report.estimate)
                    }
                    Err(e) => {
                        warn!("no period alongside orientation rate: {}", e);
                        None
                    }
                };
                (period, rpm)
            }
        };
        audit.skipped_rate_pairs = rpm.skipped_pairs;

        let dimensions = aggregate_dimensions(reductions, &config.dimensions)?;

        info!(
            "{} of {} frames valid, {:.2} rpm, dimensions {:.2?}",
            audit.valid_frames, audit.frames, rpm.rpm, dimensions.dimensions
        );

        let extrema = match extrema {
            ExtremaOutcome::Marks(marks) => marks,
            ExtremaOutcome::Idle { .. } => Vec::new(),
        };

        Ok(SessionReport {
            timestamps: timestamps.to_vec(),
            extents: reductions.iter().map(|r| r.extents).collect(),
            areas: reductions.iter().map(|r| r.area).collect(),
            depths: reductions.iter().map(|r| r.depth).collect(),
            valid: reductions.iter().map(|r| r.valid).collect(),
            mean_depth: dimensions.mean_depth,
            dimensions,
            period,
            extrema,
            rpm,
            audit,
        })
    }
}

fn audit_reductions(reductions: &[FrameReduction]) -> Audit {
    let mut audit = Audit {
        frames: reductions.len(),
        ..Audit::default()
    };
    for r in reductions {
        if r.valid {
            audit.valid_frames += 1;
        }
        if let Some(stage) = r.failed_stage {
            *audit.dropped_by_stage.entry(stage).or_default() += 1;
        }
        if r.subsampled {
            audit.subsampled_frames.push(r.index);
        }
        for (stage, removed) in r.counts.removed() {
            *audit.points_removed.entry(stage).or_default() += removed;
        }
    }
    audit
}
