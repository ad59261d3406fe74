//! Per-frame reduction: clean a raw frame down to the rotating object and
//! measure its motion indicators.
//!
//! Stages run in a fixed order and each one is optional:
//!
//! 1. drop non-finite coordinates
//! 2. background removal (planar RANSAC or depth offset)
//! 3. deterministic subsampling of oversized frames
//! 4. statistical outlier removal
//! 5. radius outlier removal
//! 6. DBSCAN and cluster selection
//! 7. final radius outlier removal
//!
//! A stage that leaves no points stops the frame; the result is the sentinel
//! reduction (zero extents, zero area, zero depth, no normal) with the failing
//! stage recorded. Frames never fail the batch.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use super::clustering::select_clusters;
use super::geometry::{GeometryOps, KdTreeGeometry};
use super::projection::projection_area;
use crate::config::{BackgroundRemoval, ConfigError, ReducerConfig};
use crate::core::frame::{Frame, PointCloud};
use crate::core::transforms::{crop_depth, drop_non_finite, subsample_cloud};

/// Reduction stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionStage {
    NonFinite,
    Background,
    Subsample,
    Statistical,
    Radius,
    Clustering,
    FinalRadius,
    BoundingBox,
}

/// Point count entering the reducer and after each stage that ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageCounts {
    pub input: usize,
    pub after: Vec<(ReductionStage, usize)>,
}

impl StageCounts {
    fn record(&mut self, stage: ReductionStage, count: usize) {
        self.after.push((stage, count));
    }

    /// Points removed by each stage that ran.
    pub fn removed(&self) -> Vec<(ReductionStage, usize)> {
        let mut previous = self.input;
        self.after
            .iter()
            .map(|&(stage, count)| {
                let removed = previous.saturating_sub(count);
                previous = count;
                (stage, removed)
            })
            .collect()
    }
}

/// Foreground points of one frame after cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedCluster {
    pub frame_index: usize,
    pub points: PointCloud,
}

/// Everything the downstream stages need from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReduction {
    pub index: usize,
    pub cluster: CleanedCluster,
    pub valid: bool,
    /// Stage that emptied the frame, for invalid reductions
    pub failed_stage: Option<ReductionStage>,
    pub extents: [f32; 3],
    /// Projection area, 0 when projection is disabled
    pub area: f64,
    /// Mean coordinate of the cluster along the depth axis
    pub depth: f64,
    /// Dominant-face normal, pointing toward the sensor
    pub normal: Option<[f64; 3]>,
    pub counts: StageCounts,
    pub subsampled: bool,
}

impl FrameReduction {
    fn sentinel(index: usize, stage: ReductionStage, counts: StageCounts, subsampled: bool) -> Self {
        Self {
            index,
            cluster: CleanedCluster {
                frame_index: index,
                points: PointCloud::new(),
            },
            valid: false,
            failed_stage: Some(stage),
            extents: [0.0; 3],
            area: 0.0,
            depth: 0.0,
            normal: None,
            counts,
            subsampled,
        }
    }
}

/// Reduces frames with a fixed configuration and geometry backend.
#[derive(Clone)]
pub struct FrameReducer {
    config: ReducerConfig,
    geometry: Arc<dyn GeometryOps>,
}

impl FrameReducer {
    /// Reducer backed by [`KdTreeGeometry`].
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the configuration fails [`ReducerConfig::validate`].
    pub fn new(config: ReducerConfig) -> Result<Self, ConfigError> {
        Self::with_geometry(config, Arc::new(KdTreeGeometry))
    }

    pub fn with_geometry(
        config: ReducerConfig,
        geometry: Arc<dyn GeometryOps>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, geometry })
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Clean one frame and derive its indicators.
    pub fn reduce(&self, frame: &Frame) -> FrameReduction {
        let config = &self.config;
        let index = frame.index;
        let mut counts = StageCounts {
            input: frame.points.len(),
            after: Vec::new(),
        };
        let mut subsampled = false;

        macro_rules! bail_if_empty {
            ($len:expr, $stage:expr) => {
                let len = $len;
                counts.record($stage, len);
                debug!("frame {}: {:?} -> {} points", index, $stage, len);
                if len == 0 {
                    warn!("frame {}: no points left after {:?}", index, $stage);
                    return FrameReduction::sentinel(index, $stage, counts, subsampled);
                }
            };
        }

        let cloud = drop_non_finite(&frame.points);
        bail_if_empty!(cloud.len(), ReductionStage::NonFinite);

        let cloud = match &config.background {
            BackgroundRemoval::None => cloud,
            BackgroundRemoval::DepthOffset { offset } => {
                crop_depth(&cloud, config.depth_axis, *offset)
            }
            BackgroundRemoval::PlanarRansac(params) => {
                let coords = cloud.to_coords();
                match self.geometry.segment_plane(&coords, params) {
                    Some(fit) => {
                        let mut keep = vec![true; coords.len()];
                        for &i in &fit.inliers {
                            keep[i] = false;
                        }
                        cloud.retain_mask(&keep)
                    }
                    None => {
                        debug!("frame {}: no background plane found", index);
                        cloud
                    }
                }
            }
        };
        if !matches!(config.background, BackgroundRemoval::None) {
            bail_if_empty!(cloud.len(), ReductionStage::Background);
        }

        let (cloud, stride) = subsample_cloud(&cloud, config.max_points);
        if stride > 1 {
            subsampled = true;
            debug!(
                "frame {}: subsampled by ~{}x to {} points",
                index,
                stride,
                cloud.len()
            );
            counts.record(ReductionStage::Subsample, cloud.len());
        }

        let mut coords = cloud.to_coords();

        if let Some(stat) = &config.statistical {
            let keep = self
                .geometry
                .statistical_outliers(&coords, stat.neighbors, stat.std_ratio);
            coords = apply_mask(coords, &keep);
            bail_if_empty!(coords.len(), ReductionStage::Statistical);
        }

        if let Some(radius) = &config.radius {
            let keep = self
                .geometry
                .radius_outliers(&coords, radius.min_neighbors, radius.radius);
            coords = apply_mask(coords, &keep);
            bail_if_empty!(coords.len(), ReductionStage::Radius);
        }

        if let Some(clustering) = &config.clustering {
            let labels = self
                .geometry
                .cluster(&coords, clustering.eps, clustering.min_points);
            let kept = select_clusters(&labels, clustering.min_cluster_size, clustering.selection);
            coords = kept.iter().map(|&i| coords[i]).collect();
            bail_if_empty!(coords.len(), ReductionStage::Clustering);
        }

        if let Some(radius) = &config.final_radius {
            let keep = self
                .geometry
                .radius_outliers(&coords, radius.min_neighbors, radius.radius);
            coords = apply_mask(coords, &keep);
            bail_if_empty!(coords.len(), ReductionStage::FinalRadius);
        }

        let extents = match self.geometry.bounding_box(&coords, config.bounding_box) {
            Ok(extents) => extents,
            Err(e) => {
                warn!("frame {}: bounding box failed: {}", index, e);
                return FrameReduction::sentinel(
                    index,
                    ReductionStage::BoundingBox,
                    counts,
                    subsampled,
                );
            }
        };

        let area = config
            .projection
            .as_ref()
            .map_or(0.0, |projection| projection_area(&coords, projection));

        let normal = config.normal.as_ref().and_then(|params| {
            self.geometry
                .segment_plane(&coords, params)
                .map(|fit| toward_sensor(fit.normal, config.depth_axis))
        });

        let points = PointCloud::from_coords(&coords);
        let depth = points.mean_along(config.depth_axis).unwrap_or(0.0);

        FrameReduction {
            index,
            cluster: CleanedCluster {
                frame_index: index,
                points,
            },
            valid: true,
            failed_stage: None,
            extents,
            area,
            depth,
            normal,
            counts,
            subsampled,
        }
    }
}

fn apply_mask(coords: Vec<[f32; 3]>, keep: &[bool]) -> Vec<[f32; 3]> {
    coords
        .into_iter()
        .zip(keep)
        .filter_map(|(p, &k)| k.then_some(p))
        .collect()
}

/// Flip a unit normal so its depth component is not positive.
fn toward_sensor(normal: [f64; 3], depth_axis: usize) -> [f64; 3] {
    if normal[depth_axis] > 0.0 {
        normal.map(|v| -v)
    } else {
        normal
    }
}
