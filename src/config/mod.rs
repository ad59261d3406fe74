//! Configuration types for the rotation pipeline.
//!
//! Every tunable of the batch is an explicit field here. Each field carries a
//! serde default so a YAML file only needs to name what it overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`PipelineConfig::validate`] and [`ReducerConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("axis index {axis} for '{field}' is out of range (expected 0, 1 or 2)")]
    AxisOutOfRange { field: &'static str, axis: usize },

    #[error("'{field}' must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },

    #[error("'{field}' must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("outlier quantile must lie in [0, 1], got {0}")]
    QuantileOutOfRange(f64),
}

/// Parameters for statistical outlier removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalFilterConfig {
    /// Number of nearest neighbors used for the mean distance
    #[serde(default = "default_stat_neighbors")]
    pub neighbors: usize,

    /// Points whose mean neighbor distance exceeds `mean + std_ratio * std` are dropped
    #[serde(default = "default_std_ratio")]
    pub std_ratio: f32,
}

fn default_stat_neighbors() -> usize {
    20
}

fn default_std_ratio() -> f32 {
    2.0
}

impl Default for StatisticalFilterConfig {
    fn default() -> Self {
        Self {
            neighbors: default_stat_neighbors(),
            std_ratio: default_std_ratio(),
        }
    }
}

/// Parameters for radius outlier removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusFilterConfig {
    /// Minimum number of other points required within `radius`
    pub min_neighbors: usize,

    /// Search radius
    pub radius: f32,
}

impl RadiusFilterConfig {
    pub fn new(min_neighbors: usize, radius: f32) -> Self {
        Self {
            min_neighbors,
            radius,
        }
    }
}

/// Random-sample-consensus plane segmentation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RansacConfig {
    /// Maximum point-to-plane distance for an inlier
    #[serde(default = "default_ransac_distance")]
    pub distance_threshold: f32,

    /// Points drawn per hypothesis (3 = exact plane, more = least squares)
    #[serde(default = "default_ransac_sample_size")]
    pub sample_size: usize,

    /// Number of hypotheses
    #[serde(default = "default_ransac_iterations")]
    pub iterations: usize,

    /// RNG seed, so repeated runs over one session agree
    #[serde(default)]
    pub seed: u64,
}

fn default_ransac_distance() -> f32 {
    0.01
}

fn default_ransac_sample_size() -> usize {
    3
}

fn default_ransac_iterations() -> usize {
    1000
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_ransac_distance(),
            sample_size: default_ransac_sample_size(),
            iterations: default_ransac_iterations(),
            seed: 0,
        }
    }
}

/// How the static background is removed from a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackgroundRemoval {
    /// Keep every point.
    None,
    /// Fit the dominant plane and drop its inliers.
    PlanarRansac(RansacConfig),
    /// Keep points whose depth is within `offset` of the nearest point.
    DepthOffset { offset: f32 },
}

impl Default for BackgroundRemoval {
    fn default() -> Self {
        BackgroundRemoval::DepthOffset { offset: 0.5 }
    }
}

/// Which of the kept clusters form the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterSelection {
    /// Merge every cluster at or above the minimum size.
    #[default]
    MergeAll,
    /// Keep only the largest cluster (ties go to the lowest cluster id).
    Largest,
}

/// Configuration for DBSCAN clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Points (including itself) within `eps` for a core point
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Clusters smaller than this are discarded as noise
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default)]
    pub selection: ClusterSelection,
}

fn default_eps() -> f32 {
    0.05
}

fn default_min_points() -> usize {
    100
}

fn default_min_cluster_size() -> usize {
    1000
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_points: default_min_points(),
            min_cluster_size: default_min_cluster_size(),
            selection: ClusterSelection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundingBoxKind {
    /// PCA-aligned box; extents ordered by decreasing variance.
    #[default]
    Oriented,
    /// World-axis box; extents in x, y, z order.
    AxisAligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionPlane {
    #[default]
    Xy,
    Xz,
    Yz,
}

impl ProjectionPlane {
    /// Coordinate axes spanning the plane.
    pub fn axes(self) -> (usize, usize) {
        match self {
            ProjectionPlane::Xy => (0, 1),
            ProjectionPlane::Xz => (0, 2),
            ProjectionPlane::Yz => (1, 2),
        }
    }
}

/// Silhouette projection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default)]
    pub plane: ProjectionPlane,

    /// Occupancy grid resolution (N x N cells)
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
}

fn default_grid_size() -> usize {
    500
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            plane: ProjectionPlane::default(),
            grid_size: default_grid_size(),
        }
    }
}

/// Per-frame cleaning and indicator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerConfig {
    #[serde(default = "default_statistical")]
    pub statistical: Option<StatisticalFilterConfig>,

    #[serde(default = "default_radius")]
    pub radius: Option<RadiusFilterConfig>,

    #[serde(default)]
    pub background: BackgroundRemoval,

    /// Axis pointing away from the sensor
    #[serde(default = "default_depth_axis")]
    pub depth_axis: usize,

    #[serde(default = "default_clustering")]
    pub clustering: Option<ClusteringConfig>,

    #[serde(default = "default_final_radius")]
    pub final_radius: Option<RadiusFilterConfig>,

    #[serde(default)]
    pub bounding_box: BoundingBoxKind,

    #[serde(default = "default_projection")]
    pub projection: Option<ProjectionConfig>,

    /// Dominant-face segmentation inside the cluster; `None` skips normals
    #[serde(default)]
    pub normal: Option<RansacConfig>,

    /// Frames above this size are subsampled before neighbor filtering
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

fn default_statistical() -> Option<StatisticalFilterConfig> {
    Some(StatisticalFilterConfig::default())
}

fn default_radius() -> Option<RadiusFilterConfig> {
    Some(RadiusFilterConfig::new(16, 0.05))
}

fn default_depth_axis() -> usize {
    2
}

fn default_clustering() -> Option<ClusteringConfig> {
    Some(ClusteringConfig::default())
}

fn default_final_radius() -> Option<RadiusFilterConfig> {
    Some(RadiusFilterConfig::new(50, 0.02))
}

fn default_projection() -> Option<ProjectionConfig> {
    Some(ProjectionConfig::default())
}

fn default_max_points() -> usize {
    2_000_000
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            statistical: default_statistical(),
            radius: default_radius(),
            background: BackgroundRemoval::default(),
            depth_axis: default_depth_axis(),
            clustering: default_clustering(),
            final_radius: default_final_radius(),
            bounding_box: BoundingBoxKind::default(),
            projection: default_projection(),
            normal: None,
            max_points: default_max_points(),
        }
    }
}

/// Which per-frame quantity feeds the extrema detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Extent,
    #[default]
    Area,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default)]
    pub kind: IndicatorKind,

    /// Extent axis (default: vector norm) or normal component (default: x)
    #[serde(default)]
    pub scalar_axis: Option<usize>,
}

/// Band within which a sample counts as "stuck" against its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleTolerance {
    /// Fixed band in signal units (e.g. 500 cells for pixel-area signals).
    Absolute(f64),
    /// Fraction of the peak-to-peak range of the valid samples.
    Relative(f64),
}

impl Default for IdleTolerance {
    fn default() -> Self {
        IdleTolerance::Relative(0.001)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremaConfig {
    /// Neighbors compared on each side of a candidate
    #[serde(default = "default_half_window")]
    pub half_window: usize,

    #[serde(default)]
    pub idle_tolerance: IdleTolerance,

    /// Consecutive stuck samples that mean the object is not rotating
    #[serde(default = "default_idle_run_length")]
    pub idle_run_length: usize,
}

fn default_half_window() -> usize {
    2
}

fn default_idle_run_length() -> usize {
    5
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            half_window: default_half_window(),
            idle_tolerance: IdleTolerance::default(),
            idle_run_length: default_idle_run_length(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralTendency {
    #[default]
    Mean,
    Median,
    /// Most frequent value after rounding to `decimals` places.
    Mode { decimals: u32 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodConfig {
    #[serde(default)]
    pub max_tendency: CentralTendency,

    #[serde(default)]
    pub min_tendency: CentralTendency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMethod {
    #[default]
    Extrema,
    Orientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default)]
    pub method: RateMethod,

    /// Same-kind extrema per revolution times the half period (2 for a box)
    #[serde(default = "default_symmetry_order")]
    pub symmetry_order: u32,

    /// Rounding precision for the angular-velocity mode
    #[serde(default = "default_mode_decimals")]
    pub mode_decimals: u32,
}

fn default_symmetry_order() -> u32 {
    2
}

fn default_mode_decimals() -> u32 {
    2
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            method: RateMethod::default(),
            symmetry_order: default_symmetry_order(),
            mode_decimals: default_mode_decimals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Extent axis prone to truncation, filtered by quantile
    #[serde(default = "default_outlier_axis")]
    pub outlier_axis: usize,

    /// Values below this quantile of the outlier axis are rejected
    #[serde(default = "default_outlier_quantile")]
    pub outlier_quantile: f64,

    /// scale = slope * mean_depth + intercept
    #[serde(default = "default_scale_slope")]
    pub scale_slope: f64,

    #[serde(default)]
    pub scale_intercept: f64,

    /// Multiplier from sensor units to output units (m -> cm by default)
    #[serde(default = "default_unit_conversion")]
    pub unit_conversion: f64,
}

fn default_outlier_axis() -> usize {
    1
}

fn default_outlier_quantile() -> f64 {
    0.5
}

fn default_scale_slope() -> f64 {
    1.0
}

fn default_unit_conversion() -> f64 {
    100.0
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            outlier_axis: default_outlier_axis(),
            outlier_quantile: default_outlier_quantile(),
            scale_slope: default_scale_slope(),
            scale_intercept: 0.0,
            unit_conversion: default_unit_conversion(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub reducer: ReducerConfig,

    #[serde(default)]
    pub indicator: IndicatorConfig,

    #[serde(default)]
    pub extrema: ExtremaConfig,

    #[serde(default)]
    pub period: PeriodConfig,

    #[serde(default)]
    pub rate: RateConfig,

    #[serde(default)]
    pub dimensions: DimensionConfig,

    /// Reduce frames on the rayon pool
    #[serde(default)]
    pub parallel: bool,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Reject settings that would make a stage meaningless.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.reducer.validate()?;
        check_axis("dimensions.outlier_axis", self.dimensions.outlier_axis)?;
        if let Some(axis) = self.indicator.scalar_axis {
            check_axis("indicator.scalar_axis", axis)?;
        }

        check_min("extrema.half_window", self.extrema.half_window, 1)?;
        check_min("extrema.idle_run_length", self.extrema.idle_run_length, 1)?;
        check_min(
            "rate.symmetry_order",
            self.rate.symmetry_order as usize,
            1,
        )?;

        let q = self.dimensions.outlier_quantile;
        if !(0.0..=1.0).contains(&q) {
            return Err(ConfigError::QuantileOutOfRange(q));
        }
        Ok(())
    }
}

impl ReducerConfig {
    /// Reject reducer settings that would index past a point or divide by zero.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_axis("reducer.depth_axis", self.depth_axis)?;
        check_min("reducer.max_points", self.max_points, 1)?;

        if let Some(projection) = &self.projection {
            check_min("projection.grid_size", projection.grid_size, 2)?;
        }
        if let Some(clustering) = &self.clustering {
            check_positive("clustering.eps", clustering.eps as f64)?;
        }
        if let Some(stat) = &self.statistical {
            check_min("statistical.neighbors", stat.neighbors, 1)?;
        }
        for radius in [&self.radius, &self.final_radius].into_iter().flatten() {
            check_positive("radius.radius", radius.radius as f64)?;
        }
        if let BackgroundRemoval::PlanarRansac(ransac) = &self.background {
            check_min("background.sample_size", ransac.sample_size, 3)?;
        }
        if let Some(ransac) = &self.normal {
            check_min("normal.sample_size", ransac.sample_size, 3)?;
        }
        Ok(())
    }
}

fn check_axis(field: &'static str, axis: usize) -> std::result::Result<(), ConfigError> {
    if axis > 2 {
        return Err(ConfigError::AxisOutOfRange { field, axis });
    }
    Ok(())
}

fn check_min(field: &'static str, value: usize, min: usize) -> std::result::Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall { field, min, value });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(())
}
