//! Geometry capability used by the frame reducer.
//!
//! [`GeometryOps`] collects the neighborhood, clustering, plane and
//! bounding-box operations the reducer relies on. [`KdTreeGeometry`] is the
//! in-crate implementation over `kiddo`, `nalgebra` and `rand`.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use thiserror::Error;

use super::{clustering, filtering, plane};
use crate::config::{BoundingBoxKind, RansacConfig};

pub use plane::PlaneFit;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("no points to measure")]
    EmptyCloud,

    #[error("covariance eigen-decomposition did not produce finite axes")]
    DegenerateCovariance,
}

/// Operations the reducer performs on a single frame's points.
///
/// Masks and labels are aligned with the input slice.
pub trait GeometryOps: Send + Sync {
    /// Keep-mask rejecting points whose mean distance to their `neighbors`
    /// nearest points exceeds `mean + std_ratio * std` over the frame.
    fn statistical_outliers(&self, points: &[[f32; 3]], neighbors: usize, std_ratio: f32)
        -> Vec<bool>;

    /// Keep-mask rejecting points with fewer than `min_neighbors` other points
    /// within `radius`.
    fn radius_outliers(&self, points: &[[f32; 3]], min_neighbors: usize, radius: f32) -> Vec<bool>;

    /// DBSCAN labels, `-1` for noise. Cluster ids follow the order of each
    /// cluster's lowest-index core point.
    fn cluster(&self, points: &[[f32; 3]], eps: f32, min_points: usize) -> Vec<i32>;

    /// Dominant plane by RANSAC, or `None` if no plane could be hypothesized.
    fn segment_plane(&self, points: &[[f32; 3]], params: &RansacConfig) -> Option<PlaneFit>;

    /// Box extents. Axis-aligned extents are in x, y, z order; oriented
    /// extents follow the principal axes, largest variance first.
    fn bounding_box(
        &self,
        points: &[[f32; 3]],
        kind: BoundingBoxKind,
    ) -> Result<[f32; 3], GeometryError>;
}

/// KD-tree backed geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct KdTreeGeometry;

impl GeometryOps for KdTreeGeometry {
    fn statistical_outliers(
        &self,
        points: &[[f32; 3]],
        neighbors: usize,
        std_ratio: f32,
    ) -> Vec<bool> {
        filtering::statistical_outlier_mask(points, neighbors, std_ratio)
    }

    fn radius_outliers(&self, points: &[[f32; 3]], min_neighbors: usize, radius: f32) -> Vec<bool> {
        filtering::radius_outlier_mask(points, min_neighbors, radius)
    }

    fn cluster(&self, points: &[[f32; 3]], eps: f32, min_points: usize) -> Vec<i32> {
        clustering::dbscan(points, eps, min_points)
    }

    fn segment_plane(&self, points: &[[f32; 3]], params: &RansacConfig) -> Option<PlaneFit> {
        plane::segment_plane(points, params)
    }

    fn bounding_box(
        &self,
        points: &[[f32; 3]],
        kind: BoundingBoxKind,
    ) -> Result<[f32; 3], GeometryError> {
        match kind {
            BoundingBoxKind::AxisAligned => axis_aligned_extents(points),
            BoundingBoxKind::Oriented => oriented_extents(points),
        }
    }
}

/// Centroid and principal axes of a point set.
#[derive(Debug, Clone)]
pub struct PrincipalAxes {
    pub centroid: Vector3<f64>,
    /// Unit axes, largest variance first
    pub axes: [Vector3<f64>; 3],
    /// Population variance along each axis, descending
    pub variances: [f64; 3],
}

/// PCA of the point covariance.
///
/// Returns `None` for an empty set or when the decomposition is not finite.
pub fn principal_axes(points: &[[f32; 3]]) -> Option<PrincipalAxes> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;

    let mut centroid = Vector3::zeros();
    for p in points {
        centroid += Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
    }
    centroid /= n;

    let mut cov = Matrix3::zeros();
    for p in points {
        let d = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let eig = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let axes = order.map(|i| eig.eigenvectors.column(i).into_owned());
    let variances = order.map(|i| eig.eigenvalues[i].max(0.0));

    if axes.iter().any(|a| !a.iter().all(|v| v.is_finite())) {
        return None;
    }

    Some(PrincipalAxes {
        centroid,
        axes,
        variances,
    })
}

/// Max minus min along x, y and z.
pub fn axis_aligned_extents(points: &[[f32; 3]]) -> Result<[f32; 3], GeometryError> {
    if points.is_empty() {
        return Err(GeometryError::EmptyCloud);
    }
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in points {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    Ok([max[0] - min[0], max[1] - min[1], max[2] - min[2]])
}

/// Extents of the PCA-aligned box, largest-variance axis first.
pub fn oriented_extents(points: &[[f32; 3]]) -> Result<[f32; 3], GeometryError> {
    if points.is_empty() {
        return Err(GeometryError::EmptyCloud);
    }
    let pca = principal_axes(points).ok_or(GeometryError::DegenerateCovariance)?;

    let mut extents = [0.0f32; 3];
    for (slot, axis) in extents.iter_mut().zip(pca.axes.iter()) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for p in points {
            let d = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - pca.centroid;
            let t = d.dot(axis);
            lo = lo.min(t);
            hi = hi.max(t);
        }
        *slot = (hi - lo) as f32;
    }
    Ok(extents)
}
