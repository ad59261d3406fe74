//! RANSAC plane segmentation.
//!
//! Used twice per frame: to strip the dominant background plane, and to find
//! the dominant face of the cleaned object for its surface normal.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use super::geometry::principal_axes;
use crate::config::RansacConfig;

/// Result of a plane fit: `normal . p + offset = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneFit {
    /// Unit normal
    pub normal: [f64; 3],
    pub offset: f64,
    /// Indices of points within the distance threshold, ascending
    pub inliers: Vec<usize>,
}

impl PlaneFit {
    /// Unsigned point-to-plane distance.
    pub fn distance(&self, p: &[f32; 3]) -> f64 {
        plane_distance(&Vector3::from(self.normal), self.offset, p)
    }
}

#[inline]
fn to_vec(p: &[f32; 3]) -> Vector3<f64> {
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

#[inline]
fn plane_distance(normal: &Vector3<f64>, offset: f64, p: &[f32; 3]) -> f64 {
    (normal.dot(&to_vec(p)) + offset).abs()
}

/// Plane through a sample: exact for three points, least squares for more.
fn plane_through(coords: &[[f32; 3]], sample: &[usize]) -> Option<(Vector3<f64>, f64)> {
    let (normal, anchor) = if sample.len() == 3 {
        let a = to_vec(&coords[sample[0]]);
        let b = to_vec(&coords[sample[1]]);
        let c = to_vec(&coords[sample[2]]);
        ((b - a).cross(&(c - a)), a)
    } else {
        let picked: Vec<[f32; 3]> = sample.iter().map(|&i| coords[i]).collect();
        let axes = principal_axes(&picked)?;
        // Least-variance direction; a line-like sample has two near-zero
        // variances and is rejected below
        if axes.variances[1] <= f64::EPSILON {
            return None;
        }
        (axes.axes[2], axes.centroid)
    };

    let norm = normal.norm();
    if !(norm > 1e-12) {
        return None;
    }
    let normal = normal / norm;
    Some((normal, -normal.dot(&anchor)))
}

/// Fit the plane supported by the most points.
///
/// Hypotheses are drawn from a `StdRng` seeded with `config.seed`. The first
/// hypothesis reaching the highest inlier count wins. Degenerate (collinear)
/// samples are skipped.
///
/// # Returns
///
/// `None` when the cloud has fewer points than the sample size or every
/// sample was degenerate.
pub fn segment_plane(coords: &[[f32; 3]], config: &RansacConfig) -> Option<PlaneFit> {
    let n = coords.len();
    let sample_size = config.sample_size.max(3);
    if n < sample_size {
        return None;
    }

    let threshold = config.distance_threshold as f64;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Vector3<f64>, f64, usize)> = None;

    for _ in 0..config.iterations.max(1) {
        let sample = index::sample(&mut rng, n, sample_size).into_vec();
        let Some((normal, offset)) = plane_through(coords, &sample) else {
            continue;
        };

        let count = coords
            .par_iter()
            .filter(|p| plane_distance(&normal, offset, p) <= threshold)
            .count();

        if best.map_or(true, |(_, _, c)| count > c) {
            best = Some((normal, offset, count));
        }
    }

    let (normal, offset, _) = best?;
    let inliers = coords
        .iter()
        .enumerate()
        .filter(|(_, p)| plane_distance(&normal, offset, p) <= threshold)
        .map(|(i, _)| i)
        .collect();

    Some(PlaneFit {
        normal: [normal.x, normal.y, normal.z],
        offset,
        inliers,
    })
}
