//! Neighborhood-based outlier removal.
//!
//! Both filters build a `kiddo` KD-tree over the frame and run their
//! per-point neighbor queries on the rayon pool. They return keep-masks
//! aligned with the input so callers can apply them to any per-point data.

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

/// Statistical outlier removal.
///
/// For every point, the mean Euclidean distance to its `neighbors` nearest
/// other points is computed. Points whose mean exceeds
/// `global_mean + std_ratio * global_std` (sample standard deviation over all
/// points) are rejected.
///
/// # Returns
///
/// Keep-mask, `true` for inliers. Clouds with fewer than two points are kept
/// whole since no neighbor distance exists.
pub fn statistical_outlier_mask(
    coords: &[[f32; 3]],
    neighbors: usize,
    std_ratio: f32,
) -> Vec<bool> {
    let n = coords.len();
    let k = neighbors.min(n.saturating_sub(1));
    if k == 0 {
        return vec![true; n];
    }

    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(coords);
    // One extra slot for the query point itself
    let qty = NonZeroUsize::MIN.saturating_add(k);

    let mean_dists: Vec<f64> = coords
        .par_iter()
        .enumerate()
        .map(|(i, coord)| {
            let found = tree.nearest_n::<SquaredEuclidean>(coord, qty);
            let dists: Vec<f64> = found
                .iter()
                .filter(|nn| nn.item as usize != i)
                .take(k)
                .map(|nn| (nn.distance as f64).sqrt())
                .collect();
            if dists.is_empty() {
                0.0
            } else {
                dists.iter().sum::<f64>() / dists.len() as f64
            }
        })
        .collect();

    let mean = mean_dists.iter().sum::<f64>() / n as f64;
    let var = mean_dists.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let threshold = mean + std_ratio as f64 * var.sqrt();

    mean_dists.iter().map(|&d| d <= threshold).collect()
}

/// Radius outlier removal.
///
/// A point survives when at least `min_neighbors` other points lie within
/// `radius` of it.
pub fn radius_outlier_mask(coords: &[[f32; 3]], min_neighbors: usize, radius: f32) -> Vec<bool> {
    let n = coords.len();
    if n == 0 {
        return Vec::new();
    }
    if min_neighbors == 0 {
        return vec![true; n];
    }

    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(coords);
    let radius_sq = radius * radius;

    coords
        .par_iter()
        .map(|coord| {
            // The query point is always among its own results
            let found = tree.within_unsorted::<SquaredEuclidean>(coord, radius_sq);
            found.len().saturating_sub(1) >= min_neighbors
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 5x5x5 lattice with 0.01 spacing.
    fn lattice() -> Vec<[f32; 3]> {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    pts.push([i as f32 * 0.01, j as f32 * 0.01, k as f32 * 0.01]);
                }
            }
        }
        pts
    }

    #[test]
    fn test_statistical_rejects_far_point() {
        let mut pts = lattice();
        pts.push([5.0, 5.0, 5.0]);

        let mask = statistical_outlier_mask(&pts, 8, 2.0);

        assert_eq!(mask.len(), pts.len());
        assert!(!mask[pts.len() - 1]);
        assert!(mask[..pts.len() - 1].iter().filter(|&&k| k).count() > 100);
    }

    #[test]
    fn test_statistical_small_clouds_kept() {
        assert!(statistical_outlier_mask(&[], 20, 2.0).is_empty());
        assert_eq!(statistical_outlier_mask(&[[0.0, 0.0, 0.0]], 20, 2.0), vec![true]);
    }

    #[test]
    fn test_radius_rejects_isolated_point() {
        let mut pts = lattice();
        pts.push([1.0, 1.0, 1.0]);

        let mask = radius_outlier_mask(&pts, 3, 0.015);

        assert!(!mask[pts.len() - 1]);
        // Every lattice point has at least three axis neighbors at 0.01
        assert!(mask[..pts.len() - 1].iter().all(|&k| k));
    }

    #[test]
    fn test_radius_counts_exclude_self() {
        let pts = vec![[0.0, 0.0, 0.0], [0.01, 0.0, 0.0]];
        assert_eq!(radius_outlier_mask(&pts, 1, 0.05), vec![true, true]);
        assert_eq!(radius_outlier_mask(&pts, 2, 0.05), vec![false, false]);
    }
}
