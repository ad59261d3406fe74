//! Point cloud transforms applied ahead of geometric filtering.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use super::frame::PointCloud;

/// Seed for frame subsampling, fixed so a given frame always yields the same subset.
const SUBSAMPLE_SEED: u64 = 12345;

/// Drop points with any NaN or infinite coordinate.
pub fn drop_non_finite(cloud: &PointCloud) -> PointCloud {
    let keep: Vec<bool> = (0..cloud.len())
        .into_par_iter()
        .map(|i| cloud.x[i].is_finite() && cloud.y[i].is_finite() && cloud.z[i].is_finite())
        .collect();
    cloud.retain_mask(&keep)
}

/// Keep points whose depth lies within `offset` of the nearest point.
///
/// The sensor looks along `depth_axis`, so the smallest depth value is the
/// nearest surface; everything farther than `nearest + offset` is background.
pub fn crop_depth(cloud: &PointCloud, depth_axis: usize, offset: f32) -> PointCloud {
    let depth = cloud.axis(depth_axis);
    let nearest = depth.iter().copied().fold(f32::INFINITY, f32::min);
    if !nearest.is_finite() {
        return PointCloud::new();
    }
    let limit = nearest + offset;
    let keep: Vec<bool> = depth.iter().map(|&d| d <= limit).collect();
    cloud.retain_mask(&keep)
}

/// Randomly subsample point cloud to at most `max_points`.
///
/// Draws indices from a `StdRng` seeded with [`SUBSAMPLE_SEED`], so a given
/// frame always yields the same subset. Kept points stay in their original
/// order. A `max_points` of 0 is treated as 1.
///
/// # Returns
///
/// Tuple of (subsampled_cloud, stride_factor) where stride_factor is the
/// approximate reduction ratio (ceiling of n/max_points)
pub fn subsample_cloud(cloud: &PointCloud, max_points: usize) -> (PointCloud, usize) {
    let n = cloud.len();
    let max_points = max_points.max(1);

    if n <= max_points {
        return (cloud.clone(), 1);
    }

    let stride_factor = n.div_ceil(max_points);

    let mut rng = StdRng::seed_from_u64(SUBSAMPLE_SEED);
    let mut indices = index::sample(&mut rng, n, max_points).into_vec();
    indices.sort_unstable();

    (cloud.select(&indices), stride_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_non_finite() {
        let cloud = PointCloud::from_xyz(
            vec![0.0, f32::NAN, 1.0, 2.0],
            vec![0.0, 0.0, f32::INFINITY, 2.0],
            vec![0.0, 0.0, 0.0, 2.0],
        );
        let clean = drop_non_finite(&cloud);
        assert_eq!(clean.to_coords(), vec![[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]);
    }

    #[test]
    fn test_crop_depth_keeps_near_points() {
        let cloud = PointCloud::from_coords(&[
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 1.4],
            [0.0, 0.0, 1.6],
            [0.0, 0.0, 3.0],
        ]);
        let cropped = crop_depth(&cloud, 2, 0.5);
        assert_eq!(cropped.z, vec![1.0, 1.4]);
    }

    #[test]
    fn test_crop_depth_empty() {
        assert!(crop_depth(&PointCloud::new(), 2, 0.5).is_empty());
    }

    #[test]
    fn test_subsample_cloud_no_change() {
        let cloud = PointCloud::from_coords(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let (result, stride) = subsample_cloud(&cloud, 10);
        assert_eq!(stride, 1);
        assert_eq!(result, cloud);
    }

    #[test]
    fn test_subsample_cloud_reduces_deterministically() {
        let coords: Vec<[f32; 3]> = (0..1000).map(|i| [i as f32, 0.0, 0.0]).collect();
        let cloud = PointCloud::from_coords(&coords);

        let (a, stride) = subsample_cloud(&cloud, 100);
        let (b, _) = subsample_cloud(&cloud, 100);

        assert_eq!(a.len(), 100);
        assert_eq!(stride, 10);
        assert_eq!(a, b);
        assert!(a.x.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_subsample_cloud_zero_cap() {
        let cloud = PointCloud::from_coords(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let (result, stride) = subsample_cloud(&cloud, 0);
        assert_eq!(result.len(), 1);
        assert_eq!(stride, 2);
    }
}
