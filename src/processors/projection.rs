//! Silhouette area of a cluster projected onto a coordinate plane.

use std::collections::HashSet;

use crate::config::ProjectionConfig;

/// Occupied-cell area of the projection, in squared input units.
///
/// Each projected coordinate is normalised to `[0, grid_size - 1]` and
/// truncated to a cell index. The occupied cell count is scaled by the real
/// area of one cell, `(range_u / (N - 1)) * (range_v / (N - 1))`.
///
/// A projection with zero range on either axis has zero area.
pub fn projection_area(points: &[[f32; 3]], config: &ProjectionConfig) -> f64 {
    let n = config.grid_size;
    if points.is_empty() || n < 2 {
        return 0.0;
    }
    let (u_axis, v_axis) = config.plane.axes();

    let (u_min, u_max) = bounds(points, u_axis);
    let (v_min, v_max) = bounds(points, v_axis);
    let u_range = (u_max - u_min) as f64;
    let v_range = (v_max - v_min) as f64;
    if !(u_range > 0.0 && v_range > 0.0) {
        return 0.0;
    }

    let cells = (n - 1) as f64;
    let occupied: HashSet<(usize, usize)> = points
        .iter()
        .map(|p| {
            let u = ((p[u_axis] - u_min) as f64 / u_range * cells) as usize;
            let v = ((p[v_axis] - v_min) as f64 / v_range * cells) as usize;
            (u, v)
        })
        .collect();

    let cell_area = (u_range / cells) * (v_range / cells);
    occupied.len() as f64 * cell_area
}

fn bounds(points: &[[f32; 3]], axis: usize) -> (f32, f32) {
    points
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[axis]), hi.max(p[axis]))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionPlane;

    fn config(plane: ProjectionPlane, grid_size: usize) -> ProjectionConfig {
        ProjectionConfig { plane, grid_size }
    }

    #[test]
    fn test_full_grid_area() {
        // 11x11 lattice with 0.125 spacing fills an 11-cell grid completely
        let mut pts = Vec::new();
        for i in 0..11 {
            for j in 0..11 {
                pts.push([i as f32 * 0.125, j as f32 * 0.125, 5.0]);
            }
        }

        let area = projection_area(&pts, &config(ProjectionPlane::Xy, 11));

        // 121 cells of 0.125 x 0.125
        assert!((area - 121.0 * 0.015625).abs() < 1e-9, "{area}");
    }

    #[test]
    fn test_sparse_points_occupy_few_cells() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 2.0], [0.0, 0.0, 2.0]];

        let area = projection_area(&pts, &config(ProjectionPlane::Xz, 5));

        // 3 cells of (1/4) x (2/4)
        assert!((area - 3.0 * 0.25 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_range_is_zero_area() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        assert_eq!(projection_area(&pts, &config(ProjectionPlane::Xy, 500)), 0.0);
        assert_eq!(projection_area(&[], &config(ProjectionPlane::Xy, 500)), 0.0);
    }

    #[test]
    fn test_plane_selects_axes() {
        let pts = vec![[0.0, 0.0, 0.0], [0.0, 1.0, 1.0]];
        assert_eq!(projection_area(&pts, &config(ProjectionPlane::Xy, 10)), 0.0);
        assert!(projection_area(&pts, &config(ProjectionPlane::Yz, 10)) > 0.0);
    }
}
