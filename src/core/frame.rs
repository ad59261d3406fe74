//! Point cloud container and timestamped frames.

use thiserror::Error;

/// Container for 3D point cloud data, stored per axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        debug_assert!(x.len() == y.len() && y.len() == z.len());
        Self { x, y, z }
    }

    /// Creates a point cloud from `[x, y, z]` triples.
    pub fn from_coords(coords: &[[f32; 3]]) -> Self {
        let mut cloud = Self::with_capacity(coords.len());
        for c in coords {
            cloud.push(c[0], c[1], c[2]);
        }
        cloud
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Coordinates along one axis (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(&self, axis: usize) -> &[f32] {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        (0..self.len())
            .map(|i| [self.x[i], self.y[i], self.z[i]])
            .collect()
    }

    /// Keep the points whose mask entry is true.
    pub fn retain_mask(&self, keep: &[bool]) -> PointCloud {
        debug_assert_eq!(keep.len(), self.len());
        let kept = keep.iter().filter(|&&k| k).count();
        let mut out = PointCloud::with_capacity(kept);
        for (i, _) in keep.iter().enumerate().filter(|(_, &k)| k) {
            out.push(self.x[i], self.y[i], self.z[i]);
        }
        out
    }

    /// Points at the given indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        let mut out = PointCloud::with_capacity(indices.len());
        for &i in indices {
            out.push(self.x[i], self.y[i], self.z[i]);
        }
        out
    }

    /// Mean coordinate along one axis, `None` when empty.
    pub fn mean_along(&self, axis: usize) -> Option<f64> {
        let values = self.axis(axis);
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().map(|&v| v as f64).sum();
        Some(sum / values.len() as f64)
    }
}

/// One timestamped capture of a 3D point set.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame within its session
    pub index: usize,
    /// Capture time in seconds
    pub timestamp: f64,
    /// Raw, possibly noisy points (non-finite values allowed)
    pub points: PointCloud,
}

impl Frame {
    pub fn new(index: usize, timestamp: f64, points: PointCloud) -> Self {
        Self {
            index,
            timestamp,
            points,
        }
    }
}

/// Fatal input-contract violations, raised before any frame is reduced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("frame count {frames} does not match timestamp count {timestamps}")]
    CountMismatch { frames: usize, timestamps: usize },

    #[error("timestamp {value} at index {index} is not finite")]
    NonFinite { index: usize, value: f64 },

    #[error("timestamps not strictly increasing at index {index}: {previous} then {current}")]
    NotIncreasing {
        index: usize,
        previous: f64,
        current: f64,
    },
}

/// Check that timestamps pair 1:1 with frames and strictly increase.
pub fn validate_timestamps(frame_count: usize, timestamps: &[f64]) -> Result<(), InputError> {
    if frame_count != timestamps.len() {
        return Err(InputError::CountMismatch {
            frames: frame_count,
            timestamps: timestamps.len(),
        });
    }
    for (index, &value) in timestamps.iter().enumerate() {
        if !value.is_finite() {
            return Err(InputError::NonFinite { index, value });
        }
        if index > 0 && value <= timestamps[index - 1] {
            return Err(InputError::NotIncreasing {
                index,
                previous: timestamps[index - 1],
                current: value,
            });
        }
    }
    Ok(())
}

/// Pair frame point sets with their timestamps, index by position.
pub fn frames_from_parts(
    clouds: Vec<PointCloud>,
    timestamps: &[f64],
) -> Result<Vec<Frame>, InputError> {
    validate_timestamps(clouds.len(), timestamps)?;
    Ok(clouds
        .into_iter()
        .zip(timestamps.iter())
        .enumerate()
        .map(|(i, (points, &t))| Frame::new(i, t, points))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        let coords = cloud.to_coords();
        assert_eq!(coords[0], [1.0, 2.0, 3.0]);
        assert_eq!(coords[1], [4.0, 5.0, 6.0]);
        assert_eq!(PointCloud::from_coords(&coords), cloud);
    }

    #[test]
    fn test_retain_and_select() {
        let cloud = PointCloud::from_coords(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);

        let kept = cloud.retain_mask(&[true, false, true]);
        assert_eq!(kept.to_coords(), vec![[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]);

        let picked = cloud.select(&[2, 1]);
        assert_eq!(picked.to_coords(), vec![[2.0, 2.0, 2.0], [1.0, 1.0, 1.0]]);
    }

    #[test]
    fn test_mean_along() {
        let cloud = PointCloud::from_coords(&[[0.0, 0.0, 1.0], [0.0, 0.0, 3.0]]);
        assert_eq!(cloud.mean_along(2), Some(2.0));
        assert_eq!(PointCloud::new().mean_along(2), None);
    }

    #[test]
    fn test_frames_from_parts() {
        let clouds = vec![PointCloud::new(), PointCloud::new()];
        let frames = frames_from_parts(clouds, &[0.0, 0.1]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].index, 1);
        assert_eq!(frames[1].timestamp, 0.1);
    }

    #[test]
    fn test_count_mismatch_is_input_error() {
        let clouds = vec![PointCloud::new(), PointCloud::new(), PointCloud::new()];
        let err = frames_from_parts(clouds, &[0.0, 0.1]).unwrap_err();
        assert_eq!(
            err,
            InputError::CountMismatch {
                frames: 3,
                timestamps: 2
            }
        );
    }

    #[test]
    fn test_validate_timestamps() {
        assert!(validate_timestamps(3, &[0.0, 0.1, 0.2]).is_ok());
        assert!(matches!(
            validate_timestamps(3, &[0.0, 0.1, 0.1]),
            Err(InputError::NotIncreasing { index: 2, .. })
        ));
        assert!(matches!(
            validate_timestamps(2, &[0.0, f64::NAN]),
            Err(InputError::NonFinite { index: 1, .. })
        ));
    }
}
