//! Data writers for PLY, CSV and YAML outputs.
//!
//! This module provides functions for writing session results:
//! - PLY (Polygon File Format) with ASCII encoding for cleaned clusters
//! - CSV with one row per frame
//! - YAML for the full session report

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::frame::PointCloud;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("YAML encoding error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// One CSV row per frame of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRow {
    pub frame: usize,
    pub timestamp: f64,
    pub valid: bool,
    pub extent_0: f32,
    pub extent_1: f32,
    pub extent_2: f32,
    pub area: f64,
    pub depth: f64,
    /// Angular velocity from the previous frame; empty for the first frame
    pub angular_velocity: Option<f64>,
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn write_failed(path: &Path) -> impl Fn(std::io::Error) -> WriteError + '_ {
    move |e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    }
}

/// Write a point cloud to an ASCII PLY file with x, y, z vertex properties.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `cloud` - Points to write
///
/// # Example
///
/// ```no_run
/// use spin_pipeline::core::frame::PointCloud;
/// use spin_pipeline::core::writers::write_ply;
/// use std::path::Path;
///
/// let cloud = PointCloud::default();
/// write_ply(Path::new("cluster.ply"), &cloud).unwrap();
/// ```
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    write!(
        writer,
        "ply\nformat ascii 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
        cloud.len()
    )
    .map_err(write_failed(path))?;

    for i in 0..cloud.len() {
        writeln!(writer, "{:.6} {:.6} {:.6}", cloud.x[i], cloud.y[i], cloud.z[i])
            .map_err(write_failed(path))?;
    }

    writer.flush().map_err(write_failed(path))?;
    Ok(())
}

/// Write per-frame results to CSV, one row per frame with a header.
pub fn write_frames_csv(path: &Path, rows: &[FrameRow]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);

    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| WriteError::CsvError {
                path: path.display().to_string(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(write_failed(path))?;
    Ok(())
}

/// Write any serializable report as YAML.
pub fn write_report_yaml<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    ensure_parent_dirs(path)?;
    let content = serde_yaml::to_string(report).map_err(|e| WriteError::YamlError {
        path: path.display().to_string(),
        source: e,
    })?;
    fs::write(path, content).map_err(write_failed(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn read_file(path: &Path) -> String {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_write_ply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cluster.ply");
        let cloud = PointCloud::from_coords(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        write_ply(&path, &cloud).unwrap();

        let content = read_file(&path);
        assert!(content.contains("element vertex 2"));
        assert!(content.contains("end_header\n1.000000 2.000000 3.000000\n"));
        assert!(!content.contains("red"));
    }

    #[test]
    fn test_write_ply_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("round.ply");
        let cloud = PointCloud::from_coords(&[[0.5, -1.25, 2.0]]);

        write_ply(&path, &cloud).unwrap();

        let loaded = crate::core::loaders::load_ply(&path).unwrap();
        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_write_ply_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("cluster.ply");
        write_ply(&path, &PointCloud::new()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_frames_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.csv");
        let rows = vec![
            FrameRow {
                frame: 0,
                timestamp: 0.0,
                valid: true,
                extent_0: 0.5,
                extent_1: 0.25,
                extent_2: 0.125,
                area: 0.1,
                depth: 1.5,
                angular_velocity: None,
            },
            FrameRow {
                frame: 1,
                timestamp: 0.1,
                valid: false,
                extent_0: 0.0,
                extent_1: 0.0,
                extent_2: 0.0,
                area: 0.0,
                depth: 0.0,
                angular_velocity: Some(3.5),
            },
        ];

        write_frames_csv(&path, &rows).unwrap();

        let content = read_file(&path);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "frame,timestamp,valid,extent_0,extent_1,extent_2,area,depth,angular_velocity"
        );
        assert_eq!(lines[1], "0,0.0,true,0.5,0.25,0.125,0.1,1.5,");
        assert_eq!(lines[2], "1,0.1,false,0.0,0.0,0.0,0.0,0.0,3.5");
    }

    #[test]
    fn test_write_report_yaml() {
        #[derive(Serialize)]
        struct Summary {
            rpm: f64,
            frames: usize,
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("report.yaml");

        write_report_yaml(&path, &Summary { rpm: 30.0, frames: 60 }).unwrap();

        let content = read_file(&path);
        assert!(content.contains("rpm: 30.0"));
        assert!(content.contains("frames: 60"));
    }
}
