//! Data loaders for recorded depth-camera sessions.
//!
//! This module provides parsers for:
//! - ASCII PLY frames (x, y, z vertex properties; other properties ignored)
//! - Cartesian CSV frames (x, y, z columns)
//! - Timestamp CSV files (one timestamp per frame)
//!
//! Non-finite coordinates are kept as-is; dropping them is the reducer's job.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use regex::Regex;
use thiserror::Error;

use super::frame::PointCloud;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No frame files with extension '{extension}' in {dir}")]
    NoFrames { dir: PathBuf, extension: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Load a Cartesian point cloud from a CSV file with x, y, z columns.
///
/// Columns are found by name (case-insensitive), falling back to the first
/// three columns. Cells that do not parse become NaN.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = col_map.get("x").copied().unwrap_or(0);
    let y_idx = col_map.get("y").copied().unwrap_or(1);
    let z_idx = col_map.get("z").copied().unwrap_or(2);

    let mut cloud = PointCloud::with_capacity(10_000);

    for result in reader.records() {
        let record = result?;
        let field = |idx: usize| -> f32 {
            record
                .get(idx)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(f32::NAN)
        };
        cloud.push(field(x_idx), field(y_idx), field(z_idx));
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a point cloud from an ASCII PLY file.
///
/// Requires `x`, `y`, `z` vertex properties. A file that declares zero
/// vertices loads as an empty cloud, since an empty capture is a valid
/// (if useless) frame.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex_element = false;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "unsupported PLY format '{}'",
                stripped
            )));
        } else if stripped.starts_with("element") {
            in_vertex_element = stripped.starts_with("element vertex");
            if in_vertex_element {
                num_vertices = stripped
                    .split_whitespace()
                    .last()
                    .and_then(|count| count.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let find = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = find("x")?;
    let y_idx = find("y")?;
    let z_idx = find("z")?;

    let mut cloud = PointCloud::with_capacity(num_vertices);

    let parse = |values: &[&str], idx: usize| -> Result<f32> {
        values[idx]
            .parse()
            .map_err(|_| LoaderError::ParseError(format!("Invalid coordinate: {}", values[idx])))
    };

    for line in lines {
        if cloud.len() >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        cloud.push(
            parse(&values, x_idx)?,
            parse(&values, y_idx)?,
            parse(&values, z_idx)?,
        );
    }

    if cloud.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            cloud.len()
        )));
    }

    Ok(cloud)
}

/// Load one frame, choosing the parser from the file extension.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        load_cartesian_csv(path)
    } else {
        load_ply(path)
    }
}

/// Load per-frame timestamps from a CSV file.
///
/// Uses the `timestamp` column when present, otherwise the first column.
/// Every value is multiplied by `scale` (e.g. `1e-6` for microsecond clocks).
pub fn load_timestamps_csv<P: AsRef<Path>>(path: P, scale: f64) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("timestamp"))
        .unwrap_or(0);

    let mut timestamps = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let raw = record.get(column).unwrap_or("").trim();
        let value: f64 = raw.parse().map_err(|_| {
            LoaderError::ParseError(format!("row {}: invalid timestamp '{}'", row + 1, raw))
        })?;
        timestamps.push(value * scale);
    }

    if timestamps.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(timestamps)
}

/// Load a recorded indicator signal from a CSV file.
///
/// Reads the `timestamp` and `value` columns, falling back to the first two
/// columns. Timestamps are multiplied by `scale`.
pub fn load_signal_csv<P: AsRef<Path>>(path: P, scale: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let find = |name: &str, fallback: usize| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .unwrap_or(fallback)
    };
    let t_idx = find("timestamp", 0);
    let v_idx = find("value", 1);

    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize, what: &str| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("").trim();
            raw.parse().map_err(|_| {
                LoaderError::ParseError(format!("row {}: invalid {} '{}'", row + 1, what, raw))
            })
        };
        timestamps.push(field(t_idx, "timestamp")? * scale);
        values.push(field(v_idx, "value")?);
    }

    if timestamps.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok((timestamps, values))
}

/// Numeric sort key taken from the last number in a file stem.
///
/// Capture tools name frames like `session_frame_311413.102.ply`; sorting by
/// the embedded number keeps `frame_10` after `frame_9`.
fn frame_sort_key(pattern: &Regex, path: &Path) -> f64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| pattern.find_iter(stem).last())
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(f64::INFINITY)
}

/// List frame files in a directory, ordered by their embedded frame number.
///
/// Hidden files (including `._` resource forks) are skipped.
pub fn list_frame_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let number = Regex::new(r"\d+(?:\.\d+)?").map_err(|e| LoaderError::ParseError(e.to_string()))?;

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let visible = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| !n.starts_with('.'))
                .unwrap_or(false);
            let matches_ext = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            visible && matches_ext
        })
        .collect();

    if files.is_empty() {
        return Err(LoaderError::NoFrames {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    files.sort_by(|a, b| {
        frame_sort_key(&number, a)
            .total_cmp(&frame_sort_key(&number, b))
            .then_with(|| a.cmp(b))
    });

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_load_cartesian_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y,z").unwrap();
        writeln!(file, "1.0,2.0,3.0").unwrap();
        writeln!(file, "4.0,nan,6.0").unwrap();
        file.flush().unwrap();

        let cloud = load_cartesian_csv(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.x[0], 1.0);
        assert_eq!(cloud.z[0], 3.0);
        assert!(cloud.y[1].is_nan());

        Ok(())
    }

    #[test]
    fn test_load_ply() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "property uchar red").unwrap();
        writeln!(file, "property uchar green").unwrap();
        writeln!(file, "property uchar blue").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0 255 0 0").unwrap();
        writeln!(file, "4.0 5.0 6.0 0 255 0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.x[0], 1.0);
        assert_eq!(cloud.y[1], 5.0);

        Ok(())
    }

    #[test]
    fn test_load_ply_rejects_binary() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format binary_little_endian 1.0").unwrap();
        writeln!(file, "element vertex 1").unwrap();
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_ply(file.path()), Err(LoaderError::InvalidPly(_))));
    }

    #[test]
    fn test_load_ply_missing_property() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 1").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_ply(file.path()), Err(LoaderError::MissingColumns(_))));
    }

    #[test]
    fn test_load_timestamps_csv_scaled() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "frame,timestamp").unwrap();
        writeln!(file, "1,1000000").unwrap();
        writeln!(file, "2,1100000").unwrap();
        file.flush().unwrap();

        let ts = load_timestamps_csv(file.path(), 1e-6)?;
        assert_eq!(ts.len(), 2);
        assert!((ts[0] - 1.0).abs() < 1e-12);
        assert!((ts[1] - 1.1).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_load_signal_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "value,timestamp").unwrap();
        writeln!(file, "5.0,1000").unwrap();
        writeln!(file, "7.5,2000").unwrap();
        file.flush().unwrap();

        let (timestamps, values) = load_signal_csv(file.path(), 1e-3)?;
        assert_eq!(timestamps, vec![1.0, 2.0]);
        assert_eq!(values, vec![5.0, 7.5]);

        Ok(())
    }

    #[test]
    fn test_load_signal_csv_bad_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,value").unwrap();
        writeln!(file, "0.0,abc").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_signal_csv(file.path(), 1.0),
            Err(LoaderError::ParseError(_))
        ));
    }

    #[test]
    fn test_list_frame_files_numeric_order() -> Result<()> {
        let dir = TempDir::new().unwrap();
        for name in ["frame_10.ply", "frame_9.ply", "frame_100.ply", "._frame_1.ply", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let files = list_frame_files(dir.path(), "ply")?;
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["frame_9.ply", "frame_10.ply", "frame_100.ply"]);

        Ok(())
    }

    #[test]
    fn test_list_frame_files_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            list_frame_files(dir.path(), "ply"),
            Err(LoaderError::NoFrames { .. })
        ));
    }
}
