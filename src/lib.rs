//! Rotation rate and size estimation from timestamped depth-camera scans.
//!
//! This crate provides tools for:
//! - Loading recorded frames (ASCII PLY or Cartesian CSV) and their timestamps
//! - Cleaning each frame down to the rotating object (outlier filters,
//!   background removal, parallel DBSCAN)
//! - Turning per-frame extents, silhouette areas or surface normals into a
//!   signal and estimating its period
//! - Converting the period (or normal rotation) into RPM and aggregating the
//!   object's physical dimensions
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use spin_pipeline::{core::loaders, Pipeline, PipelineConfig};
//!
//! let timestamps = loaders::load_timestamps_csv("timestamps.csv", 1e-6).unwrap();
//! let clouds = loaders::list_frame_files(Path::new("frames"), "ply")
//!     .unwrap()
//!     .iter()
//!     .map(|path| loaders::load_frame(path).unwrap())
//!     .collect();
//!
//! let report = Pipeline::new(PipelineConfig::default())
//!     .unwrap()
//!     .run_session(clouds, &timestamps)
//!     .unwrap();
//! println!("{:.1} rpm", report.rpm.rpm);
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;

pub use config::{PipelineConfig, ReducerConfig};
pub use core::frame::{Frame, PointCloud};
pub use pipeline::{Pipeline, PipelineError, SessionReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
