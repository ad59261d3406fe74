//! Core data types and I/O operations.

pub mod frame;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use frame::{frames_from_parts, validate_timestamps, Frame, InputError, PointCloud};
pub use loaders::{
    list_frame_files, load_frame, load_ply, load_signal_csv, load_timestamps_csv, LoaderError,
};
pub use writers::{write_frames_csv, write_ply, write_report_yaml, FrameRow, WriteError};
