//! Per-frame geometric processing.

pub mod clustering;
pub mod filtering;
pub mod geometry;
pub mod plane;
pub mod projection;
pub mod reducer;

// Re-export key types for convenience
pub use geometry::{GeometryError, GeometryOps, KdTreeGeometry, PlaneFit};
pub use reducer::{CleanedCluster, FrameReducer, FrameReduction, ReductionStage, StageCounts};
