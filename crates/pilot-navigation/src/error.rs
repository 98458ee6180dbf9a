//! This module defines the error types used by the `pilot-navigation` crate.

#![warn(missing_docs)]

use thiserror::Error;

/// Error type for navigation operations.
///
/// Geometric edge cases and planning failures are reported as values
/// (`false`, empty results, [`crate::planner::PathResult::failure`]). This
/// enum only covers invalid construction parameters, malformed detector
/// input and persistence failures.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// A grid cell size that is not a positive finite number.
    #[error("Invalid cell size: {0}")]
    InvalidCellSize(&'static str),
    /// A spatial index node capacity of zero.
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(&'static str),
    /// A detection record that cannot be normalised.
    #[error("Invalid detection: {0}")]
    InvalidDetection(String),
    /// Filesystem failure while saving or loading a map.
    #[error("Map storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A map artifact that could not be encoded or decoded.
    #[error("Map serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A map artifact written by an incompatible format version.
    #[error("Unsupported map format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the artifact.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
    /// A map artifact recorded at a cell size other than the configured one.
    #[error("Saved map {map_id} uses cell size {saved}, configured {configured}")]
    CellSizeMismatch {
        /// Map whose artifact was rejected.
        map_id: String,
        /// Cell size recorded in the artifact.
        saved: f64,
        /// Cell size of the requested map.
        configured: f64,
    },
}
