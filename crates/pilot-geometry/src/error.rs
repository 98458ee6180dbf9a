#![warn(missing_docs)]

//! Error types for the geometry library.

use core::fmt;

/// Errors raised when constructing geometric helpers from invalid parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A transform scale factor was zero, negative or not finite.
    InvalidScale(&'static str),
    /// A coordinate that must be finite was NaN or infinite.
    NonFiniteCoordinate(&'static str),
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::InvalidScale(msg) => write!(f, "Invalid transform scale: {}", msg),
            GeometryError::NonFiniteCoordinate(msg) => write!(f, "Non-finite coordinate: {}", msg),
        }
    }
}

impl core::error::Error for GeometryError {}
