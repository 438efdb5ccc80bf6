//! Error Handling Module
//!
//! Defines the error taxonomy for a MaMoNet training run.
//! Uses thiserror for ergonomic error definitions.
//!
//! Every failure is fatal: nothing retries, errors propagate to the caller and
//! terminate the run. Persistence failures get their own variant so an operator
//! can tell "training failed" apart from "training succeeded, writing outputs failed".

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for MaMoNet operations
#[derive(Error, Debug)]
pub enum MamonetError {
    /// Invalid run parameters (paths, counts, fractions, dimensions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Corpus is empty, inconsistent, or a label set is unusable
    #[error("Data error: {0}")]
    Data(String),

    /// An image could not be opened or decoded
    #[error("Failed to decode image at '{0}': {1}")]
    ImageDecode(PathBuf, String),

    /// Tensor or batch dimensions disagree with the configuration
    #[error("Shape error: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    /// Model construction or record loading failed
    #[error("Model error: {0}")]
    Model(String),

    /// Training diverged or the trainer was driven out of order
    #[error("Training error: {0}")]
    Training(String),

    /// Writing an output artifact failed
    #[error("Failed to persist artifact '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MamonetError {
    /// Build a shape error from anything displayable
    pub fn shape(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Self::Shape {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Build a persistence error for the given artifact path
    pub fn persist(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Persist {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the run trained successfully but its outputs could not be written
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

/// Convenience Result type for MaMoNet operations
pub type Result<T> = std::result::Result<T, MamonetError>;
