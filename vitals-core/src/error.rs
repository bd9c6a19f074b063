//! Error types for vitals.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use thiserror::Error;

/// Result type alias for vitals operations.
pub type Result<T> = std::result::Result<T, VitalsError>;

/// Main error type for vitals.
#[derive(Error, Debug)]
pub enum VitalsError {
    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Series identity errors
    #[error("Invalid series id {id:?}: must be a non-empty slug")]
    InvalidSeriesId { id: String },

    #[error("Series period {0:?} is below the 1 second minimum")]
    PeriodTooSmall(std::time::Duration),

    #[error("Series length {0} is below the minimum of 2 bins")]
    CountTooSmall(usize),

    // Filter errors
    #[error("Invalid pattern {pattern:?}: {reason}")]
    BadPattern { pattern: String, reason: String },

    // Registry errors
    #[error("Duplicate metric name: {name}")]
    DuplicateName { name: String },

    #[error("Unknown input kind: {kind}")]
    UnknownInput { kind: String },

    #[error("Unknown output kind: {kind}")]
    UnknownOutput { kind: String },

    // Runtime errors
    #[error("Input {input} failed to initialize: {reason}")]
    InitFailed { input: String, reason: String },

    #[error("Input {input} failed to gather: {reason}")]
    GatherFailed { input: String, reason: String },

    // Storage errors
    #[error("Storage I/O error: {reason}")]
    StorageIo { reason: String },

    #[error("No stored history for {name} in series {series}")]
    StorageNotFound { series: String, name: String },

    // Reader-side errors
    #[error("Metric not found: {name}")]
    MetricNotFound { name: String },

    #[error("Series index {index} out of range for {len} series")]
    IndexOutOfRange { index: usize, len: usize },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VitalsError {
    /// Create a StorageIo error from any error type.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageIo { reason: err.to_string() }
    }
}

impl From<std::io::Error> for VitalsError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageIo { reason: err.to_string() }
    }
}

impl From<sqlx::Error> for VitalsError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageIo { reason: err.to_string() }
    }
}
