//! Error types for configuration, the log artifact, and notification delivery.
//!
//! None of these ever escape a capture handler: the controller turns them into
//! metrics (and, for store failures, a `tracing` warning) and carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration rejected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cadence below `-1` has no meaning.
    #[error("notify_cadence_seconds must be -1, 0 or positive (got {0})")]
    InvalidCadence(i64),

    /// Rotation needs a positive upper bound.
    #[error("file_max_size must be greater than 0")]
    ZeroMaxSize,

    /// Rotation degenerates unless the dropped prefix is smaller than the cap.
    #[error("file_truncate_size ({truncate}) must be less than file_max_size ({max})")]
    TruncateNotBelowMax {
        /// Configured truncate size
        truncate: u64,
        /// Configured max size
        max: u64,
    },

    /// The signature registry needs room for at least one entry.
    #[error("max_tracked_signatures must be greater than 0")]
    ZeroTrackedSignatures,

    /// A suppression pattern failed to compile.
    #[error("invalid suppress pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Figment extraction error.
    #[error("configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(e))
    }
}

/// Failure touching the log artifact.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing, locking or stamping the artifact failed.
    #[error("log artifact {path}: {source}")]
    Io {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The notification sink refused a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Sink rejected the message.
    #[error("notification rejected: {0}")]
    Rejected(String),
}
