//! Error types for report ingestion.

use std::path::Path;
use thiserror::Error;
use vizpub_core::OverlayError;

/// Errors that can occur while collecting, storing or reading reports.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fragment queue closed (collector gone)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Fragment carried no protocol name
    #[error("Fragment from {0} has no protocol name")]
    MissingProtocolName(String),

    /// Filesystem operation failed
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Report file could not be parsed or written as JSON
    #[error("Malformed report {path}: {message}")]
    Parse { path: String, message: String },

    /// A checkpoint has no report file
    #[error("Missing report for checkpoint {expected} (next file is checkpoint {found})")]
    MissingCheckpoint { expected: u64, found: u64 },

    /// Protocol directory missing or without report files
    #[error("No reports for protocol {protocol} under {root}")]
    EmptyStore { protocol: String, root: String },
}

impl IngestError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Creates an I/O error for a path.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Creates a parse error for a path.
    pub fn parse(path: &Path, err: serde_json::Error) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<IngestError> for OverlayError {
    fn from(err: IngestError) -> Self {
        OverlayError::report(err.to_string())
    }
}
