//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors that can occur while probing or converting.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The caller's conversion spec was rejected before any process was spawned.
    #[error("Invalid specification: {reason}")]
    InvalidSpecification { reason: String },

    /// Two resolved options cannot be expressed together on one command line.
    #[error("Unsupported option combination: {reason}")]
    UnsupportedCombination { reason: String },

    /// The executable is missing or could not be launched.
    #[error("Failed to spawn {program}: {reason}")]
    ProcessSpawnFailed { program: PathBuf, reason: String },

    /// No output and no exit within the configured bound.
    #[error("No output from process for {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The probe stream did not contain the expected metadata blocks.
    #[error("Malformed probe output: {reason}")]
    MalformedProbeOutput { reason: String },

    /// Too many consecutive unrecognized lines in the progress stream.
    #[error("Unparsable progress output after {skipped} unrecognized lines")]
    UnparsableProgress { skipped: usize },

    /// The transcoder exited with a nonzero status.
    #[error("Transcode failed: {reason}")]
    TranscodeFailed { reason: String, tail: String },

    /// API misuse, e.g. starting a session twice.
    #[error("Invalid session state: {reason}")]
    InvalidState { reason: String },

    /// The probing executable reported a failure.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// Thumbnail extraction did not produce the requested image.
    #[error("Failed to create thumbnail: {reason}")]
    ThumbnailFailed { reason: String },

    /// Job was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The configured codec/format table could not be loaded.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// I/O error while talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new invalid specification error.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            reason: reason.into(),
        }
    }

    /// Creates a new unsupported combination error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            reason: reason.into(),
        }
    }

    /// Creates a new transcode failed error with the captured diagnostic tail.
    pub fn transcode_failed(reason: impl Into<String>, tail: impl Into<String>) -> Self {
        Self::TranscodeFailed {
            reason: reason.into(),
            tail: tail.into(),
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new malformed probe output error.
    pub fn malformed_probe(reason: impl Into<String>) -> Self {
        Self::MalformedProbeOutput {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Whether the caller could reasonably try again.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }

    /// Whether the error was raised before any process was spawned.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpecification { .. } | Self::UnsupportedCombination { .. }
        )
    }

    /// The diagnostic tail attached to this error, if any.
    pub fn diagnostic_tail(&self) -> Option<&str> {
        match self {
            Self::TranscodeFailed { tail, .. } => Some(tail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_failed_keeps_tail() {
        let err = ConverterError::transcode_failed("exit status 1", "Error while decoding");
        assert_eq!(err.diagnostic_tail(), Some("Error while decoding"));
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(ConverterError::invalid_spec("bad").is_validation_error());
        assert!(ConverterError::unsupported("bad").is_validation_error());
        assert!(!ConverterError::Cancelled.is_validation_error());
    }

    #[test]
    fn test_retryable() {
        assert!(ConverterError::Timeout { timeout_secs: 5 }.is_retryable());
        assert!(!ConverterError::Cancelled.is_retryable());
    }
}
