//! Error types for alconv
//!
//! Only open and configure failures abort a job. Streaming failures are mapped
//! onto the normal termination paths by the pump and never reach the batch.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the converter
#[derive(Error, Debug)]
pub enum Error {
    /// Source unreadable or format unrecognized
    #[error("Failed to open source {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    /// A required codec property could not be fetched
    #[error("Failed to read property {property}: {reason}")]
    PropertyRead { property: String, reason: String },

    /// A tag value could not be parsed; only that tag is dropped
    #[error("Invalid value for metadata {key}: {value:?}")]
    MetadataParse { key: String, value: String },

    /// Output settings rejected by the encoder
    #[error("Encoder configuration rejected: {0}")]
    EncoderConfig(String),

    /// Decoder read failure while streaming
    #[error("Decoder read failed: {0}")]
    Read(String),

    /// Encoder append or finalize failure
    #[error("Write failed: {0}")]
    Write(String),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared configuration layer
    #[error(transparent)]
    Common(#[from] alconv_common::Error),
}

/// Convenience Result type using the alconv Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a [`Error::SourceOpen`] for `path`
    pub fn source_open(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::SourceOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
