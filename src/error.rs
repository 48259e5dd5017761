//! Error types for the boxstore storage engine.

use std::io;
use thiserror::Error;

/// The result type used throughout boxstore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected (bad preamble, truncated record, bad index).
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// The table is initializing, shutting down or deleted.
    #[error("Table not ready: {0}")]
    NotReady(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A structural storage problem, e.g. the table directory is not a directory.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A read pass could not acquire a consistent set of sources.
    #[error("Unable to acquire all tuple stores in {retries} retries")]
    AcquisitionExhausted {
        /// The number of attempts that were made.
        retries: usize,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not ready error.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Error::NotReady(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
