//! Error types for archive packaging and unpacking operations.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Input archive or source directory not found at the specified path.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Invalid or incomplete configuration, detected before the codec runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The archive format is not supported by the codec.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The archive requires a password but none was provided.
    #[error("Password required")]
    PasswordRequired,

    /// The provided password is incorrect.
    #[error("Invalid password")]
    InvalidPassword,

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// Any other failure reported by the codec.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The declared size of an item does not match the bytes its stream produced.
    #[error("Size mismatch for {path}: declared {declared} bytes, read {actual} bytes")]
    SizeMismatch {
        /// Archive-internal path of the item
        path: String,
        /// Size reported in the item metadata
        declared: u64,
        /// Bytes actually handed to the codec
        actual: u64,
    },

    /// A security violation was detected in an entry path.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether this error points at a missing or wrong password.
    pub fn is_password_related(&self) -> bool {
        matches!(self, Self::PasswordRequired | Self::InvalidPassword)
    }
}

/// Security-related errors for archive entry paths.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),
}
