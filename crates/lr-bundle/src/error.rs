//! Error types for bundle operations.

use thiserror::Error;

/// Errors that can occur while packing or reading bundles.
#[derive(Error, Debug)]
pub enum BundleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Checksum verification failed
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Missing required file in bundle
    #[error("missing required file: {0}")]
    MissingFile(String),

    /// File not found in bundle
    #[error("file not found in bundle: {0}")]
    FileNotFound(String),

    /// Unknown or unsupported bundle schema version
    #[error("unsupported bundle schema version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    /// Asset directory does not exist or is not a directory
    #[error("asset directory not found: {0}")]
    AssetDirNotFound(String),

    /// Asset directory produced no files to pack
    #[error("bundle has no content to pack")]
    EmptyBundle,
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
