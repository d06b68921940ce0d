//! Error types for the liveroll core.
//!
//! The taxonomy follows the update lifecycle's failure modes:
//! - `Network`: endpoint unreachable or timed out. Retryable by caller
//!   policy; the session is left unchanged by a failed check.
//! - `Integrity`: a downloaded artifact did not match its advertised
//!   checksum. The session moves to `failed`; never retried silently.
//! - `InvalidTransition`: a lifecycle operation was called from a state
//!   that does not permit it. A programming-contract violation that fails
//!   fast, never a condition to swallow.
//! - `Cancelled`: an in-flight download was aborted by the caller.
//!
//! Confirmation timeout is deliberately absent: rollback is a designed
//! path, reported through the event stream, not an error.

use crate::session::UpdateState;
use thiserror::Error;

/// Errors that can occur in the update core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Network failure talking to the distribution endpoint.
    #[error("network failure: {0}")]
    Network(String),

    /// In-flight download cancelled by the caller.
    #[error("download cancelled")]
    Cancelled,

    /// Downloaded artifact does not match the advertised checksum.
    #[error("integrity failure: expected checksum {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Lifecycle operation called from a state that forbids it.
    #[error("invalid transition: {op}() called in state '{from}'")]
    InvalidTransition { from: UpdateState, op: &'static str },

    /// Bundle packing/reading error.
    #[error(transparent)]
    Bundle(#[from] lr_bundle::BundleError),

    /// Version token parse error.
    #[error(transparent)]
    Version(#[from] lr_common::VersionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for failures a caller may retry without an explicit new check.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network(_))
    }
}

impl From<ureq::Error> for CoreError {
    fn from(err: ureq::Error) -> Self {
        CoreError::Network(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
