//! Exit codes for the liveroll CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing.
//!
//! Ranges:
//! - 0-4: Success / operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use crate::CoreError;

/// Exit codes for liveroll operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: operation completed, nothing further to do.
    Clean = 0,

    /// An update is available but has not been applied.
    UpdateAvailable = 1,

    /// An update was activated and is awaiting confirmation.
    AwaitingConfirmation = 2,

    /// The pending update was rolled back.
    RolledBack = 3,

    /// Invalid arguments.
    ArgsError = 10,

    /// Configuration missing or invalid.
    ConfigError = 11,

    /// Distribution endpoint unreachable.
    NetworkError = 12,

    /// Downloaded artifact failed checksum verification.
    IntegrityError = 13,

    /// Lifecycle operation called from a forbidden state.
    TransitionError = 14,

    /// Unexpected internal error.
    InternalError = 20,
}

impl ExitCode {
    /// Map a core error to its exit code.
    pub fn from_error(err: &CoreError) -> Self {
        match err {
            CoreError::Network(_) | CoreError::Cancelled => ExitCode::NetworkError,
            CoreError::Integrity { .. } => ExitCode::IntegrityError,
            CoreError::InvalidTransition { .. } => ExitCode::TransitionError,
            CoreError::Config(_) | CoreError::Version(_) => ExitCode::ConfigError,
            CoreError::Bundle(_) | CoreError::Io(_) | CoreError::Json(_) => {
                ExitCode::InternalError
            }
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as i32 as u8)
    }
}
