//! Liveroll common types shared across the workspace.
//!
//! This crate provides foundational types used by both the packager and the
//! on-device core:
//! - Ordered version tokens with numeric (never lexicographic) comparison
//! - Application identity
//! - Output format specifications for the CLI

pub mod id;
pub mod output;
pub mod version;

pub use id::AppId;
pub use output::OutputFormat;
pub use version::{VersionError, VersionToken};

/// Schema version for persisted records (session, manifest, event log).
pub const SCHEMA_VERSION: &str = "1.0.0";
