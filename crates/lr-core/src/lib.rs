//! Liveroll Core - Update Lifecycle and Request Routing
//!
//! The on-device half of liveroll, handling:
//! - The update lifecycle state machine (check, download, stage, activate,
//!   confirmation-gated rollback)
//! - Persisted update sessions that survive process restart
//! - The distribution endpoint client
//! - A lifecycle event stream for embedding applications
//! - Per-request routing between platform networking and the offline layer

pub mod config;
pub mod controller;
pub mod distribution;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod router;
pub mod session;
pub mod watch;

pub use error::{CoreError, Result};
