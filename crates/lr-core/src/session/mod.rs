//! Persisted update session: the device-local state machine record.
//!
//! One session record exists per device data directory. It is an
//! explicitly owned object (created by `SessionStore::load_or_new`, passed
//! to the controller), never ambient global state. Every lifecycle
//! transition persists the record so that a crash at any point is
//! recoverable:
//!
//! - in-flight states (`checking`, `downloading`) reset to `idle` at load,
//! - `awaiting_confirmation` with an elapsed (or missing) deadline rolls
//!   back at load, before normal operation resumes.
//!
//! Invariants:
//! - `confirmation_deadline` is set if and only if
//!   `state == awaiting_confirmation`
//! - at most one pending bundle exists; it exists only in `downloaded` or
//!   `awaiting_confirmation`
//! - `active` is never cleared once set

use chrono::{DateTime, Utc};
use lr_common::{AppId, VersionToken, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{CoreError, Result};

const SESSION_FILE: &str = "session.json";

/// States of the update lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    Downloading,
    Downloaded,
    AwaitingConfirmation,
    Confirmed,
    RolledBack,
    Failed,
}

impl UpdateState {
    /// States from which a new check may start. Anything mid-flight is
    /// excluded so a check already in progress is never doubled; the guard
    /// is the state itself, not a lock (single logical thread).
    pub fn can_start_check(self) -> bool {
        matches!(
            self,
            UpdateState::Idle
                | UpdateState::UpToDate
                | UpdateState::Confirmed
                | UpdateState::RolledBack
                | UpdateState::Failed
        )
    }

    /// States that represent unfinished work within one process run.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            UpdateState::Checking | UpdateState::Downloading | UpdateState::Downloaded
        )
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up_to_date",
            UpdateState::Downloading => "downloading",
            UpdateState::Downloaded => "downloaded",
            UpdateState::AwaitingConfirmation => "awaiting_confirmation",
            UpdateState::Confirmed => "confirmed",
            UpdateState::RolledBack => "rolled_back",
            UpdateState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Reference to a staged or active bundle on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRef {
    /// Bundle identity.
    pub version: VersionToken,
    /// SHA-256 hex digest of the artifact.
    pub checksum: String,
    /// Local artifact path, if the bundle was staged by the controller
    /// (the factory-installed bundle has none).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// The device-local update session record.
///
/// `active` stays the trusted bundle until confirmation: while
/// `awaiting_confirmation`, the application boots the pending bundle
/// speculatively (`boot_bundle` resolves to it), but `active` is only
/// replaced by `notify_ready` within the window. Rollback is therefore a
/// pure discard of `pending` — the previously active bundle was never
/// touched, so round-trip identity holds by construction, and at no point
/// do zero or two bundles appear active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSession {
    /// Schema version for the persisted record.
    pub schema_version: String,

    /// Application this session serves.
    pub app_id: AppId,

    /// Current lifecycle state.
    pub state: UpdateState,

    /// The bundle the application trusts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<BundleRef>,

    /// A staged-but-unconfirmed bundle, at most one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<BundleRef>,

    /// Set only while `awaiting_confirmation`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_deadline: Option<DateTime<Utc>>,

    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl UpdateSession {
    /// Fresh session with no staged or active bundle.
    pub fn new(app_id: AppId) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            app_id,
            state: UpdateState::Idle,
            active: None,
            pending: None,
            confirmation_deadline: None,
            updated_at: Utc::now(),
        }
    }

    /// Seed the factory-installed bundle as active.
    pub fn with_active(mut self, bundle: BundleRef) -> Self {
        self.active = Some(bundle);
        self
    }

    /// The version the application currently trusts.
    pub fn active_version(&self) -> Option<&VersionToken> {
        self.active.as_ref().map(|b| &b.version)
    }

    /// The bundle the application should run on its next cold start:
    /// the speculative pending bundle while awaiting confirmation,
    /// otherwise the trusted active bundle.
    pub fn boot_bundle(&self) -> Option<&BundleRef> {
        if self.state == UpdateState::AwaitingConfirmation {
            self.pending.as_ref().or(self.active.as_ref())
        } else {
            self.active.as_ref()
        }
    }

    /// Record a transition.
    pub(crate) fn transition(&mut self, state: UpdateState) {
        debug!(from = %self.state, to = %state, "Session transition");
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Check the record's structural invariants.
    pub fn check_invariants(&self) -> Result<()> {
        let awaiting = self.state == UpdateState::AwaitingConfirmation;
        if self.confirmation_deadline.is_some() != awaiting {
            return Err(CoreError::Config(format!(
                "session invariant violated: deadline {} in state '{}'",
                if self.confirmation_deadline.is_some() {
                    "set"
                } else {
                    "missing"
                },
                self.state
            )));
        }
        let may_hold_pending = awaiting || self.state == UpdateState::Downloaded;
        if self.pending.is_some() && !may_hold_pending {
            return Err(CoreError::Config(format!(
                "session invariant violated: pending bundle in state '{}'",
                self.state
            )));
        }
        Ok(())
    }
}

/// Loads and persists the session record under the device data directory.
///
/// Writes are atomic (temp file + rename) so a crash mid-write leaves the
/// previous record intact.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store rooted at the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    /// Path of the persisted record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, or start fresh.
    ///
    /// A missing record is harmless: the device treats its current bundle
    /// as active and starts from `idle`. An unreadable record is logged
    /// and replaced the same way rather than wedging the updater.
    pub fn load_or_new(&self, app_id: &AppId) -> UpdateSession {
        match fs::read_to_string(&self.path) {
            Ok(json) => match serde_json::from_str::<UpdateSession>(&json) {
                Ok(session) => session,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "Corrupt session record, starting fresh");
                    UpdateSession::new(app_id.clone())
                }
            },
            Err(_) => UpdateSession::new(app_id.clone()),
        }
    }

    /// Persist the session atomically.
    pub fn save(&self, session: &UpdateSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn version(s: &str) -> VersionToken {
        VersionToken::parse(s).expect("valid version")
    }

    fn bundle(v: &str) -> BundleRef {
        BundleRef {
            version: version(v),
            checksum: "abc".to_string(),
            artifact: None,
        }
    }

    #[test]
    fn test_fresh_session_is_idle() {
        let session = UpdateSession::new(AppId::from("shop-app"));
        assert_eq!(session.state, UpdateState::Idle);
        assert!(session.active.is_none());
        assert!(session.pending.is_none());
        session.check_invariants().expect("fresh session is valid");
    }

    #[test]
    fn test_check_guard_states() {
        assert!(UpdateState::Idle.can_start_check());
        assert!(UpdateState::UpToDate.can_start_check());
        assert!(UpdateState::RolledBack.can_start_check());
        assert!(!UpdateState::Checking.can_start_check());
        assert!(!UpdateState::Downloading.can_start_check());
        assert!(!UpdateState::AwaitingConfirmation.can_start_check());
    }

    #[test]
    fn test_boot_bundle_resolution() {
        let mut session = UpdateSession::new(AppId::from("shop-app")).with_active(bundle("1.0.0"));
        assert_eq!(session.boot_bundle().map(|b| b.version.as_str()), Some("1.0.0"));

        session.pending = Some(bundle("2.0.0"));
        session.state = UpdateState::AwaitingConfirmation;
        session.confirmation_deadline = Some(Utc::now());
        assert_eq!(session.boot_bundle().map(|b| b.version.as_str()), Some("2.0.0"));

        session.state = UpdateState::Downloaded;
        session.confirmation_deadline = None;
        assert_eq!(session.boot_bundle().map(|b| b.version.as_str()), Some("1.0.0"));
    }

    #[test]
    fn test_invariant_deadline_iff_awaiting() {
        let mut session = UpdateSession::new(AppId::from("shop-app"));
        session.confirmation_deadline = Some(Utc::now());
        assert!(session.check_invariants().is_err());

        session.state = UpdateState::AwaitingConfirmation;
        session.pending = Some(bundle("2.0.0"));
        session.check_invariants().expect("deadline + awaiting is valid");

        session.confirmation_deadline = None;
        assert!(session.check_invariants().is_err());
    }

    #[test]
    fn test_store_roundtrip_and_atomic_file() {
        let tmp = TempDir::new().expect("tempdir");
        let store = SessionStore::new(tmp.path());
        let app_id = AppId::from("shop-app");

        let mut session = UpdateSession::new(app_id.clone()).with_active(bundle("1.0.0"));
        session.transition(UpdateState::UpToDate);
        store.save(&session).expect("save");

        let loaded = store.load_or_new(&app_id);
        assert_eq!(loaded.state, UpdateState::UpToDate);
        assert_eq!(loaded.active_version().map(|v| v.as_str()), Some("1.0.0"));
        assert!(!tmp.path().join("session.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_record_starts_fresh() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join(SESSION_FILE), b"{ not json").expect("write");
        let store = SessionStore::new(tmp.path());
        let session = store.load_or_new(&AppId::from("shop-app"));
        assert_eq!(session.state, UpdateState::Idle);
    }
}
