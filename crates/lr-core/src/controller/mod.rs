//! The update controller: check, download, stage, activate, confirm or
//! roll back.
//!
//! All lifecycle transitions run on one logical thread; idempotence and
//! single-flight guarantees come from the state guard on the session, not
//! from locks. Every transition persists the session record before the
//! operation returns, so the machine is recoverable at any crash point.
//!
//! The one rule everything here serves: a bundle that cannot prove
//! liveness within the confirmation window is never trusted permanently.

use chrono::{DateTime, Duration, Utc};
use lr_bundle::FileEntry;
use lr_common::VersionToken;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::UpdateConfig;
use crate::distribution::{CancelToken, DistributionEndpoint, ReleaseInfo};
use crate::events::{event_names, UpdateEmitter, UpdateEvent};
use crate::session::{BundleRef, SessionStore, UpdateSession, UpdateState};
use crate::{CoreError, Result};

/// Subdirectory of the data dir holding staged artifacts.
const BUNDLES_DIR: &str = "bundles";

/// Outcome of a check against the distribution endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The active bundle is the latest published version.
    UpToDate,
    /// A strictly newer version is published; the session is now
    /// downloading.
    UpdateAvailable(ReleaseInfo),
    /// A check or download is already in flight; nothing was started.
    AlreadyInFlight,
    /// A pending bundle is awaiting confirmation; the check is deferred
    /// until the session reaches a terminal state. Only one bundle may be
    /// in flight.
    Deferred,
}

/// Outcome of the caller-driven apply chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    UpToDate,
    /// A new bundle was staged and activated; awaiting confirmation.
    Activated(VersionToken),
    AlreadyInFlight,
    Deferred,
}

/// The on-device update lifecycle state machine.
pub struct UpdateController<E: DistributionEndpoint> {
    config: UpdateConfig,
    session: UpdateSession,
    store: SessionStore,
    endpoint: E,
    emitter: Arc<dyn UpdateEmitter>,
    bundles_dir: PathBuf,
    /// Advertised metadata between check and download; in-memory only. A
    /// crash between the two simply requires a fresh check.
    staged_release: Option<ReleaseInfo>,
}

impl<E: DistributionEndpoint> UpdateController<E> {
    /// Open the controller over the device data directory, performing
    /// startup recovery before anything else: interrupted in-flight states
    /// reset to idle, and a persisted awaiting-confirmation session whose
    /// deadline has already passed (or was lost) rolls back immediately.
    pub fn open(
        config: UpdateConfig,
        data_dir: &std::path::Path,
        endpoint: E,
        emitter: Arc<dyn UpdateEmitter>,
    ) -> Result<Self> {
        let store = SessionStore::new(data_dir);
        let session = store.load_or_new(&config.app_id());
        let mut controller = Self {
            bundles_dir: data_dir.join(BUNDLES_DIR),
            config,
            session,
            store,
            endpoint,
            emitter,
            staged_release: None,
        };
        controller.recover(Utc::now())?;
        Ok(controller)
    }

    /// The current session record.
    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    /// The configuration the controller runs with.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// The bundle the application should run on next cold start.
    pub fn boot_bundle(&self) -> Option<&BundleRef> {
        self.session.boot_bundle()
    }

    /// Deadline by which the pending bundle must confirm, if one is live.
    pub fn confirmation_deadline(&self) -> Option<DateTime<Utc>> {
        self.session.confirmation_deadline
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Query the endpoint for the latest published version.
    ///
    /// Safe to call repeatedly: mid-flight states are a no-op, and a check
    /// arriving while a pending bundle awaits confirmation is deferred.
    /// A network failure restores the prior state; the session is
    /// observably unchanged.
    pub fn check_for_update(&mut self) -> Result<CheckOutcome> {
        if self.session.state == UpdateState::AwaitingConfirmation {
            return Ok(CheckOutcome::Deferred);
        }
        if !self.session.state.can_start_check() {
            return Ok(CheckOutcome::AlreadyInFlight);
        }

        let prior = self.session.state;
        self.session.transition(UpdateState::Checking);
        self.store.save(&self.session)?;

        let latest = match self.endpoint.latest(&self.config.app_id()) {
            Ok(latest) => latest,
            Err(err) => {
                self.session.transition(prior);
                self.store.save(&self.session)?;
                return Err(err);
            }
        };

        let newer = self
            .session
            .active_version()
            .map_or(true, |active| latest.version.is_newer_than(active));

        if !newer {
            self.session.transition(UpdateState::UpToDate);
            self.store.save(&self.session)?;
            return Ok(CheckOutcome::UpToDate);
        }

        info!(version = %latest.version, "Update available");
        self.session.transition(UpdateState::Downloading);
        self.store.save(&self.session)?;
        self.staged_release = Some(latest.clone());
        self.emit(event_names::UPDATE_AVAILABLE, Some(latest.version.clone()), None);
        Ok(CheckOutcome::UpdateAvailable(latest))
    }

    /// Fetch the artifact, verify its checksum against the advertised
    /// metadata, and stage it as the pending bundle.
    ///
    /// No partial state is ever observable: the session's pending slot is
    /// only written after the checksum matches and the artifact is fully
    /// on disk. Cancellation returns the session to idle untouched.
    pub fn download_and_stage(&mut self, cancel: &CancelToken) -> Result<BundleRef> {
        if self.session.state != UpdateState::Downloading {
            return Err(CoreError::InvalidTransition {
                from: self.session.state,
                op: "download_and_stage",
            });
        }
        let Some(release) = self.staged_release.clone() else {
            return Err(CoreError::InvalidTransition {
                from: self.session.state,
                op: "download_and_stage",
            });
        };

        let bytes = match self.endpoint.fetch(&release, cancel) {
            Ok(bytes) => bytes,
            Err(CoreError::Cancelled) => {
                self.staged_release = None;
                self.session.transition(UpdateState::Idle);
                self.store.save(&self.session)?;
                return Err(CoreError::Cancelled);
            }
            Err(err) => {
                self.staged_release = None;
                self.fail(&release.version, &err.to_string())?;
                return Err(err);
            }
        };

        let actual = FileEntry::compute_checksum(&bytes);
        if actual != release.checksum {
            self.staged_release = None;
            self.fail(&release.version, "artifact checksum mismatch")?;
            return Err(CoreError::Integrity {
                expected: release.checksum,
                actual,
            });
        }

        let artifact = self.stage_artifact(&release.version, &bytes)?;
        let bundle = BundleRef {
            version: release.version.clone(),
            checksum: release.checksum.clone(),
            artifact: Some(artifact),
        };

        self.staged_release = None;
        self.session.pending = Some(bundle.clone());
        self.session.transition(UpdateState::Downloaded);
        self.store.save(&self.session)?;
        self.emit(event_names::DOWNLOAD_COMPLETE, Some(bundle.version.clone()), None);
        Ok(bundle)
    }

    /// Activate the staged bundle speculatively and start the confirmation
    /// window.
    ///
    /// Calling this with nothing staged is a programming-contract
    /// violation and fails fast.
    pub fn activate(&mut self) -> Result<DateTime<Utc>> {
        self.activate_at(Utc::now())
    }

    pub fn activate_at(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.session.state != UpdateState::Downloaded || self.session.pending.is_none() {
            return Err(CoreError::InvalidTransition {
                from: self.session.state,
                op: "activate",
            });
        }

        let window = Duration::seconds(self.config.confirmation_window_secs as i64);
        let deadline = now + window;
        self.session.confirmation_deadline = Some(deadline);
        self.session.transition(UpdateState::AwaitingConfirmation);
        self.store.save(&self.session)?;

        let version = self.session.pending.as_ref().map(|b| b.version.clone());
        self.emit(event_names::ACTIVATED, version, None);
        Ok(deadline)
    }

    /// Application self-check callback: confirm the speculatively active
    /// bundle.
    ///
    /// Returns true if a pending bundle was confirmed. Outside the window,
    /// or with nothing pending, this is a no-op — confirmation is racy
    /// against process restarts and must be safe to call redundantly.
    pub fn notify_ready(&mut self) -> Result<bool> {
        self.notify_ready_at(Utc::now())
    }

    pub fn notify_ready_at(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.session.state != UpdateState::AwaitingConfirmation {
            return Ok(false);
        }
        let within_window = self
            .session
            .confirmation_deadline
            .is_some_and(|deadline| now <= deadline);
        if !within_window {
            // Missed the window; the expiry timer owns the rollback.
            return Ok(false);
        }
        let Some(bundle) = self.session.pending.take() else {
            return Ok(false);
        };

        info!(version = %bundle.version, "Bundle confirmed");
        self.session.active = Some(bundle.clone());
        self.session.confirmation_deadline = None;
        self.session.transition(UpdateState::Confirmed);
        self.store.save(&self.session)?;
        self.emit(event_names::CONFIRMED, Some(bundle.version), None);
        Ok(true)
    }

    /// Roll back if the confirmation deadline has elapsed.
    ///
    /// Timer-driven (the watch loop schedules it), idempotent, and the
    /// single most important guarantee in the system: the previously
    /// active bundle was never displaced, so rollback is a pure discard of
    /// the unproven pending bundle.
    pub fn expire_if_due(&mut self) -> Result<bool> {
        self.expire_if_due_at(Utc::now())
    }

    pub fn expire_if_due_at(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.session.state != UpdateState::AwaitingConfirmation {
            return Ok(false);
        }
        let due = self
            .session
            .confirmation_deadline
            .map_or(true, |deadline| deadline < now);
        if !due {
            return Ok(false);
        }
        self.roll_back()?;
        Ok(true)
    }

    /// Caller-driven convenience: check, download, stage, and activate in
    /// one step. Embedders that prefer to prompt the user first call the
    /// individual operations instead.
    pub fn apply_now(&mut self, cancel: &CancelToken) -> Result<ApplyOutcome> {
        match self.check_for_update()? {
            CheckOutcome::UpToDate => Ok(ApplyOutcome::UpToDate),
            CheckOutcome::AlreadyInFlight => Ok(ApplyOutcome::AlreadyInFlight),
            CheckOutcome::Deferred => Ok(ApplyOutcome::Deferred),
            CheckOutcome::UpdateAvailable(_) => {
                let bundle = self.download_and_stage(cancel)?;
                self.activate()?;
                Ok(ApplyOutcome::Activated(bundle.version))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recovery and internals
    // -----------------------------------------------------------------------

    /// Re-evaluate persisted state at startup.
    fn recover(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.session.state {
            UpdateState::Checking | UpdateState::Downloading => {
                warn!(state = %self.session.state, "Interrupted operation found at startup, resetting to idle");
                self.session.transition(UpdateState::Idle);
                self.store.save(&self.session)?;
            }
            UpdateState::AwaitingConfirmation => {
                let deadline = self.session.confirmation_deadline;
                if deadline.is_none() {
                    // Deadline lost while awaiting confirmation: the
                    // conservative reading is that liveness was never
                    // proven.
                    warn!("Confirmation deadline missing at startup, rolling back");
                    self.roll_back()?;
                } else if self.expire_if_due_at(now)? {
                    warn!("Confirmation deadline elapsed before restart, rolled back");
                }
            }
            _ => {}
        }
        if let Err(err) = self.session.check_invariants() {
            warn!(error = %err, "Sanitizing inconsistent session record");
            self.session.pending = None;
            self.session.confirmation_deadline = None;
            self.session.transition(UpdateState::Idle);
            self.store.save(&self.session)?;
        }
        Ok(())
    }

    /// Discard the pending bundle and mark the session rolled back.
    fn roll_back(&mut self) -> Result<()> {
        let discarded = self.session.pending.take();
        if let Some(bundle) = &discarded {
            info!(version = %bundle.version, "Rolling back unconfirmed bundle");
            if let Some(artifact) = &bundle.artifact {
                if let Err(err) = fs::remove_file(artifact) {
                    warn!(path = %artifact.display(), error = %err, "Failed to remove rolled-back artifact");
                }
            }
        }
        self.session.confirmation_deadline = None;
        self.session.transition(UpdateState::RolledBack);
        self.store.save(&self.session)?;
        self.emit(
            event_names::ROLLED_BACK,
            discarded.map(|b| b.version),
            Some("confirmation window elapsed".to_string()),
        );
        Ok(())
    }

    /// Mark the session failed and report it. The active and pending
    /// bundles are left untouched.
    fn fail(&mut self, version: &VersionToken, detail: &str) -> Result<()> {
        warn!(version = %version, detail, "Update failed");
        self.session.transition(UpdateState::Failed);
        self.store.save(&self.session)?;
        self.emit(
            event_names::FAILED,
            Some(version.clone()),
            Some(detail.to_string()),
        );
        Ok(())
    }

    /// Write the artifact under the bundles dir, temp file then rename.
    fn stage_artifact(&self, version: &VersionToken, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.bundles_dir)?;
        let path = self.bundles_dir.join(format!("{}.zip", version));
        let tmp = path.with_extension("zip.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    fn emit(&self, name: &str, version: Option<VersionToken>, detail: Option<String>) {
        let mut event = UpdateEvent::new(name);
        if let Some(version) = version {
            event = event.with_version(version);
        }
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.emitter.emit(event);
    }
}
