//! Watch loop: the timer that owns deadline expiry and periodic checks.
//!
//! Tick-based, single-threaded. Each tick:
//! 1. roll back if the confirmation deadline has elapsed,
//! 2. run a periodic check when one is due (optionally applying the
//!    update immediately),
//! 3. report how long to sleep — until the confirmation deadline if one
//!    is live, otherwise until the next periodic check.
//!
//! Deadline expiry is driven here, not by API callers; `expire_if_due`
//! being idempotent makes redundant timer fires harmless. Startup
//! recovery (crash-before-confirmation) already ran when the controller
//! was opened.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::controller::{ApplyOutcome, CheckOutcome, UpdateController};
use crate::distribution::{CancelToken, DistributionEndpoint};
use crate::Result;

/// Behavior of the watch loop when an update is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Only check and report; the embedder applies explicitly.
    NotifyOnly,
    /// Download and activate as soon as an update is published.
    AutoApply,
}

/// The tick-driven watch scheduler.
pub struct WatchLoop<E: DistributionEndpoint> {
    controller: UpdateController<E>,
    mode: WatchMode,
    check_interval: ChronoDuration,
    next_check_at: DateTime<Utc>,
    cancel: CancelToken,
}

impl<E: DistributionEndpoint> WatchLoop<E> {
    pub fn new(controller: UpdateController<E>, mode: WatchMode) -> Self {
        let check_interval = ChronoDuration::seconds(controller.config().check_interval_secs as i64);
        Self {
            controller,
            mode,
            check_interval,
            next_check_at: Utc::now(),
            cancel: CancelToken::new(),
        }
    }

    /// Token callers can use to abort an in-flight download.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn controller(&self) -> &UpdateController<E> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut UpdateController<E> {
        &mut self.controller
    }

    /// One scheduler tick. Returns how long to sleep before the next.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Duration> {
        if self.controller.expire_if_due_at(now)? {
            info!("Confirmation window elapsed, rolled back");
        }

        if now >= self.next_check_at {
            self.next_check_at = now + self.check_interval;
            self.run_check()?;
        }

        Ok(self.sleep_until_next(now))
    }

    /// Run the loop until the process is stopped.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let sleep = self.tick(Utc::now())?;
            std::thread::sleep(sleep);
        }
    }

    fn run_check(&mut self) -> Result<()> {
        match self.mode {
            WatchMode::NotifyOnly => match self.controller.check_for_update() {
                Ok(CheckOutcome::UpdateAvailable(release)) => {
                    info!(version = %release.version, "Update available");
                }
                Ok(_) => {}
                // Network failures are retried on the next interval.
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "Check failed, will retry");
                }
                Err(err) => return Err(err),
            },
            WatchMode::AutoApply => match self.controller.apply_now(&self.cancel) {
                Ok(ApplyOutcome::Activated(version)) => {
                    info!(%version, "Update activated, awaiting confirmation");
                }
                Ok(_) => {}
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "Apply failed, will retry");
                }
                Err(err) => return Err(err),
            },
        }
        Ok(())
    }

    /// Sleep until the confirmation deadline or the next periodic check,
    /// whichever is sooner, with a floor of one second.
    fn sleep_until_next(&self, now: DateTime<Utc>) -> Duration {
        let mut wake = self.next_check_at;
        if let Some(deadline) = self.controller.confirmation_deadline() {
            if deadline < wake {
                wake = deadline;
            }
        }
        let millis = (wake - now).num_milliseconds().max(1000);
        Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateConfig;
    use crate::distribution::{DirEndpoint, ReleaseInfo};
    use crate::events::NullEmitter;
    use crate::session::UpdateState;
    use lr_bundle::FileEntry;
    use lr_common::{AppId, VersionToken};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn publish(root: &std::path::Path, version: &str, artifact: &[u8]) {
        let endpoint = DirEndpoint::new(root);
        fs::create_dir_all(root.join("artifacts")).expect("mkdir");
        let url = format!("artifacts/{}.zip", version);
        fs::write(root.join(&url), artifact).expect("write artifact");
        endpoint
            .publish(
                &AppId::from("shop-app"),
                &ReleaseInfo {
                    version: VersionToken::parse(version).expect("version"),
                    checksum: FileEntry::compute_checksum(artifact),
                    url,
                },
            )
            .expect("publish");
    }

    fn watch_loop(tmp: &TempDir, mode: WatchMode) -> WatchLoop<DirEndpoint> {
        let repo = tmp.path().join("repo");
        let data = tmp.path().join("data");
        fs::create_dir_all(&repo).expect("mkdir");
        publish(&repo, "2.0.0", b"artifact-v2");

        let mut config = UpdateConfig::new("shop-app", repo.display().to_string());
        config.check_interval_secs = 60;
        let controller = UpdateController::open(
            config,
            &data,
            DirEndpoint::new(&repo),
            Arc::new(NullEmitter),
        )
        .expect("open");
        WatchLoop::new(controller, mode)
    }

    #[test]
    fn test_auto_apply_tick_activates_and_arms_deadline() {
        let tmp = TempDir::new().expect("tempdir");
        let mut watch = watch_loop(&tmp, WatchMode::AutoApply);

        let now = Utc::now();
        let sleep = watch.tick(now).expect("tick");
        assert_eq!(
            watch.controller().session().state,
            UpdateState::AwaitingConfirmation
        );
        // Next wake is bounded by the 30s confirmation deadline, not the
        // 60s check interval.
        assert!(sleep <= Duration::from_secs(31));
    }

    #[test]
    fn test_expired_deadline_rolls_back_on_next_tick() {
        let tmp = TempDir::new().expect("tempdir");
        let mut watch = watch_loop(&tmp, WatchMode::AutoApply);

        let now = Utc::now();
        watch.tick(now).expect("tick");
        watch
            .tick(now + ChronoDuration::seconds(31))
            .expect("expiry tick");
        assert_eq!(watch.controller().session().state, UpdateState::RolledBack);
    }

    #[test]
    fn test_notify_only_does_not_activate() {
        let tmp = TempDir::new().expect("tempdir");
        let mut watch = watch_loop(&tmp, WatchMode::NotifyOnly);

        watch.tick(Utc::now()).expect("tick");
        assert_eq!(
            watch.controller().session().state,
            UpdateState::Downloading
        );
    }

    #[test]
    fn test_checks_respect_interval() {
        let tmp = TempDir::new().expect("tempdir");
        let mut watch = watch_loop(&tmp, WatchMode::NotifyOnly);

        let now = Utc::now();
        watch.tick(now).expect("first tick checks");
        // Ten seconds later: no check due, state unchanged, no double
        // download kick-off.
        watch
            .tick(now + ChronoDuration::seconds(10))
            .expect("quiet tick");
        assert_eq!(
            watch.controller().session().state,
            UpdateState::Downloading
        );
    }
}
