//! Lifecycle event emission for embedding applications.
//!
//! Events are a notification channel, not a control surface: subscribers
//! observe transitions (update available, download complete, activation,
//! confirmation, rollback, failure) but cannot force one. Dispatch goes
//! through an in-process event bus supporting multiple subscribers, and
//! every event is also appended to a JSONL log so a late subscriber can
//! lazily replay the full history.

use chrono::{DateTime, Utc};
use lr_common::VersionToken;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use tracing::warn;

/// Standard lifecycle event names.
pub mod event_names {
    pub const UPDATE_AVAILABLE: &str = "update_available";
    pub const DOWNLOAD_COMPLETE: &str = "download_complete";
    pub const ACTIVATED: &str = "activated";
    pub const CONFIRMED: &str = "confirmed";
    pub const ROLLED_BACK: &str = "rolled_back";
    pub const FAILED: &str = "failed";
}

/// A lifecycle transition, with the bundle version it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UpdateEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            version: None,
            detail: None,
        }
    }

    pub fn with_version(mut self, version: VersionToken) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Trait for emitting lifecycle events.
pub trait UpdateEmitter: Send + Sync {
    fn emit(&self, event: UpdateEvent);
}

/// Broadcast event bus supporting multiple subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Mutex<Vec<mpsc::Sender<UpdateEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to receive lifecycle events.
    pub fn subscribe(&self) -> mpsc::Receiver<UpdateEvent> {
        let (tx, rx) = mpsc::channel();
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.push(tx);
        rx
    }

    /// Emit an event to all live subscribers.
    pub fn emit(&self, event: UpdateEvent) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

impl UpdateEmitter for EventBus {
    fn emit(&self, event: UpdateEvent) {
        self.emit(event);
    }
}

/// JSONL writer for lifecycle events (CLI-friendly).
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> UpdateEmitter for JsonlWriter<W> {
    fn emit(&self, event: UpdateEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

/// Fan-out emitter that forwards events to multiple emitters.
pub struct FanoutEmitter {
    emitters: Vec<Arc<dyn UpdateEmitter>>,
}

impl FanoutEmitter {
    pub fn new(emitters: Vec<Arc<dyn UpdateEmitter>>) -> Self {
        Self { emitters }
    }
}

impl UpdateEmitter for FanoutEmitter {
    fn emit(&self, event: UpdateEvent) {
        for emitter in &self.emitters {
            emitter.emit(event.clone());
        }
    }
}

/// Append-only JSONL log of lifecycle events under the data directory.
///
/// `replay` yields the persisted history as a lazy iterator; each call
/// restarts from the beginning, so every subscription gets its own full,
/// ordered view.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("events.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn append(&self, event: &UpdateEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", event.to_jsonl())
    }

    /// Lazily iterate the persisted event history from the start.
    ///
    /// Unparseable lines are skipped rather than aborting the replay.
    pub fn replay(&self) -> std::io::Result<impl Iterator<Item = UpdateEvent>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => Some(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        let lines = file
            .map(|f| BufReader::new(f).lines())
            .into_iter()
            .flatten();
        Ok(lines.filter_map(|line| {
            let line = line.ok()?;
            serde_json::from_str::<UpdateEvent>(&line).ok()
        }))
    }
}

impl UpdateEmitter for EventLog {
    fn emit(&self, event: UpdateEvent) {
        if let Err(err) = self.append(&event) {
            warn!(path = %self.path.display(), error = %err, "Failed to append event log");
        }
    }
}

/// Emitter that drops everything; for callers without listeners.
#[derive(Debug, Default)]
pub struct NullEmitter;

impl UpdateEmitter for NullEmitter {
    fn emit(&self, _event: UpdateEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn version(s: &str) -> VersionToken {
        VersionToken::parse(s).expect("valid version")
    }

    #[test]
    fn test_event_jsonl_shape() {
        let event = UpdateEvent::new(event_names::ROLLED_BACK).with_version(version("2.0.0"));
        let json = event.to_jsonl();
        assert!(json.contains(r#""event":"rolled_back""#));
        assert!(json.contains(r#""version":"2.0.0""#));
    }

    #[test]
    fn test_event_bus_dispatch() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(UpdateEvent::new(event_names::UPDATE_AVAILABLE).with_version(version("1.1.0")));
        let received = rx.recv().expect("event should be delivered");
        assert_eq!(received.event, event_names::UPDATE_AVAILABLE);
        assert_eq!(received.version, Some(version("1.1.0")));
    }

    #[test]
    fn test_event_bus_drops_dead_subscribers() {
        let bus = EventBus::new();
        drop(bus.subscribe());
        let rx = bus.subscribe();
        bus.emit(UpdateEvent::new(event_names::CONFIRMED));
        assert_eq!(rx.recv().expect("delivered").event, event_names::CONFIRMED);
    }

    #[test]
    fn test_event_log_replay_is_restartable() {
        let tmp = TempDir::new().expect("tempdir");
        let log = EventLog::new(tmp.path());
        log.append(&UpdateEvent::new(event_names::UPDATE_AVAILABLE).with_version(version("2.0.0")))
            .expect("append");
        log.append(&UpdateEvent::new(event_names::DOWNLOAD_COMPLETE).with_version(version("2.0.0")))
            .expect("append");

        let first: Vec<String> = log.replay().expect("replay").map(|e| e.event).collect();
        let second: Vec<String> = log.replay().expect("replay").map(|e| e.event).collect();
        assert_eq!(first, vec!["update_available", "download_complete"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_event_log_replay_empty_when_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let log = EventLog::new(tmp.path());
        assert_eq!(log.replay().expect("replay").count(), 0);
    }
}
