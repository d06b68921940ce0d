//! Distribution endpoint client.
//!
//! The endpoint is an external collaborator; the core only consumes two
//! idempotent, retry-safe reads: the latest published version metadata for
//! an app, and artifact bytes. Both are fallible and leave no state behind
//! on failure.
//!
//! Two implementations ship:
//! - `HttpEndpoint`: blocking HTTP client with request timeouts
//! - `DirEndpoint`: directory-backed endpoint, the ops-side counterpart of
//!   `liveroll pack` and the natural test double

use lr_common::{AppId, VersionToken};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{CoreError, Result};

/// Chunk size for cancellable artifact reads.
const FETCH_CHUNK_BYTES: usize = 64 * 1024;

/// Metadata the endpoint advertises for the latest published bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Published version token.
    pub version: VersionToken,
    /// SHA-256 hex digest of the artifact.
    pub checksum: String,
    /// Artifact location: absolute URL for HTTP endpoints, relative path
    /// for directory endpoints.
    pub url: String,
}

/// Cooperative cancellation flag for in-flight downloads.
///
/// Checked between read chunks; a cancelled fetch aborts without touching
/// the update session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A source of published bundle metadata and artifact bytes.
pub trait DistributionEndpoint {
    /// Latest published version metadata for the app.
    fn latest(&self, app_id: &AppId) -> Result<ReleaseInfo>;

    /// Fetch the artifact bytes for a release.
    fn fetch(&self, release: &ReleaseInfo, cancel: &CancelToken) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// HTTP endpoint
// ---------------------------------------------------------------------------

/// Blocking HTTP distribution endpoint.
///
/// Metadata lives at `{base}/apps/{app_id}/latest.json`; artifacts at the
/// URL the metadata advertises (joined against the base when relative).
pub struct HttpEndpoint {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn artifact_url(&self, release: &ReleaseInfo) -> String {
        if release.url.starts_with("http://") || release.url.starts_with("https://") {
            release.url.clone()
        } else {
            format!("{}/{}", self.base_url, release.url.trim_start_matches('/'))
        }
    }
}

impl DistributionEndpoint for HttpEndpoint {
    fn latest(&self, app_id: &AppId) -> Result<ReleaseInfo> {
        let url = format!("{}/apps/{}/latest.json", self.base_url, app_id);
        debug!(%url, "Querying latest release");
        let release: ReleaseInfo = self.agent.get(&url).call()?.into_json()?;
        Ok(release)
    }

    fn fetch(&self, release: &ReleaseInfo, cancel: &CancelToken) -> Result<Vec<u8>> {
        let url = self.artifact_url(release);
        debug!(%url, version = %release.version, "Fetching artifact");
        let response = self.agent.get(&url).call()?;
        let mut reader = response.into_reader();
        read_cancellable(&mut reader, cancel)
    }
}

// ---------------------------------------------------------------------------
// Directory endpoint
// ---------------------------------------------------------------------------

/// Directory-backed distribution endpoint.
///
/// Layout mirrors the HTTP endpoint: `{root}/apps/{app_id}/latest.json`
/// plus artifact files at the relative paths the metadata names.
pub struct DirEndpoint {
    root: PathBuf,
}

impl DirEndpoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn latest_path(&self, app_id: &AppId) -> PathBuf {
        self.root
            .join("apps")
            .join(app_id.as_str())
            .join("latest.json")
    }

    /// Publish release metadata atomically (temp file + rename).
    ///
    /// Called by ops tooling after the artifact itself is in place, so the
    /// metadata never points at a partially written artifact.
    pub fn publish(&self, app_id: &AppId, release: &ReleaseInfo) -> Result<()> {
        let path = self.latest_path(app_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(release)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        info!(app_id = %app_id, version = %release.version, path = %path.display(), "Release published");
        Ok(())
    }

    /// Absolute path of an artifact named by release metadata.
    pub fn artifact_path(&self, release: &ReleaseInfo) -> PathBuf {
        self.root.join(&release.url)
    }
}

impl DistributionEndpoint for DirEndpoint {
    fn latest(&self, app_id: &AppId) -> Result<ReleaseInfo> {
        let path = self.latest_path(app_id);
        let json = fs::read_to_string(&path)
            .map_err(|err| CoreError::Network(format!("{}: {}", path.display(), err)))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn fetch(&self, release: &ReleaseInfo, cancel: &CancelToken) -> Result<Vec<u8>> {
        let path = self.artifact_path(release);
        let mut file = fs::File::open(&path)
            .map_err(|err| CoreError::Network(format!("{}: {}", path.display(), err)))?;
        read_cancellable(&mut file, cancel)
    }
}

/// Read a stream to the end in chunks, honoring the cancel token.
fn read_cancellable(reader: &mut dyn Read, cancel: &CancelToken) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; FETCH_CHUNK_BYTES];
    loop {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let n = reader
            .read(&mut chunk)
            .map_err(|err| CoreError::Network(err.to_string()))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}
