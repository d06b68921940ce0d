//! Bundle manifest types and serialization.
//!
//! The manifest is the source of truth for a bundle's contents:
//! - Identity (app id, version token)
//! - Creation timestamp
//! - File listing with SHA-256 checksums and byte sizes

use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use lr_common::{AppId, VersionToken, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Manifest file name within the artifact.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Bundle manifest containing identity and file checksums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Schema version for the manifest structure.
    pub schema_version: String,

    /// Application this bundle belongs to.
    pub app_id: AppId,

    /// Version token; the bundle's identity within its app.
    pub version: VersionToken,

    /// When the bundle was packed.
    pub created_at: DateTime<Utc>,

    /// Files included in the bundle with checksums.
    pub files: Vec<FileEntry>,

    /// Optional description or release notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BundleManifest {
    /// Create a new manifest with required fields.
    pub fn new(app_id: impl Into<AppId>, version: VersionToken) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            app_id: app_id.into(),
            version,
            created_at: Utc::now(),
            files: Vec::new(),
            description: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a file entry to the manifest.
    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Total uncompressed size of all files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    /// Number of files (not including the manifest itself).
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Find a file entry by path.
    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Sort file entries by path for deterministic ordering.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate manifest structure against the supported schema version.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(BundleError::UnsupportedVersion {
                version: self.schema_version.clone(),
                supported: SCHEMA_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

/// A file within the bundle, with its checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative path within the bundle.
    pub path: String,

    /// SHA-256 hex digest of the file contents.
    pub sha256: String,

    /// Uncompressed size in bytes.
    pub bytes: u64,
}

impl FileEntry {
    /// Create a new file entry.
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            bytes,
        }
    }

    /// Compute the SHA-256 hex digest of data.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> VersionToken {
        VersionToken::parse(s).expect("valid version")
    }

    #[test]
    fn test_manifest_new() {
        let manifest = BundleManifest::new("shop-app", version("1.2.3"));
        assert_eq!(manifest.app_id.as_str(), "shop-app");
        assert_eq!(manifest.version.as_str(), "1.2.3");
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.file_count(), 0);
    }

    #[test]
    fn test_manifest_totals_and_lookup() {
        let mut manifest = BundleManifest::new("shop-app", version("1.2.3"));
        manifest.add_file(FileEntry::new("index.html", "aa", 120));
        manifest.add_file(FileEntry::new("assets/app.js", "bb", 880));

        assert_eq!(manifest.total_bytes(), 1000);
        assert_eq!(manifest.file_count(), 2);
        assert!(manifest.find_file("assets/app.js").is_some());
        assert!(manifest.find_file("missing.js").is_none());
    }

    #[test]
    fn test_manifest_json_roundtrip() {
        let mut manifest =
            BundleManifest::new("shop-app", version("1.2.3")).with_description("hotfix");
        manifest.add_file(FileEntry::new("index.html", "aa", 120));

        let json = manifest.to_json().expect("serialize");
        let parsed = BundleManifest::from_json(&json).expect("parse");
        parsed.validate().expect("valid schema");
        assert_eq!(parsed.version, manifest.version);
        assert_eq!(parsed.files, manifest.files);
        assert_eq!(parsed.description.as_deref(), Some("hotfix"));
    }

    #[test]
    fn test_validate_rejects_unknown_schema() {
        let mut manifest = BundleManifest::new("shop-app", version("1.2.3"));
        manifest.schema_version = "99.0.0".to_string();
        assert!(matches!(
            manifest.validate(),
            Err(BundleError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_compute_checksum_is_sha256_hex() {
        let digest = FileEntry::compute_checksum(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
