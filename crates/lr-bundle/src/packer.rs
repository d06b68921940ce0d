//! Bundle packer: built asset directory in, one immutable artifact out.
//!
//! Packaging is operations tooling with a single hard rule: metadata must
//! never point at a partially written artifact. The archive is assembled in
//! memory, checksummed, written to a temporary path in the destination
//! directory, and renamed into place.

use crate::{BundleError, BundleManifest, FileEntry, Result, MANIFEST_FILE_NAME};
use lr_common::{AppId, VersionToken};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Metadata for a published artifact.
///
/// This is what the distribution endpoint advertises for the bundle: the
/// version token, the whole-artifact SHA-256 digest, and the byte size.
#[derive(Debug, Clone)]
pub struct PackedBundle {
    /// The manifest embedded in the artifact.
    pub manifest: BundleManifest,
    /// Final artifact location.
    pub path: PathBuf,
    /// SHA-256 hex digest of the artifact bytes.
    pub checksum: String,
    /// Artifact size in bytes (compressed).
    pub bytes: u64,
}

/// Packs a built asset directory into a versioned bundle artifact.
pub struct BundlePacker {
    app_id: AppId,
    version: VersionToken,
    description: Option<String>,
}

impl BundlePacker {
    /// Create a packer for one app/version.
    pub fn new(app_id: impl Into<AppId>, version: VersionToken) -> Self {
        Self {
            app_id: app_id.into(),
            version,
            description: None,
        }
    }

    /// Set the bundle description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Pack `asset_dir` into an artifact at `dest`.
    ///
    /// Fails if the asset directory is missing or empty; a failed build
    /// step upstream must surface here, never produce an empty bundle.
    pub fn pack(&self, asset_dir: &Path, dest: &Path) -> Result<PackedBundle> {
        if !asset_dir.is_dir() {
            return Err(BundleError::AssetDirNotFound(
                asset_dir.display().to_string(),
            ));
        }

        let files = collect_assets(asset_dir)?;
        if files.is_empty() {
            return Err(BundleError::EmptyBundle);
        }

        let mut manifest = BundleManifest::new(self.app_id.clone(), self.version.clone());
        if let Some(description) = &self.description {
            manifest = manifest.with_description(description.clone());
        }
        for (rel_path, data) in &files {
            let checksum = FileEntry::compute_checksum(data);
            manifest.add_file(FileEntry::new(rel_path.clone(), checksum, data.len() as u64));
            debug!(path = %rel_path, bytes = data.len(), "Added file to bundle");
        }
        manifest.sort_files();

        let archive = build_archive(&manifest, &files)?;
        let checksum = FileEntry::compute_checksum(&archive);
        let bytes = archive.len() as u64;

        // Publish atomically: temp file in the destination directory, then
        // rename. A crash mid-write leaves only the temp file behind.
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = dest.with_extension("zip.tmp");
        fs::write(&tmp, &archive)?;
        fs::rename(&tmp, dest)?;

        info!(
            path = %dest.display(),
            version = %manifest.version,
            files = manifest.file_count(),
            bytes,
            checksum = %checksum,
            "Bundle published"
        );

        Ok(PackedBundle {
            manifest,
            path: dest.to_path_buf(),
            checksum,
            bytes,
        })
    }
}

/// Collect (relative path, contents) pairs from the asset tree, sorted by
/// path for deterministic archives.
fn collect_assets(asset_dir: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(asset_dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(asset_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let data = fs::read(entry.path())?;
        files.push((rel, data));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Build the ZIP archive in memory, manifest first.
fn build_archive(manifest: &BundleManifest, files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let manifest_json = manifest.to_json()?;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        zip.start_file(MANIFEST_FILE_NAME, options)?;
        zip.write_all(manifest_json.as_bytes())?;

        for (path, data) in files {
            zip.start_file(path.as_str(), options)?;
            zip.write_all(data)?;
        }

        zip.finish()?;
    }

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundleReader;
    use tempfile::TempDir;

    fn version(s: &str) -> VersionToken {
        VersionToken::parse(s).expect("valid version")
    }

    fn write_assets(dir: &Path) {
        fs::create_dir_all(dir.join("assets")).expect("mkdir");
        fs::write(dir.join("index.html"), b"<html></html>").expect("write");
        fs::write(dir.join("assets/app.js"), b"console.log(1)").expect("write");
    }

    #[test]
    fn test_pack_produces_verifiable_artifact() {
        let tmp = TempDir::new().expect("tempdir");
        let assets = tmp.path().join("dist");
        write_assets(&assets);

        let dest = tmp.path().join("out/shop-app-1.0.0.zip");
        let packer = BundlePacker::new("shop-app", version("1.0.0"));
        let packed = packer.pack(&assets, &dest).expect("pack");

        assert!(dest.exists());
        assert_eq!(packed.manifest.file_count(), 2);
        assert_eq!(packed.bytes, fs::metadata(&dest).expect("meta").len());

        let artifact = fs::read(&dest).expect("read artifact");
        assert_eq!(FileEntry::compute_checksum(&artifact), packed.checksum);

        let mut reader = BundleReader::open(&dest).expect("open");
        assert_eq!(reader.manifest().version, version("1.0.0"));
        reader.verify_files().expect("file checksums match");
    }

    #[test]
    fn test_pack_missing_asset_dir_fails_loudly() {
        let tmp = TempDir::new().expect("tempdir");
        let packer = BundlePacker::new("shop-app", version("1.0.0"));
        let err = packer
            .pack(&tmp.path().join("no-such-dir"), &tmp.path().join("out.zip"))
            .expect_err("must fail");
        assert!(matches!(err, BundleError::AssetDirNotFound(_)));
    }

    #[test]
    fn test_pack_empty_asset_dir_fails() {
        let tmp = TempDir::new().expect("tempdir");
        let assets = tmp.path().join("dist");
        fs::create_dir_all(&assets).expect("mkdir");

        let packer = BundlePacker::new("shop-app", version("1.0.0"));
        let err = packer
            .pack(&assets, &tmp.path().join("out.zip"))
            .expect_err("must fail");
        assert!(matches!(err, BundleError::EmptyBundle));
    }

    #[test]
    fn test_no_partial_artifact_left_at_dest() {
        let tmp = TempDir::new().expect("tempdir");
        let assets = tmp.path().join("dist");
        fs::create_dir_all(&assets).expect("mkdir");

        let dest = tmp.path().join("out/shop-app-1.0.0.zip");
        let packer = BundlePacker::new("shop-app", version("1.0.0"));
        let _ = packer.pack(&assets, &dest).expect_err("empty bundle");
        assert!(!dest.exists());
    }

    #[test]
    fn test_pack_is_deterministic_about_file_order() {
        let tmp = TempDir::new().expect("tempdir");
        let assets = tmp.path().join("dist");
        write_assets(&assets);

        let dest = tmp.path().join("a.zip");
        let packed = BundlePacker::new("shop-app", version("2.0.0"))
            .pack(&assets, &dest)
            .expect("pack");
        let paths: Vec<&str> = packed.manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/app.js", "index.html"]);
    }
}
