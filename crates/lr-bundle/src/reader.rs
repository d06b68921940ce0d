//! Bundle reader: open a published artifact and verify its integrity.

use crate::{BundleError, BundleManifest, FileEntry, Result, MANIFEST_FILE_NAME};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

/// Reader for bundle artifacts with integrity verification.
pub struct BundleReader<R: Read + Seek> {
    manifest: BundleManifest,
    archive: ZipArchive<R>,
}

impl BundleReader<File> {
    /// Open a bundle from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl BundleReader<Cursor<Vec<u8>>> {
    /// Open a bundle from bytes already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> BundleReader<R> {
    /// Create a reader from any Read + Seek source.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let manifest = Self::read_manifest(&mut archive)?;
        manifest.validate()?;

        info!(
            app_id = %manifest.app_id,
            version = %manifest.version,
            files = manifest.file_count(),
            "Bundle opened"
        );

        Ok(Self { manifest, archive })
    }

    fn read_manifest(archive: &mut ZipArchive<R>) -> Result<BundleManifest> {
        let mut manifest_file = archive
            .by_name(MANIFEST_FILE_NAME)
            .map_err(|_| BundleError::MissingFile(MANIFEST_FILE_NAME.to_string()))?;

        let mut json = String::new();
        manifest_file.read_to_string(&mut json)?;
        BundleManifest::from_json(&json)
    }

    /// Get the manifest.
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// List all files in the bundle.
    pub fn files(&self) -> &[FileEntry] {
        &self.manifest.files
    }

    /// Read a file from the bundle, verifying its checksum against the
    /// manifest entry.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let expected = self
            .manifest
            .find_file(path)
            .ok_or_else(|| BundleError::FileNotFound(path.to_string()))?
            .sha256
            .clone();

        let mut entry = self
            .archive
            .by_name(path)
            .map_err(|_| BundleError::FileNotFound(path.to_string()))?;
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;

        let actual = FileEntry::compute_checksum(&data);
        if actual != expected {
            return Err(BundleError::ChecksumMismatch {
                path: path.to_string(),
                expected,
                actual,
            });
        }

        debug!(path, bytes = data.len(), "Verified bundle file");
        Ok(data)
    }

    /// Verify every file listed in the manifest.
    pub fn verify_files(&mut self) -> Result<()> {
        let paths: Vec<String> = self.manifest.files.iter().map(|f| f.path.clone()).collect();
        for path in paths {
            self.read_file(&path)?;
        }
        Ok(())
    }
}

/// Verify that the artifact bytes at `path` match an advertised digest.
///
/// This is the device-side check before a downloaded artifact is ever
/// staged.
pub fn verify_artifact(path: &Path, expected_sha256: &str) -> Result<()> {
    let data = std::fs::read(path)?;
    let actual = FileEntry::compute_checksum(&data);
    if actual != expected_sha256 {
        return Err(BundleError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected_sha256.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundlePacker;
    use lr_common::VersionToken;
    use std::fs;
    use tempfile::TempDir;

    fn packed_fixture(tmp: &TempDir) -> std::path::PathBuf {
        let assets = tmp.path().join("dist");
        fs::create_dir_all(&assets).expect("mkdir");
        fs::write(assets.join("index.html"), b"<html></html>").expect("write");
        let dest = tmp.path().join("bundle.zip");
        BundlePacker::new("shop-app", VersionToken::parse("1.0.0").expect("version"))
            .pack(&assets, &dest)
            .expect("pack");
        dest
    }

    #[test]
    fn test_read_file_verifies_checksum() {
        let tmp = TempDir::new().expect("tempdir");
        let dest = packed_fixture(&tmp);

        let mut reader = BundleReader::open(&dest).expect("open");
        let data = reader.read_file("index.html").expect("read");
        assert_eq!(data, b"<html></html>");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let dest = packed_fixture(&tmp);

        let mut reader = BundleReader::open(&dest).expect("open");
        assert!(matches!(
            reader.read_file("nope.js"),
            Err(BundleError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_verify_artifact_detects_corruption() {
        let tmp = TempDir::new().expect("tempdir");
        let dest = packed_fixture(&tmp);

        let good = FileEntry::compute_checksum(&fs::read(&dest).expect("read"));
        verify_artifact(&dest, &good).expect("intact artifact verifies");

        let mut corrupted = fs::read(&dest).expect("read");
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        fs::write(&dest, &corrupted).expect("write");

        assert!(matches!(
            verify_artifact(&dest, &good),
            Err(BundleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_non_zip_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("junk.zip");
        fs::write(&path, b"not a zip").expect("write");
        assert!(BundleReader::open(&path).is_err());
    }
}
