//! Update bundle packer/reader for liveroll.
//!
//! A bundle is one immutable, checksummed unit of deployable application
//! code: a ZIP archive of a built asset tree plus a manifest describing it.
//!
//! # Artifact Format
//!
//! Bundles are ZIP archives containing:
//! - `manifest.json`: app id, version token, creation time, file listing
//!   with per-file SHA-256 checksums
//! - the asset files under their original relative paths
//!
//! The artifact as a whole has a SHA-256 digest; that digest is what the
//! distribution endpoint advertises and what the device verifies before a
//! staged bundle is ever trusted.
//!
//! # Publishing
//!
//! The packer writes the archive to a temporary path in the destination
//! directory, computes the digest, then renames into place. Metadata is only
//! ever produced for a fully written artifact.
//!
//! # Example
//!
//! ```no_run
//! use lr_bundle::{BundlePacker, BundleReader};
//! use lr_common::VersionToken;
//! use std::path::Path;
//!
//! let packer = BundlePacker::new("shop-app", VersionToken::parse("1.4.0").unwrap());
//! let packed = packer.pack(Path::new("dist/"), Path::new("out/shop-app-1.4.0.zip")).unwrap();
//! println!("published {} ({} bytes)", packed.checksum, packed.bytes);
//!
//! let mut reader = BundleReader::open(Path::new("out/shop-app-1.4.0.zip")).unwrap();
//! reader.verify_files().unwrap();
//! ```

pub mod error;
pub mod manifest;
pub mod packer;
pub mod reader;

pub use error::{BundleError, Result};
pub use manifest::{BundleManifest, FileEntry, MANIFEST_FILE_NAME};
pub use packer::{BundlePacker, PackedBundle};
pub use reader::{verify_artifact, BundleReader};
