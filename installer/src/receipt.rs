//! Install receipts.
//!
//! A receipt is written to `<prefix>/INSTALL_RECEIPT.json` once a package
//! reaches the verified state, and only then. Its presence is what marks a
//! prefix as a complete install; a prefix without one is debris from an
//! interrupted run.

use crate::manifest::Manifest;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// File name of the receipt inside an install prefix.
pub const RECEIPT_FILENAME: &str = "INSTALL_RECEIPT.json";

/// Record of a verified installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Where the source archive came from.
    pub source_url: String,
    /// Verified SHA-256 of the source archive.
    pub sha256: String,
    /// License identifier.
    pub license: String,
    /// Runtime dependencies as `name requirement` strings.
    pub runtime_dependencies: Vec<String>,
    /// Installed binary.
    pub binary: Utf8PathBuf,
    /// First line the binary printed during the smoke test.
    pub reported_version: String,
    /// Seconds since the Unix epoch.
    pub installed_at: u64,
    /// Version of the installer that wrote the receipt.
    pub installer_version: String,
}

impl InstallReceipt {
    /// Build a receipt for `manifest` installed at `binary`.
    #[must_use]
    pub fn new(
        manifest: &Manifest,
        binary: &Utf8Path,
        reported_version: impl Into<String>,
        installed_at: SystemTime,
    ) -> Self {
        Self {
            name: manifest.name().to_string(),
            version: manifest.version().to_owned(),
            source_url: manifest.source_url().to_string(),
            sha256: manifest.checksum().to_string(),
            license: manifest.license().to_owned(),
            runtime_dependencies: manifest
                .runtime_dependencies()
                .iter()
                .map(ToString::to_string)
                .collect(),
            binary: binary.to_owned(),
            reported_version: reported_version.into(),
            installed_at: installed_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs()),
            installer_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Path of the receipt for `prefix`.
#[must_use]
pub fn receipt_path(prefix: &Utf8Path) -> Utf8PathBuf {
    prefix.join(RECEIPT_FILENAME)
}

/// Write `receipt` into `prefix`.
///
/// # Errors
///
/// Returns an I/O error if serialization or the write fails.
pub fn write_receipt(prefix: &Utf8Path, receipt: &InstallReceipt) -> std::io::Result<Utf8PathBuf> {
    let path = receipt_path(prefix);
    let json = serde_json::to_string_pretty(receipt)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Read the receipt in `prefix`, if there is a readable one.
///
/// A missing or unparseable receipt yields `None`: either way the prefix is
/// not a verified install.
#[must_use]
pub fn read_receipt(prefix: &Utf8Path) -> Option<InstallReceipt> {
    let content = std::fs::read_to_string(receipt_path(prefix)).ok()?;
    serde_json::from_str(&content).ok()
}
