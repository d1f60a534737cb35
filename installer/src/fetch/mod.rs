//! Source retrieval and integrity verification.
//!
//! The source archive named by a manifest is downloaded into the run's
//! temporary workspace and hashed before anything else touches it. A digest
//! mismatch is fatal: the downloaded file is deleted so no unverified
//! artefact outlives the check.
//!
//! # Sub-modules
//!
//! - [`download`] - `ArtefactDownloader` trait and URL-scheme dispatch.
//! - [`retry`] - bounded retry with exponential backoff.

pub mod download;
pub mod retry;

use crate::error::{InstallerError, Result};
use crate::manifest::checksum::Sha256Digest;
use crate::manifest::error::ManifestError;
use download::ArtefactDownloader;
use log::{debug, info};
use retry::RetryPolicy;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// File name used when the URL path has no usable last segment.
const FALLBACK_ARCHIVE_NAME: &str = "source.archive";

/// Compute the lowercase hex SHA-256 of a file.
///
/// # Errors
///
/// Returns any I/O error raised while reading the file.
pub fn compute_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Validate an expected checksum string before any download starts.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidChecksum`] for placeholders and anything
/// that is not a 64-character hex digest.
pub fn parse_expected_checksum(expected: &str) -> Result<Sha256Digest> {
    Sha256Digest::try_from(expected).map_err(|err| match err {
        ManifestError::InvalidChecksum { value, reason } => {
            InstallerError::InvalidChecksum { value, reason }
        }
        other => InstallerError::InvalidChecksum {
            value: expected.to_owned(),
            reason: other.to_string(),
        },
    })
}

/// Local file name for the archive downloaded from `url`.
///
/// # Examples
///
/// ```
/// use formula_installer::fetch::archive_file_name;
/// use url::Url;
///
/// let url = Url::parse("https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz")?;
/// assert_eq!(archive_file_name(&url), "v0.1.0.tar.gz");
/// # Ok::<(), url::ParseError>(())
/// ```
#[must_use]
pub fn archive_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map_or_else(|| FALLBACK_ARCHIVE_NAME.to_owned(), str::to_owned)
}

/// Download `url` into `dest_dir`, returning the local path.
///
/// # Errors
///
/// Returns [`InstallerError::FetchFailed`] on any transport or write error,
/// or [`InstallerError::SourceUnavailable`] when the source does not exist.
pub fn fetch(downloader: &dyn ArtefactDownloader, url: &Url, dest_dir: &Path) -> Result<PathBuf> {
    let dest = dest_dir.join(archive_file_name(url));
    debug!("downloading {url} to {}", dest.display());
    downloader
        .download(url, &dest)
        .map_err(|err| err.into_installer_error(url))?;
    Ok(dest)
}

/// Download with bounded retries on transport failures.
///
/// # Errors
///
/// Returns the last [`InstallerError::FetchFailed`] once every attempt has
/// failed, or the first non-retryable error raised by `before_attempt`.
pub fn fetch_with_retry(
    downloader: &dyn ArtefactDownloader,
    url: &Url,
    dest_dir: &Path,
    policy: &RetryPolicy,
    sleep: &dyn Fn(Duration),
    before_attempt: &dyn Fn() -> Result<()>,
) -> Result<PathBuf> {
    policy.run(
        |attempt| {
            before_attempt()?;
            debug!("fetch attempt {attempt} of {}", policy.attempts());
            fetch(downloader, url, dest_dir)
        },
        sleep,
    )
}

/// Hash `archive` and compare with `expected`.
///
/// On mismatch the archive is deleted before the error is returned.
///
/// # Errors
///
/// Returns [`InstallerError::ChecksumMismatch`] when the digests differ, or
/// [`InstallerError::Io`] if the file cannot be read.
pub fn verify_checksum(archive: &Path, expected: &Sha256Digest) -> Result<()> {
    let actual = compute_sha256(archive)?;
    if expected.matches(&actual) {
        info!("checksum verified: {actual}");
        return Ok(());
    }

    fs::remove_file(archive)?;
    Err(InstallerError::ChecksumMismatch {
        expected: expected.to_string(),
        actual,
    })
}

/// Download `source_url` into `dest_dir` and verify it hashes to
/// `expected_checksum`.
///
/// The checksum is validated before any network access, so a placeholder
/// digest never triggers a download.
///
/// # Errors
///
/// - [`InstallerError::InvalidChecksum`] if `expected_checksum` is a
///   placeholder or not a SHA-256 hex digest.
/// - [`InstallerError::FetchFailed`] if the download fails.
/// - [`InstallerError::ChecksumMismatch`] if the downloaded bytes hash to a
///   different digest; the file is removed.
///
/// # Examples
///
/// ```no_run
/// use formula_installer::fetch::{download::UrlDownloader, fetch_and_verify};
/// use url::Url;
///
/// let url = Url::parse("https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz")?;
/// let workspace = tempfile::tempdir()?;
/// let archive = fetch_and_verify(
///     &UrlDownloader::default(),
///     &url,
///     "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
///     workspace.path(),
/// )?;
/// println!("verified {}", archive.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn fetch_and_verify(
    downloader: &dyn ArtefactDownloader,
    source_url: &Url,
    expected_checksum: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let expected = parse_expected_checksum(expected_checksum)?;
    let archive = fetch(downloader, source_url, dest_dir)?;
    verify_checksum(&archive, &expected)?;
    Ok(archive)
}
