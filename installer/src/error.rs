//! Error types for the formula installer.
//!
//! This module defines the failure taxonomy of the install pipeline. Every
//! variant carries the underlying cause (URL, hash values, exit code,
//! captured output, missing dependency) so it can be reported to the
//! operator verbatim.

use crate::extraction::ExtractionError;
use crate::manifest::error::ManifestError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur during the installation process.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The source archive could not be downloaded.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        /// The URL that was requested.
        url: String,
        /// Transport-level description of the failure.
        reason: String,
    },

    /// The source archive does not exist at its URL or cannot be fetched
    /// by any transport the installer supports.
    #[error("source unavailable at {url}: {reason}")]
    SourceUnavailable {
        /// The URL that was requested.
        url: String,
        /// Why the source cannot be fetched.
        reason: String,
    },

    /// The downloaded archive does not hash to the manifest's digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest of the downloaded bytes.
        actual: String,
    },

    /// The expected checksum is a placeholder or not a SHA-256 hex digest.
    #[error("invalid checksum \"{value}\": {reason}")]
    InvalidChecksum {
        /// The rejected checksum value.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A declared dependency is missing or too old.
    #[error("dependency {name} ({requirement}) unsatisfied: {found}")]
    DependencyUnsatisfied {
        /// Dependency name.
        name: String,
        /// Version requirement from the manifest.
        requirement: String,
        /// What the probe found instead.
        found: String,
    },

    /// The external build command exited unsuccessfully.
    #[error("build command {}: {output}", describe_exit(.exit_code))]
    BuildFailed {
        /// Exit code, or `None` when terminated by a signal.
        exit_code: Option<i32>,
        /// Captured standard output and standard error.
        output: String,
    },

    /// The build succeeded but did not place the expected binary.
    #[error("build succeeded but {path} was not installed")]
    MissingBinary {
        /// Where the binary was expected.
        path: Utf8PathBuf,
    },

    /// The installed binary failed its smoke test.
    #[error("smoke test of {path} failed: {reason}")]
    VerificationFailed {
        /// Binary under test.
        path: Utf8PathBuf,
        /// Exit status or spawn error.
        reason: String,
    },

    /// The manifest file does not exist.
    #[error("manifest not found at {path}")]
    ManifestNotFound {
        /// Path that was requested.
        path: Utf8PathBuf,
    },

    /// The manifest could not be parsed or failed validation.
    #[error("invalid manifest {path}: {source}")]
    InvalidManifest {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying validation failure.
        #[source]
        source: ManifestError,
    },

    /// The source archive could not be unpacked.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// This version is already installed and verified.
    #[error("{name} {version} is already installed at {prefix}; use --force to reinstall")]
    AlreadyInstalled {
        /// Package name.
        name: String,
        /// Package version.
        version: String,
        /// Existing install prefix.
        prefix: Utf8PathBuf,
    },

    /// Another installer holds the prefix lock.
    #[error("another installation is in progress (lock held on {path})")]
    Locked {
        /// Lock file path.
        path: Utf8PathBuf,
    },

    /// The pipeline was cancelled between stages.
    #[error("interrupted")]
    Interrupted,

    /// Installer configuration is invalid.
    #[error("configuration error: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl InstallerError {
    /// Convert a manifest validation error, promoting checksum problems.
    ///
    /// Placeholder and malformed digests surface as
    /// [`InstallerError::InvalidChecksum`] so that they read as a checksum
    /// failure rather than a generic schema error.
    #[must_use]
    pub fn from_manifest(path: &camino::Utf8Path, source: ManifestError) -> Self {
        match source {
            ManifestError::InvalidChecksum { value, reason } => {
                Self::InvalidChecksum { value, reason }
            }
            other => Self::InvalidManifest {
                path: path.to_owned(),
                source: other,
            },
        }
    }

    /// Return true when retrying the operation may succeed.
    ///
    /// Only transport failures qualify. A missing source, checksum, build,
    /// and verification failures are deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(
        || "was terminated by a signal".to_owned(),
        |code| format!("exited with status {code}"),
    )
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
