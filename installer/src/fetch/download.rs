//! Source archive download.
//!
//! Provides a trait-based abstraction for retrieving a manifest's source
//! archive, enabling dependency injection for testing. `http` and `https`
//! URLs go through a shared `ureq` agent; `file` URLs are copied from disk,
//! which is how local release tarballs and test fixtures are installed.

use crate::error::InstallerError;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Network timeout for source downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for downloading a source archive.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```no_run
/// use formula_installer::fetch::download::{ArtefactDownloader, UrlDownloader};
/// use std::path::Path;
/// use url::Url;
///
/// let url = Url::parse("https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz")?;
/// UrlDownloader::default().download(&url, Path::new("/tmp/v0.1.0.tar.gz"))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download `url` into the file at `dest`, replacing it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the resource does not exist,
    /// or the file cannot be written.
    fn download(&self, url: &Url, dest: &Path) -> Result<(), DownloadError>;
}

/// Errors arising from source download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested resource was not found (HTTP 404 or missing file).
    #[error("source not found: {url}")]
    NotFound {
        /// The URL that was requested.
        url: String,
    },

    /// The URL scheme is not one the installer can fetch.
    #[error("unsupported URL scheme `{scheme}` in {url}")]
    UnsupportedScheme {
        /// The URL that was requested.
        url: String,
        /// The rejected scheme.
        scheme: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Convert into an installer error for `url`.
    ///
    /// Transport and write failures become the retryable
    /// [`InstallerError::FetchFailed`]; a missing source or an unsupported
    /// scheme becomes [`InstallerError::SourceUnavailable`], which no retry
    /// can fix.
    #[must_use]
    pub fn into_installer_error(self, url: &Url) -> InstallerError {
        let url = url.to_string();
        match self {
            Self::HttpError { reason, .. } => InstallerError::FetchFailed { url, reason },
            Self::Io(err) => InstallerError::FetchFailed {
                url,
                reason: err.to_string(),
            },
            Self::NotFound { .. } => InstallerError::SourceUnavailable {
                url,
                reason: "not found".to_owned(),
            },
            Self::UnsupportedScheme { scheme, .. } => InstallerError::SourceUnavailable {
                url,
                reason: format!("unsupported URL scheme `{scheme}`"),
            },
        }
    }
}

/// Downloader that dispatches on the URL scheme.
#[derive(Debug, Clone)]
pub struct UrlDownloader {
    timeout: Duration,
}

impl UrlDownloader {
    /// Create a downloader whose HTTP requests give up after `timeout`.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn agent(&self) -> ureq::Agent {
        if self.timeout == DOWNLOAD_TIMEOUT {
            return http_agent().clone();
        }
        build_agent(self.timeout)
    }
}

impl Default for UrlDownloader {
    fn default() -> Self {
        Self::with_timeout(DOWNLOAD_TIMEOUT)
    }
}

impl ArtefactDownloader for UrlDownloader {
    fn download(&self, url: &Url, dest: &Path) -> Result<(), DownloadError> {
        match url.scheme() {
            "http" | "https" => download_to_file(&self.agent(), url.as_str(), dest),
            "file" => copy_local_file(url, dest),
            other => Err(DownloadError::UnsupportedScheme {
                url: url.to_string(),
                scheme: other.to_owned(),
            }),
        }
    }
}

/// Download a URL and write the body to a file.
fn download_to_file(agent: &ureq::Agent, url: &str, dest: &Path) -> Result<(), DownloadError> {
    let response = agent.get(url).call().map_err(|e| map_ureq_error(url, &e))?;
    let mut file = fs::File::create(dest)?;
    let copied = std::io::copy(&mut response.into_body().as_reader(), &mut file);
    if let Err(err) = copied {
        drop(file);
        // The partial file is removed best-effort; the read error is what matters.
        drop(fs::remove_file(dest));
        return Err(DownloadError::HttpError {
            url: url.to_owned(),
            reason: err.to_string(),
        });
    }
    Ok(())
}

fn copy_local_file(url: &Url, dest: &Path) -> Result<(), DownloadError> {
    let not_found = || DownloadError::NotFound {
        url: url.to_string(),
    };
    let source = url.to_file_path().map_err(|()| not_found())?;
    if !source.is_file() {
        return Err(not_found());
    }
    fs::copy(&source, dest)?;
    Ok(())
}

/// Shared `ureq` agent with the default request timeout.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| build_agent(DOWNLOAD_TIMEOUT))
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = ureq::Error::StatusCode(404);
        let mapped = map_ureq_error("https://example.test/v0.1.0.tar.gz", &err);
        assert!(matches!(mapped, DownloadError::NotFound { .. }));
    }

    #[test]
    fn map_ureq_error_maps_other_status_to_http_error() {
        let err = ureq::Error::StatusCode(500);
        let mapped = map_ureq_error("https://example.test/v0.1.0.tar.gz", &err);
        assert!(matches!(mapped, DownloadError::HttpError { .. }));
    }

    #[rstest]
    fn copies_file_urls(temp_dir: TempDir) {
        let source = temp_dir.path().join("src.tar.gz");
        fs::write(&source, b"archive bytes").expect("write source");
        let url = Url::from_file_path(&source).expect("absolute path");
        let dest = temp_dir.path().join("dest.tar.gz");

        UrlDownloader::default()
            .download(&url, &dest)
            .expect("file download");

        assert_eq!(fs::read(&dest).expect("read dest"), b"archive bytes");
    }

    #[rstest]
    fn missing_file_url_is_not_found(temp_dir: TempDir) {
        let url = Url::from_file_path(temp_dir.path().join("absent.tar.gz")).expect("absolute");
        let result = UrlDownloader::default().download(&url, &temp_dir.path().join("dest"));
        assert!(matches!(result, Err(DownloadError::NotFound { .. })));
    }

    #[rstest]
    fn rejects_unsupported_schemes(temp_dir: TempDir) {
        let url = Url::parse("ftp://example.test/src.tar.gz").expect("valid url");
        let result = UrlDownloader::default().download(&url, &temp_dir.path().join("dest"));
        assert!(matches!(
            result,
            Err(DownloadError::UnsupportedScheme { ref scheme, .. }) if scheme == "ftp"
        ));
    }

    #[test]
    fn missing_source_is_unavailable_not_retryable() {
        let url = Url::parse("https://example.test/src.tar.gz").expect("valid url");
        let err = DownloadError::NotFound {
            url: url.to_string(),
        }
        .into_installer_error(&url);
        assert!(!err.is_retryable());
        match err {
            InstallerError::SourceUnavailable { url: missing, reason } => {
                assert_eq!(missing, "https://example.test/src.tar.gz");
                assert_eq!(reason, "not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transport_error_stays_retryable() {
        let url = Url::parse("https://example.test/src.tar.gz").expect("valid url");
        let err = DownloadError::HttpError {
            url: url.to_string(),
            reason: "connection reset".to_owned(),
        }
        .into_installer_error(&url);
        assert!(err.is_retryable());
        assert!(matches!(err, InstallerError::FetchFailed { .. }));
    }
}
