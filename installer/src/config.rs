//! Installer settings.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! the `config.toml` file in the platform config directory, and environment
//! variables. Command-line flags are applied on top by the binary.
//!
//! ```toml
//! cellar = "~/pkg/Cellar"
//! fetch_attempts = 5
//! fetch_timeout_secs = 120
//! initial_backoff_millis = 250
//! ```

use crate::dirs::{BaseDirs, config_file, default_cellar};
use crate::error::{InstallerError, Result};
use crate::fetch::download::DOWNLOAD_TIMEOUT;
use crate::fetch::retry::RetryPolicy;
use camino::Utf8PathBuf;
use log::debug;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the cellar directory.
pub const CELLAR_ENV: &str = "FORMULA_INSTALLER_CELLAR";

/// Environment variable overriding the number of fetch attempts.
pub const FETCH_ATTEMPTS_ENV: &str = "FORMULA_INSTALLER_FETCH_ATTEMPTS";

const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    cellar: Option<String>,
    fetch_attempts: Option<u32>,
    fetch_timeout_secs: Option<u64>,
    initial_backoff_millis: Option<u64>,
}

/// Effective installer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the `<name>/<version>` install prefixes, if configured.
    pub cellar: Option<Utf8PathBuf>,
    /// Download attempts before giving up.
    pub fetch_attempts: u32,
    /// HTTP timeout per attempt.
    pub fetch_timeout: Duration,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cellar: None,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_timeout: DOWNLOAD_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl Settings {
    /// Parse a settings file, expanding a leading `~/` in `cellar`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] for malformed TOML or unknown keys.
    pub fn parse(text: &str, dirs: &dyn BaseDirs) -> Result<Self> {
        let raw: RawSettings = toml::from_str(text).map_err(|err| InstallerError::Config {
            reason: err.to_string().trim().to_owned(),
        })?;
        let defaults = Self::default();
        Ok(Self {
            cellar: raw.cellar.map(|value| expand_home(&value, dirs)).transpose()?,
            fetch_attempts: raw.fetch_attempts.unwrap_or(defaults.fetch_attempts),
            fetch_timeout: raw
                .fetch_timeout_secs
                .map_or(defaults.fetch_timeout, Duration::from_secs),
            initial_backoff: raw
                .initial_backoff_millis
                .map_or(defaults.initial_backoff, Duration::from_millis),
        })
    }

    /// Load the settings file (if any) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] for an unreadable or malformed
    /// settings file or an invalid environment override.
    pub fn load(dirs: &dyn BaseDirs) -> Result<Self> {
        let path = config_file(dirs);
        let mut settings = match path.as_deref().filter(|candidate| candidate.is_file()) {
            Some(file) => Self::load_file(file, dirs)?,
            None => Self::default(),
        };
        settings.apply_env(dirs)?;
        Ok(settings)
    }

    /// Load settings from an explicit file without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if the file cannot be read or parsed.
    pub fn load_file(path: &Path, dirs: &dyn BaseDirs) -> Result<Self> {
        debug!("reading settings from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|err| InstallerError::Config {
            reason: format!("cannot read {}: {err}", path.display()),
        })?;
        Self::parse(&text, dirs)
    }

    /// Apply `FORMULA_INSTALLER_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if an override cannot be parsed.
    pub fn apply_env(&mut self, dirs: &dyn BaseDirs) -> Result<()> {
        if let Some(cellar) = std::env::var(CELLAR_ENV).ok().filter(|v| !v.is_empty()) {
            self.cellar = Some(expand_home(&cellar, dirs)?);
        }
        if let Ok(attempts) = std::env::var(FETCH_ATTEMPTS_ENV) {
            self.fetch_attempts = attempts
                .trim()
                .parse()
                .map_err(|err| InstallerError::Config {
                    reason: format!("{FETCH_ATTEMPTS_ENV}={attempts}: {err}"),
                })?;
        }
        Ok(())
    }

    /// The configured cellar, falling back to the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] when neither is available.
    pub fn resolve_cellar(&self, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
        self.cellar
            .clone()
            .or_else(|| default_cellar(dirs))
            .ok_or_else(|| InstallerError::Config {
                reason: format!(
                    "cannot determine a cellar directory; set {CELLAR_ENV} or pass --cellar"
                ),
            })
    }

    /// Retry policy for source downloads.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_attempts, self.initial_backoff)
    }
}

fn expand_home(value: &str, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    let Some(rest) = value.strip_prefix("~/") else {
        return Ok(Utf8PathBuf::from(value));
    };
    let home = dirs
        .home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .ok_or_else(|| InstallerError::Config {
            reason: format!("cannot expand `{value}`: home directory unknown"),
        })?;
    Ok(home.join(rest))
}
