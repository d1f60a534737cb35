//! Directory resolution abstraction for platform-specific paths.
//!
//! The cellar (the root holding `<name>/<version>` install prefixes) and the
//! settings file default to the platform data and config directories. Both
//! are reached through [`BaseDirs`] so tests can substitute temporary paths.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Application name used for the platform directories.
const APPLICATION: &str = "formula-installer";

/// Name of the cellar directory inside the data directory.
const CELLAR_DIRNAME: &str = "Cellar";

/// Name of the settings file inside the config directory.
const CONFIG_FILENAME: &str = "config.toml";

/// Platform directory lookups.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Per-user data directory for the installer.
    fn data_dir(&self) -> Option<PathBuf>;

    /// Per-user config directory for the installer.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl SystemBaseDirs {
    fn project_dirs() -> Option<directories_next::ProjectDirs> {
        directories_next::ProjectDirs::from("", "", APPLICATION)
    }
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn data_dir(&self) -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }
}

/// Default cellar: `<data_dir>/Cellar`.
///
/// Returns `None` when the data directory is unknown or not UTF-8.
#[must_use]
pub fn default_cellar(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let data_dir = dirs.data_dir()?;
    Utf8PathBuf::from_path_buf(data_dir.join(CELLAR_DIRNAME)).ok()
}

/// Location of the settings file: `<config_dir>/config.toml`.
#[must_use]
pub fn config_file(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    dirs.config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}
