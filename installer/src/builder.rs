//! Build orchestration for a verified source archive.
//!
//! [`Builder::install`] is the install step of the pipeline: it checks the
//! build dependencies, unpacks the archive, runs the manifest's build command
//! from the source root with `{prefix}` and `{source}` substituted, and
//! confirms the expected binary landed under `<prefix>/bin`.

use crate::deps::ensure_build_dependencies;
use crate::error::{InstallerError, Result};
use crate::executor::{CommandExecutor, CommandLine, combined_output};
use crate::extraction::{SourceExtractor, source_root};
use crate::manifest::dependency::Dependency;
use crate::manifest::{InstallSpec, PREFIX_TOKEN, SOURCE_TOKEN};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the directory, beside the archive, that receives its contents.
const SOURCE_DIR_NAME: &str = "source";

/// Outcome of a successful [`Builder::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    /// True when the build command exited with status 0.
    pub success: bool,
    /// Where the installed binary lives.
    pub installed_binary_path: Utf8PathBuf,
}

/// What to build and what it should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    /// Build command with substitution tokens.
    pub install: InstallSpec,
    /// File name expected under `<prefix>/bin` once the build finishes.
    pub binary: String,
}

/// Runs the build command for an unpacked source tree.
pub struct Builder<'a> {
    executor: &'a dyn CommandExecutor,
    extractor: &'a dyn SourceExtractor,
    recipe: BuildRecipe,
}

impl<'a> Builder<'a> {
    /// Create a builder that runs commands through `executor` and unpacks
    /// archives with `extractor`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        extractor: &'a dyn SourceExtractor,
        recipe: BuildRecipe,
    ) -> Self {
        Self {
            executor,
            extractor,
            recipe,
        }
    }

    /// Build and install a verified archive into `install_prefix`.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::DependencyUnsatisfied`] when a build dependency is
    ///   missing or too old; nothing is extracted or run.
    /// - [`InstallerError::Extraction`] when the archive cannot be unpacked.
    /// - [`InstallerError::BuildFailed`] when the build command exits
    ///   non-zero, carrying its exit code and captured output.
    /// - [`InstallerError::MissingBinary`] when the build succeeds without
    ///   producing `<prefix>/bin/<binary>`.
    pub fn install(
        &self,
        artifact_path: &Path,
        install_prefix: &Utf8Path,
        build_dependencies: &[Dependency],
    ) -> Result<InstallResult> {
        ensure_build_dependencies(self.executor, build_dependencies)?;
        let source = self.unpack(artifact_path)?;
        self.build(&source, install_prefix)?;
        let installed_binary_path = self.locate_binary(install_prefix)?;
        Ok(InstallResult {
            success: true,
            installed_binary_path,
        })
    }

    /// Extract `artifact_path` beside itself and return the source root.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Extraction`] or [`InstallerError::Io`].
    pub fn unpack(&self, artifact_path: &Path) -> Result<PathBuf> {
        let dest = artifact_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SOURCE_DIR_NAME);
        fs::create_dir_all(&dest)?;
        let entries = self.extractor.extract(artifact_path, &dest)?;
        debug!("extracted {} entries into {}", entries.len(), dest.display());
        Ok(source_root(&dest)?)
    }

    /// Run the build command from `source_root`.
    ///
    /// The prefix directory is created first so build scripts can write into
    /// it directly.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::BuildFailed`] on a non-zero exit.
    pub fn build(&self, source_root: &Path, install_prefix: &Utf8Path) -> Result<()> {
        let command = render_command(&self.recipe.install, install_prefix, source_root)
            .ok_or_else(|| InstallerError::BuildFailed {
                exit_code: None,
                output: "empty build command".to_owned(),
            })?
            .current_dir(source_root);

        fs::create_dir_all(install_prefix)?;
        info!("running `{command}` in {}", source_root.display());
        let output = self.executor.run(&command)?;
        let captured = combined_output(&output);
        if !output.status.success() {
            return Err(InstallerError::BuildFailed {
                exit_code: output.status.code(),
                output: captured,
            });
        }
        debug!("build output:\n{captured}");
        Ok(())
    }

    /// Confirm the build placed the expected binary under the prefix.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::MissingBinary`] if the file is absent.
    pub fn locate_binary(&self, install_prefix: &Utf8Path) -> Result<Utf8PathBuf> {
        let path = binary_path(install_prefix, &self.recipe.binary);
        if path.is_file() {
            Ok(path)
        } else {
            Err(InstallerError::MissingBinary { path })
        }
    }
}

/// Path of `binary` under `<prefix>/bin`.
#[must_use]
pub fn binary_path(install_prefix: &Utf8Path, binary: &str) -> Utf8PathBuf {
    install_prefix
        .join("bin")
        .join(format!("{binary}{}", std::env::consts::EXE_SUFFIX))
}

/// Substitute `{prefix}` and `{source}` in the build command.
///
/// Returns `None` for an empty command.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use formula_installer::builder::render_command;
/// use formula_installer::manifest::InstallSpec;
/// use std::path::Path;
///
/// let command = render_command(
///     &InstallSpec::default(),
///     Utf8Path::new("/opt/cellar/claude-cli/0.1.0"),
///     Path::new("/tmp/src"),
/// )
/// .expect("default command is not empty");
/// assert_eq!(
///     command.to_string(),
///     "cargo install --root /opt/cellar/claude-cli/0.1.0 --path ."
/// );
/// ```
#[must_use]
pub fn render_command(
    install: &InstallSpec,
    install_prefix: &Utf8Path,
    source_root: &Path,
) -> Option<CommandLine> {
    let source = source_root.to_string_lossy();
    let argv: Vec<String> = install
        .command
        .iter()
        .map(|arg| {
            arg.replace(PREFIX_TOKEN, install_prefix.as_str())
                .replace(SOURCE_TOKEN, &source)
        })
        .collect();
    CommandLine::from_argv(&argv)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
