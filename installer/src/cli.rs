//! CLI argument definitions for the formula installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Fetch, verify, build, and smoke-test a package from its manifest.
#[derive(Parser, Debug)]
#[command(name = "formula-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, verify, build, and smoke-test a package from its manifest.\n\n",
    "A manifest names a source archive and its SHA-256 digest, the tools the ",
    "build needs, and the command that builds and installs it. The installer ",
    "downloads the archive, refuses to continue unless the digest matches, ",
    "builds into an isolated prefix, and runs the installed binary with ",
    "--version before declaring success.\n\n",
    "Prefixes live under the cellar as <cellar>/<name>/<version>.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the reference package:\n",
    "    $ formula-installer install packaging/claude-cli.toml\n\n",
    "  Preview without fetching:\n",
    "    $ formula-installer install --dry-run packaging/claude-cli.toml\n\n",
    "  Validate a manifest and probe its dependencies:\n",
    "    $ formula-installer check packaging/claude-cli.toml\n\n",
    "  Compute the digest for a release archive:\n",
    "    $ formula-installer checksum https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz\n\n",
    "ENVIRONMENT:\n",
    "  FORMULA_INSTALLER_CELLAR          Cellar directory\n",
    "  FORMULA_INSTALLER_FETCH_ATTEMPTS  Download attempts before giving up",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install the package described by a manifest.
    Install(InstallArgs),

    /// Validate a manifest and report its dependencies.
    Check(CheckArgs),

    /// Print the SHA-256 digest of a local file or URL.
    Checksum(ChecksumArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// Path to the package manifest.
    #[arg(value_name = "MANIFEST")]
    pub manifest: Utf8PathBuf,

    /// Install into this directory instead of <cellar>/<name>/<version>.
    #[arg(long, value_name = "DIR", conflicts_with = "cellar")]
    pub prefix: Option<Utf8PathBuf>,

    /// Cellar directory [default: from config, then platform data dir].
    #[arg(long, value_name = "DIR")]
    pub cellar: Option<Utf8PathBuf>,

    /// Replace an existing verified install.
    #[arg(long)]
    pub force: bool,

    /// Show the install plan and exit without fetching.
    #[arg(long)]
    pub dry_run: bool,

    /// Download attempts before giving up [default: 3].
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: Option<u32>,

    /// Print the visited pipeline states after the run.
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the check command.
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// Path to the package manifest.
    #[arg(value_name = "MANIFEST")]
    pub manifest: Utf8PathBuf,

    /// Validate only; do not run dependency probes.
    #[arg(long)]
    pub no_probe: bool,
}

/// Arguments for the checksum command.
#[derive(Parser, Debug, Clone)]
pub struct ChecksumArgs {
    /// Local file path or http(s)/file URL.
    #[arg(value_name = "PATH-OR-URL")]
    pub target: String,
}

impl InstallArgs {
    /// Arguments for installing `manifest` with every flag at its default.
    ///
    /// # Examples
    ///
    /// ```
    /// use formula_installer::cli::InstallArgs;
    ///
    /// let args = InstallArgs::for_manifest("packaging/claude-cli.toml");
    /// assert!(!args.force);
    /// assert!(args.prefix.is_none());
    /// ```
    #[must_use]
    pub fn for_manifest(manifest: impl Into<Utf8PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            prefix: None,
            cellar: None,
            force: false,
            dry_run: false,
            attempts: None,
            verbosity: 0,
            quiet: false,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
