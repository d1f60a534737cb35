//! Output formatting for the installer CLI.
//!
//! Progress, results, and dry-run plans are rendered here as plain text and
//! written to an injected stream so the binary and the tests see the same
//! output.

use crate::deps::DependencyCheck;
use crate::manifest::Manifest;
use crate::pipeline::{InstallReport, PipelineFailure, PipelineState};
use camino::Utf8Path;
use std::io::Write;

/// Write `message` and a newline to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Format a success message after installation.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use formula_installer::output::success_message;
/// use formula_installer::pipeline::{InstallReport, PipelineState};
///
/// let report = InstallReport {
///     prefix: Utf8PathBuf::from("/opt/cellar/claude-cli/0.1.0"),
///     binary: Utf8PathBuf::from("/opt/cellar/claude-cli/0.1.0/bin/claude"),
///     reported_version: "claude 0.1.0".to_owned(),
///     receipt: Utf8PathBuf::from("/opt/cellar/claude-cli/0.1.0/INSTALL_RECEIPT.json"),
///     history: vec![PipelineState::Pending, PipelineState::Verified],
/// };
///
/// let message = success_message(&report);
/// assert!(message.contains("claude 0.1.0"));
/// assert!(message.contains("/opt/cellar/claude-cli/0.1.0"));
/// ```
#[must_use]
pub fn success_message(report: &InstallReport) -> String {
    format!(
        "Installed {} into {} ({})",
        report.binary.file_name().unwrap_or(report.binary.as_str()),
        report.prefix,
        report.reported_version
    )
}

/// Format the terminal error line for a failed run.
#[must_use]
pub fn failure_message(failure: &PipelineFailure) -> String {
    format!("error: {failure}")
}

/// Format the visited pipeline states on one line.
///
/// # Example
///
/// ```
/// use formula_installer::output::state_trail;
/// use formula_installer::pipeline::PipelineState;
///
/// let trail = state_trail(&[PipelineState::Pending, PipelineState::Fetched]);
/// assert_eq!(trail, "states: pending -> fetched");
/// ```
#[must_use]
pub fn state_trail(history: &[PipelineState]) -> String {
    let states: Vec<String> = history.iter().map(ToString::to_string).collect();
    format!("states: {}", states.join(" -> "))
}

/// Format the dependency lines printed by `check` and dry runs.
#[must_use]
pub fn dependency_report(checks: &[DependencyCheck]) -> String {
    if checks.is_empty() {
        return "  (no dependencies)".to_owned();
    }
    checks
        .iter()
        .map(|check| format!("  {check}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a manifest summary for the `check` subcommand.
#[must_use]
pub fn manifest_report(manifest: &Manifest, checks: &[DependencyCheck]) -> String {
    let mut lines = vec![
        manifest.summary_line(),
        format!("Source: {}", manifest.source_url()),
        format!("SHA-256: {}", manifest.checksum()),
        format!("License: {}", manifest.license()),
    ];
    if let Some(homepage) = manifest.homepage() {
        lines.push(format!("Homepage: {homepage}"));
    }
    lines.push(format!("Install: {}", manifest.install().command.join(" ")));
    lines.push(format!("Binary: {}", manifest.smoke_test().binary));
    lines.push(String::new());
    lines.push("Dependencies:".to_owned());
    lines.push(dependency_report(checks));
    lines.join("\n")
}

/// Configuration information for dry-run output.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use formula_installer::manifest::parser::parse_manifest;
/// use formula_installer::output::DryRunInfo;
///
/// let manifest = parse_manifest(&format!(
///     concat!(
///         "name = \"claude-cli\"\n",
///         "version = \"0.1.0\"\n",
///         "url = \"https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz\"\n",
///         "sha256 = \"{}\"\n",
///         "license = \"MIT\"\n",
///     ),
///     "a".repeat(64)
/// ))?;
/// let prefix = Utf8PathBuf::from("/opt/cellar/claude-cli/0.1.0");
///
/// let info = DryRunInfo {
///     manifest: &manifest,
///     prefix: &prefix,
///     force: false,
///     fetch_attempts: 3,
///     checks: &[],
/// };
///
/// let output = info.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("claude-cli 0.1.0"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Package to install.
    pub manifest: &'a Manifest,
    /// Resolved install prefix.
    pub prefix: &'a Utf8Path,
    /// Whether an existing install would be replaced.
    pub force: bool,
    /// Download attempts.
    pub fetch_attempts: u32,
    /// Dependency probe results.
    pub checks: &'a [DependencyCheck],
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let lines = [
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Package: {}", self.manifest.summary_line()),
            format!("Source: {}", self.manifest.source_url()),
            format!("Expected SHA-256: {}", self.manifest.checksum()),
            format!("Install prefix: {}", self.prefix),
            format!("Fetch attempts: {}", self.fetch_attempts),
            format!("Force: {}", self.force),
            String::new(),
            "Dependencies:".to_owned(),
            dependency_report(self.checks),
        ];
        lines.join("\n")
    }
}
