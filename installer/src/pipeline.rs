//! Install pipeline orchestration.
//!
//! An install is a linear state machine:
//!
//! ```text
//! Pending → Fetched → ChecksumVerified → Built → Installed → Verified
//!                         ↘ Failed { stage, reason } from any transition
//! ```
//!
//! Each run gets its own temporary workspace, removed on every exit path.
//! The install prefix is guarded by an exclusive lock on `<prefix>.lock`,
//! and the lock file is deleted again when the run ends. Nothing is written
//! to the prefix until the checksum has been verified, so a failed download
//! leaves a previous install untouched. Once
//! the build has started, any failure removes the prefix again so no partial
//! install is left behind. The receipt is only written after the smoke test
//! passes.

use crate::builder::{BuildRecipe, Builder};
use crate::cancel::CancellationToken;
use crate::deps::{ensure_build_dependencies, warn_on_runtime_dependencies};
use crate::error::{InstallerError, Result};
use crate::executor::CommandExecutor;
use crate::extraction::SourceExtractor;
use crate::fetch::download::ArtefactDownloader;
use crate::fetch::retry::RetryPolicy;
use crate::fetch::{fetch_with_retry, verify_checksum};
use crate::manifest::Manifest;
use crate::output::write_stderr_line;
use crate::receipt::{InstallReceipt, read_receipt, write_receipt};
use crate::smoke::verify_installation;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{info, warn};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Prefix for temporary workspace directory names.
const WORKSPACE_PREFIX: &str = "formula-installer-";

/// A pipeline step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Downloading the source archive.
    Fetch,
    /// Comparing the archive digest with the manifest.
    Checksum,
    /// Checking build dependencies, unpacking, and running the build command.
    Build,
    /// Confirming the binary landed in the prefix.
    Install,
    /// Running the smoke test and recording the receipt.
    Verify,
}

impl Stage {
    /// Lowercase label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Checksum => "checksum",
            Self::Build => "build",
            Self::Install => "install",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a pipeline run currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has happened yet.
    Pending,
    /// The source archive is in the workspace.
    Fetched,
    /// The archive matches the manifest digest.
    ChecksumVerified,
    /// The build command exited successfully.
    Built,
    /// The binary is present in the prefix.
    Installed,
    /// The smoke test passed and the receipt is written.
    Verified,
    /// A stage failed; the run is over.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// Human-readable cause.
        reason: String,
    },
}

impl PipelineState {
    /// The stage that moves the pipeline out of this state, if any.
    #[must_use]
    pub const fn next_stage(&self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Stage::Fetch),
            Self::Fetched => Some(Stage::Checksum),
            Self::ChecksumVerified => Some(Stage::Build),
            Self::Built => Some(Stage::Install),
            Self::Installed => Some(Stage::Verify),
            Self::Verified | Self::Failed { .. } => None,
        }
    }

    /// The state reached when `stage` succeeds.
    #[must_use]
    pub const fn after(stage: Stage) -> Self {
        match stage {
            Stage::Fetch => Self::Fetched,
            Stage::Checksum => Self::ChecksumVerified,
            Stage::Build => Self::Built,
            Stage::Install => Self::Installed,
            Stage::Verify => Self::Verified,
        }
    }

    /// Return true for `Verified` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.next_stage().is_none()
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fetched => f.write_str("fetched"),
            Self::ChecksumVerified => f.write_str("checksum verified"),
            Self::Built => f.write_str("built"),
            Self::Installed => f.write_str("installed"),
            Self::Verified => f.write_str("verified"),
            Self::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Install prefix, normally `<cellar>/<name>/<version>`.
    pub prefix: Utf8PathBuf,
    /// Replace an existing verified install.
    pub force: bool,
    /// Fetch retry policy.
    pub retry: RetryPolicy,
    /// Directory in which to create the temporary workspace; the system
    /// temporary directory when `None`.
    pub workspace_root: Option<PathBuf>,
    /// Suppress progress lines.
    pub quiet: bool,
}

impl PipelineOptions {
    /// Options for installing into `prefix` with defaults elsewhere.
    #[must_use]
    pub fn new(prefix: impl Into<Utf8PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            force: false,
            retry: RetryPolicy::default(),
            workspace_root: None,
            quiet: false,
        }
    }
}

/// Install prefix for `manifest` under `cellar`.
#[must_use]
pub fn prefix_for(cellar: &Utf8Path, manifest: &Manifest) -> Utf8PathBuf {
    cellar
        .join(manifest.name().as_str())
        .join(manifest.version())
}

/// Path of the lock file guarding `prefix`.
#[must_use]
pub fn lock_path(prefix: &Utf8Path) -> Utf8PathBuf {
    let mut path = prefix.as_str().to_owned();
    path.push_str(".lock");
    Utf8PathBuf::from(path)
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Install prefix.
    pub prefix: Utf8PathBuf,
    /// Installed binary.
    pub binary: Utf8PathBuf,
    /// Version line printed by the smoke test.
    pub reported_version: String,
    /// Receipt location.
    pub receipt: Utf8PathBuf,
    /// States visited, ending in `Verified`.
    pub history: Vec<PipelineState>,
}

/// A run that did not reach `Verified`.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Failing stage, or `None` when the run stopped before fetching (lock
    /// contention, an existing install, an unusable prefix).
    pub stage: Option<Stage>,
    /// Underlying error.
    pub error: InstallerError,
    /// States visited, ending in `Failed` when `stage` is set.
    pub history: Vec<PipelineState>,
}

impl PipelineFailure {
    /// Wrap an error raised before the pipeline could start.
    ///
    /// An unusable checksum is attributed to the checksum stage, since no
    /// archive can ever be verified against it; other errors have no stage.
    #[must_use]
    pub fn before_start(error: InstallerError) -> Self {
        if !matches!(error, InstallerError::InvalidChecksum { .. }) {
            return Self {
                stage: None,
                error,
                history: Vec::new(),
            };
        }
        let failed = PipelineState::Failed {
            stage: Stage::Checksum,
            reason: error.to_string(),
        };
        Self {
            stage: Some(Stage::Checksum),
            error,
            history: vec![PipelineState::Pending, failed],
        }
    }

    /// Return true when the run was cancelled.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.error, InstallerError::Interrupted)
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{stage} stage failed: {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl From<InstallerError> for PipelineFailure {
    fn from(error: InstallerError) -> Self {
        Self::before_start(error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drives one package through the install state machine.
pub struct InstallPipeline<'a> {
    downloader: &'a dyn ArtefactDownloader,
    extractor: &'a dyn SourceExtractor,
    executor: &'a dyn CommandExecutor,
    cancel: CancellationToken,
    sleep: fn(Duration),
}

impl<'a> InstallPipeline<'a> {
    /// Create a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        downloader: &'a dyn ArtefactDownloader,
        extractor: &'a dyn SourceExtractor,
        executor: &'a dyn CommandExecutor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            downloader,
            extractor,
            executor,
            cancel,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the function used to wait between fetch attempts.
    #[must_use]
    pub const fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Install `manifest` according to `options`.
    ///
    /// Progress lines go to `stderr` unless `options.quiet` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the failing stage, the error, and
    /// the states visited.
    pub fn run(
        &self,
        manifest: &Manifest,
        options: &PipelineOptions,
        stderr: &mut dyn Write,
    ) -> std::result::Result<InstallReport, PipelineFailure> {
        let mut run = Run::new(&self.cancel, options.quiet);
        let prefix = options.prefix.as_path();

        let _lock = run.preflight(|| prepare_prefix(manifest, options))?;
        let workspace = run.preflight(|| create_workspace(options))?;

        run.progress(stderr, format!("==> Fetching {}", manifest.source_url()));
        let archive = run.stage(Stage::Fetch, || {
            fetch_with_retry(
                self.downloader,
                manifest.source_url(),
                workspace.path(),
                &options.retry,
                &self.sleep,
                &|| self.cancel.check(),
            )
        })?;

        run.stage(Stage::Checksum, || {
            verify_checksum(&archive, manifest.checksum())
        })?;

        let mut cleanup = PrefixCleanup::new(prefix);
        let builder = Builder::new(
            self.executor,
            self.extractor,
            BuildRecipe {
                install: manifest.install().clone(),
                binary: manifest.smoke_test().binary.clone(),
            },
        );

        run.progress(stderr, format!("==> Building {}", manifest.summary_line()));
        run.stage(Stage::Build, || {
            ensure_build_dependencies(self.executor, manifest.build_dependencies())?;
            clear_prefix(prefix)?;
            cleanup.arm();
            let source = builder.unpack(&archive)?;
            builder.build(&source, prefix)
        })?;

        let binary = run.stage(Stage::Install, || {
            let binary = builder.locate_binary(prefix)?;
            warn_on_runtime_dependencies(self.executor, manifest.runtime_dependencies());
            Ok(binary)
        })?;

        run.progress(stderr, format!("==> Verifying {binary}"));
        let (reported_version, receipt) = run.stage(Stage::Verify, || {
            let reported =
                verify_installation(self.executor, &binary, &manifest.smoke_test().args)?;
            let receipt = InstallReceipt::new(manifest, &binary, reported.clone(), SystemTime::now());
            let path = write_receipt(prefix, &receipt)?;
            Ok((reported, path))
        })?;

        cleanup.disarm();
        info!("installed {} into {prefix}", manifest.summary_line());
        Ok(InstallReport {
            prefix: prefix.to_owned(),
            binary,
            reported_version,
            receipt,
            history: run.history,
        })
    }
}

/// State history and cancellation checkpoints for a single run.
struct Run<'r> {
    cancel: &'r CancellationToken,
    quiet: bool,
    history: Vec<PipelineState>,
}

impl<'r> Run<'r> {
    fn new(cancel: &'r CancellationToken, quiet: bool) -> Self {
        Self {
            cancel,
            quiet,
            history: vec![PipelineState::Pending],
        }
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, message);
        }
    }

    fn preflight<T>(
        &self,
        step: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<T, PipelineFailure> {
        step().map_err(|error| PipelineFailure {
            stage: None,
            error,
            history: self.history.clone(),
        })
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        step: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<T, PipelineFailure> {
        match self.cancel.check().and_then(|()| step()) {
            Ok(value) => {
                let reached = PipelineState::after(stage);
                info!("pipeline state: {reached}");
                self.history.push(reached);
                Ok(value)
            }
            Err(error) => {
                warn!("{stage} stage failed: {error}");
                self.history.push(PipelineState::Failed {
                    stage,
                    reason: error.to_string(),
                });
                Err(PipelineFailure {
                    stage: Some(stage),
                    error,
                    history: self.history.clone(),
                })
            }
        }
    }
}

/// Exclusive lock on `<prefix>.lock`. On drop the file is deleted while the
/// lock is still held, then the lock is released.
#[derive(Debug)]
struct PrefixLock {
    file: File,
    path: Utf8PathBuf,
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!("failed to remove prefix lock {}: {err}", self.path);
            }
        }
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("failed to release prefix lock: {err}");
        }
    }
}

/// Return true when `path` still names the file behind `held`.
///
/// A run that finishes deletes its lock file before unlocking, so a waiter
/// that opened the old file can win the lock on an unlinked inode.
#[cfg(unix)]
fn lock_file_is_current(held: &File, path: &Utf8Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held_meta = held.metadata()?;
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.dev() == held_meta.dev() && meta.ino() == held_meta.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn lock_file_is_current(_held: &File, path: &Utf8Path) -> std::io::Result<bool> {
    Ok(path.exists())
}

/// Removes the prefix on drop while armed.
struct PrefixCleanup<'p> {
    prefix: &'p Utf8Path,
    armed: bool,
}

impl<'p> PrefixCleanup<'p> {
    const fn new(prefix: &'p Utf8Path) -> Self {
        Self {
            prefix,
            armed: false,
        }
    }

    const fn arm(&mut self) {
        self.armed = true;
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PrefixCleanup<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.prefix.exists() {
            return;
        }
        info!("removing partial install at {}", self.prefix);
        if let Err(err) = fs::remove_dir_all(self.prefix) {
            warn!("failed to remove partial install at {}: {err}", self.prefix);
        }
    }
}

/// Lock the prefix and refuse to replace a verified install without `force`.
///
/// Existing contents are left alone here; they are only removed once the
/// new archive has passed its checksum.
fn prepare_prefix(manifest: &Manifest, options: &PipelineOptions) -> Result<PrefixLock> {
    let prefix = options.prefix.as_path();
    if let Some(parent) = prefix.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_file = lock_path(prefix);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_file)?;
    if FileExt::try_lock_exclusive(&file).is_err() || !lock_file_is_current(&file, &lock_file)? {
        return Err(InstallerError::Locked { path: lock_file });
    }
    let lock = PrefixLock {
        file,
        path: lock_file,
    };

    if !options.force && read_receipt(prefix).is_some() {
        return Err(InstallerError::AlreadyInstalled {
            name: manifest.name().to_string(),
            version: manifest.version().to_owned(),
            prefix: prefix.to_owned(),
        });
    }
    Ok(lock)
}

/// Remove a previous install or the debris of an interrupted one.
fn clear_prefix(prefix: &Utf8Path) -> Result<()> {
    if prefix.exists() {
        info!("removing previous contents of {prefix}");
        fs::remove_dir_all(prefix)?;
    }
    Ok(())
}

fn create_workspace(options: &PipelineOptions) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKSPACE_PREFIX);
    let workspace = match &options.workspace_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    Ok(workspace)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
