//! Formula installer CLI entrypoint.
//!
//! This binary installs the package described by a manifest, validates
//! manifests, and computes the digests maintainers record in them. Progress
//! and errors go to stderr; `check` and `checksum` results go to stdout.

use camino::Utf8PathBuf;
use clap::Parser;
use formula_installer::cancel::install_signal_handlers;
use formula_installer::cli::{CheckArgs, ChecksumArgs, Cli, Command, InstallArgs};
use formula_installer::config::Settings;
use formula_installer::deps::{DependencyCheck, check_dependencies};
use formula_installer::dirs::{BaseDirs, SystemBaseDirs};
use formula_installer::error::{InstallerError, Result};
use formula_installer::executor::{CommandExecutor, SystemCommandExecutor};
use formula_installer::extraction::ArchiveExtractor;
use formula_installer::fetch::download::{ArtefactDownloader, UrlDownloader};
use formula_installer::fetch::{compute_sha256, fetch};
use formula_installer::manifest::Manifest;
use formula_installer::manifest::dependency::DependencyKind;
use formula_installer::manifest::parser::load_manifest;
use formula_installer::output::{
    DryRunInfo, failure_message, manifest_report, state_trail, success_message,
    write_stderr_line,
};
use formula_installer::pipeline::{
    InstallPipeline, PipelineFailure, PipelineOptions, prefix_for,
};
use std::io::Write;
use std::path::Path;
use url::Url;

/// Exit status for a run stopped by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: i32 = 130;

type RunResult = std::result::Result<(), PipelineFailure>;

fn main() {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &SystemBaseDirs, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(
    cli: &Cli,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> RunResult {
    match &cli.command {
        Command::Install(args) => run_install(args, dirs, stderr),
        Command::Check(args) => {
            run_check(args, &SystemCommandExecutor, stdout).map_err(without_stage)
        }
        Command::Checksum(args) => {
            run_checksum(args, &UrlDownloader::default(), stdout).map_err(without_stage)
        }
    }
}

fn run_install(args: &InstallArgs, dirs: &dyn BaseDirs, stderr: &mut dyn Write) -> RunResult {
    // A placeholder digest surfaces here as a checksum stage failure.
    let manifest = load_manifest(&args.manifest)?;
    let settings = effective_settings(args, dirs)?;
    let prefix = resolve_prefix(args, &settings, dirs, &manifest)?;
    let executor = SystemCommandExecutor;

    if args.dry_run {
        let checks = probe_dependencies(&executor, &manifest);
        let info = DryRunInfo {
            manifest: &manifest,
            prefix: &prefix,
            force: args.force,
            fetch_attempts: settings.fetch_attempts,
            checks: &checks,
        };
        write_stderr_line(stderr, info.display_text());
        return Ok(());
    }

    let downloader = UrlDownloader::with_timeout(settings.fetch_timeout);
    let pipeline = InstallPipeline::new(
        &downloader,
        &ArchiveExtractor,
        &executor,
        install_signal_handlers(),
    );
    let options = PipelineOptions {
        force: args.force,
        retry: settings.retry_policy(),
        quiet: args.quiet,
        ..PipelineOptions::new(prefix)
    };

    let result = pipeline.run(&manifest, &options, stderr);
    if args.verbosity > 0 {
        let history = match &result {
            Ok(report) => &report.history,
            Err(failure) => &failure.history,
        };
        write_stderr_line(stderr, state_trail(history));
    }
    let report = result?;
    if !args.quiet {
        write_stderr_line(stderr, success_message(&report));
    }
    Ok(())
}

fn run_check(args: &CheckArgs, executor: &dyn CommandExecutor, stdout: &mut dyn Write) -> Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    let checks = if args.no_probe {
        Vec::new()
    } else {
        probe_dependencies(executor, &manifest)
    };
    writeln!(stdout, "{}", manifest_report(&manifest, &checks))?;
    Ok(())
}

fn run_checksum(
    args: &ChecksumArgs,
    downloader: &dyn ArtefactDownloader,
    stdout: &mut dyn Write,
) -> Result<()> {
    let digest = checksum_of(&args.target, downloader)?;
    writeln!(stdout, "{digest}")?;
    Ok(())
}

/// Hash a local file, or download a URL into a scratch directory and hash it.
fn checksum_of(target: &str, downloader: &dyn ArtefactDownloader) -> Result<String> {
    if !target.contains("://") {
        return Ok(compute_sha256(Path::new(target))?);
    }
    let url = Url::parse(target).map_err(|err| InstallerError::SourceUnavailable {
        url: target.to_owned(),
        reason: err.to_string(),
    })?;
    let scratch = tempfile::Builder::new()
        .prefix("formula-installer-")
        .tempdir()?;
    let archive = fetch(downloader, &url, scratch.path())?;
    Ok(compute_sha256(&archive)?)
}

fn effective_settings(args: &InstallArgs, dirs: &dyn BaseDirs) -> Result<Settings> {
    let mut settings = Settings::load(dirs)?;
    if let Some(cellar) = &args.cellar {
        settings.cellar = Some(cellar.clone());
    }
    if let Some(attempts) = args.attempts {
        settings.fetch_attempts = attempts;
    }
    Ok(settings)
}

fn resolve_prefix(
    args: &InstallArgs,
    settings: &Settings,
    dirs: &dyn BaseDirs,
    manifest: &Manifest,
) -> Result<Utf8PathBuf> {
    if let Some(prefix) = &args.prefix {
        return Ok(prefix.clone());
    }
    let cellar = settings.resolve_cellar(dirs)?;
    Ok(prefix_for(&cellar, manifest))
}

fn probe_dependencies(executor: &dyn CommandExecutor, manifest: &Manifest) -> Vec<DependencyCheck> {
    let mut checks = check_dependencies(
        executor,
        DependencyKind::Build,
        manifest.build_dependencies(),
    );
    checks.extend(check_dependencies(
        executor,
        DependencyKind::Runtime,
        manifest.runtime_dependencies(),
    ));
    checks
}

fn without_stage(error: InstallerError) -> PipelineFailure {
    PipelineFailure {
        stage: None,
        error,
        history: Vec::new(),
    }
}

fn exit_code_for_run_result(result: RunResult, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(failure) => {
            write_stderr_line(stderr, failure_message(&failure));
            if failure.is_interrupted() {
                EXIT_INTERRUPTED
            } else {
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula_installer::config::{CELLAR_ENV, FETCH_ATTEMPTS_ENV};
    use formula_installer::pipeline::Stage;
    use formula_installer::test_utils::sha256_hex;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Platform directories rooted in a scratch directory.
    struct ScratchDirs(PathBuf);

    impl BaseDirs for ScratchDirs {
        fn home_dir(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }

        fn data_dir(&self) -> Option<PathBuf> {
            Some(self.0.join("data"))
        }

        fn config_dir(&self) -> Option<PathBuf> {
            Some(self.0.join("config"))
        }
    }

    /// Downloader for tests that must not touch the network.
    struct OfflineDownloader;

    impl ArtefactDownloader for OfflineDownloader {
        fn download(
            &self,
            url: &Url,
            dest: &Path,
        ) -> std::result::Result<(), formula_installer::fetch::download::DownloadError> {
            assert_eq!(url.as_str(), "https://example.com/archive/v0.1.0.tar.gz");
            std::fs::write(dest, b"remote bytes")?;
            Ok(())
        }
    }

    #[fixture]
    fn scratch() -> TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    fn write_manifest(dir: &Path, sha256: &str) -> Utf8PathBuf {
        let path = dir.join("claude-cli.toml");
        let text = format!(
            concat!(
                "name = \"claude-cli\"\n",
                "version = \"0.1.0\"\n",
                "url = \"https://example.com/archive/v0.1.0.tar.gz\"\n",
                "sha256 = \"{}\"\n",
                "license = \"MIT\"\n",
            ),
            sha256
        );
        std::fs::write(&path, text).expect("write manifest");
        Utf8PathBuf::from_path_buf(path).expect("utf-8 temp path")
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_stage_and_returns_one() {
        let failure = PipelineFailure {
            stage: Some(Stage::Build),
            error: InstallerError::BuildFailed {
                exit_code: Some(1),
                output: "missing header".to_owned(),
            },
            history: Vec::new(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(failure), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("error: build stage failed:"));
        assert!(stderr_text.contains("missing header"));
    }

    #[test]
    fn interrupted_run_exits_130() {
        let failure = PipelineFailure {
            stage: Some(Stage::Fetch),
            error: InstallerError::Interrupted,
            history: Vec::new(),
        };
        let mut stderr = Vec::new();
        assert_eq!(exit_code_for_run_result(Err(failure), &mut stderr), 130);
    }

    #[rstest]
    fn checksum_of_local_file(scratch: TempDir) {
        let path = scratch.path().join("archive.tar.gz");
        std::fs::write(&path, b"local bytes").expect("write archive");
        let args = ChecksumArgs {
            target: path.to_string_lossy().into_owned(),
        };

        let mut stdout = Vec::new();
        run_checksum(&args, &OfflineDownloader, &mut stdout).expect("checksum succeeds");

        let printed = String::from_utf8(stdout).expect("utf-8 output");
        assert_eq!(printed.trim(), sha256_hex(b"local bytes"));
    }

    #[test]
    fn checksum_of_url_downloads_first() {
        let digest = checksum_of(
            "https://example.com/archive/v0.1.0.tar.gz",
            &OfflineDownloader,
        )
        .expect("checksum succeeds");
        assert_eq!(digest, sha256_hex(b"remote bytes"));
    }

    #[test]
    fn checksum_of_missing_file_is_io_error() {
        let err = checksum_of("/nonexistent/archive.tar.gz", &OfflineDownloader)
            .expect_err("file is missing");
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[rstest]
    fn check_prints_manifest_summary(scratch: TempDir) {
        let manifest = write_manifest(scratch.path(), &"ab".repeat(32));
        let args = CheckArgs {
            manifest,
            no_probe: true,
        };

        let mut stdout = Vec::new();
        run_check(&args, &SystemCommandExecutor, &mut stdout).expect("valid manifest");

        let printed = String::from_utf8(stdout).expect("utf-8 output");
        assert!(printed.starts_with("claude-cli 0.1.0"));
        assert!(printed.contains("(no dependencies)"));
    }

    #[rstest]
    fn install_with_placeholder_fails_at_checksum_stage(scratch: TempDir) {
        let manifest = write_manifest(scratch.path(), "UPDATE_WITH_ACTUAL_SHA256");
        let dirs = ScratchDirs(scratch.path().to_path_buf());
        let mut stderr = Vec::new();

        let failure = run_install(&InstallArgs::for_manifest(manifest), &dirs, &mut stderr)
            .expect_err("placeholder rejected");

        assert_eq!(failure.stage, Some(Stage::Checksum));
        assert!(matches!(failure.error, InstallerError::InvalidChecksum { .. }));
        assert!(!scratch.path().join("data").exists());
    }

    #[rstest]
    fn dry_run_reports_prefix_under_cellar(scratch: TempDir) {
        let manifest = write_manifest(scratch.path(), &"ab".repeat(32));
        let dirs = ScratchDirs(scratch.path().to_path_buf());
        let args = InstallArgs {
            dry_run: true,
            ..InstallArgs::for_manifest(manifest)
        };
        let mut stderr = Vec::new();

        temp_env::with_vars(
            [
                (CELLAR_ENV, None::<&str>),
                (FETCH_ATTEMPTS_ENV, None::<&str>),
            ],
            || run_install(&args, &dirs, &mut stderr),
        )
        .expect("dry run succeeds");

        let printed = String::from_utf8(stderr).expect("utf-8 output");
        let expected_prefix = scratch.path().join("data/Cellar/claude-cli/0.1.0");
        assert!(printed.contains("Dry run"));
        assert!(printed.contains(&format!("Install prefix: {}", expected_prefix.display())));
        assert!(!expected_prefix.exists());
    }

    #[rstest]
    fn cli_flags_override_settings(scratch: TempDir) {
        let dirs = ScratchDirs(scratch.path().to_path_buf());
        let args = InstallArgs {
            cellar: Some(Utf8PathBuf::from("/srv/Cellar")),
            attempts: Some(7),
            ..InstallArgs::for_manifest("unused.toml")
        };

        let settings = temp_env::with_vars(
            [
                (CELLAR_ENV, Some("/env/Cellar")),
                (FETCH_ATTEMPTS_ENV, Some("2")),
            ],
            || effective_settings(&args, &dirs),
        )
        .expect("settings load");

        assert_eq!(settings.cellar, Some(Utf8PathBuf::from("/srv/Cellar")));
        assert_eq!(settings.fetch_attempts, 7);
    }
}
