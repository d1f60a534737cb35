//! Post-install smoke test.
//!
//! The installed binary is run with its manifest test arguments
//! (`--version` by default). Exit status 0 is the only success criterion;
//! the first line of output is kept as the reported version.

use crate::error::{InstallerError, Result};
use crate::executor::{CommandExecutor, CommandLine, combined_output};
use camino::Utf8Path;
use log::{debug, warn};
use std::time::Duration;

/// Wall-clock limit for the smoke test.
pub const SMOKE_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the installed binary and return its reported version line.
///
/// # Errors
///
/// Returns [`InstallerError::VerificationFailed`] when the binary cannot be
/// executed, times out, or exits non-zero.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use formula_installer::executor::SystemCommandExecutor;
/// use formula_installer::smoke::verify_installation;
///
/// let binary = Utf8Path::new("/opt/cellar/claude-cli/0.1.0/bin/claude");
/// let version = verify_installation(&SystemCommandExecutor, binary, &["--version".to_owned()])?;
/// println!("installed {version}");
/// # Ok::<(), formula_installer::error::InstallerError>(())
/// ```
pub fn verify_installation(
    executor: &dyn CommandExecutor,
    installed_binary_path: &Utf8Path,
    args: &[String],
) -> Result<String> {
    let command = CommandLine::new(installed_binary_path.as_str())
        .args(args.iter().cloned())
        .timeout(SMOKE_TEST_TIMEOUT);
    debug!("smoke testing with `{command}`");

    let failed = |reason: String| InstallerError::VerificationFailed {
        path: installed_binary_path.to_owned(),
        reason,
    };
    let output = executor.run(&command).map_err(|err| failed(err.to_string()))?;
    if !output.status.success() {
        let captured = combined_output(&output);
        let reason = if captured.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {captured}", output.status)
        };
        return Err(failed(reason));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_owned())
}

/// Return true iff the installed binary passes its smoke test.
#[must_use]
pub fn is_installation_healthy(
    executor: &dyn CommandExecutor,
    installed_binary_path: &Utf8Path,
    args: &[String],
) -> bool {
    match verify_installation(executor, installed_binary_path, args) {
        Ok(_) => true,
        Err(err) => {
            warn!("{err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockCommandExecutor;
    use crate::test_utils::{failure_output, stdout_output};
    use rstest::rstest;

    fn version_args() -> Vec<String> {
        vec!["--version".to_owned()]
    }

    fn executor_returning(output: std::process::Output) -> MockCommandExecutor {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|command| {
                command.program() == "/opt/pkg/bin/claude" && command.arguments() == ["--version"]
            })
            .times(1)
            .return_once(move |_| Ok(output));
        executor
    }

    #[test]
    fn returns_first_line_of_version_output() {
        let executor = executor_returning(stdout_output(0, "claude 0.1.0\nbuilt with rustc\n"));

        let version = verify_installation(
            &executor,
            Utf8Path::new("/opt/pkg/bin/claude"),
            &version_args(),
        )
        .expect("smoke test passes");

        assert_eq!(version, "claude 0.1.0");
    }

    #[rstest]
    #[case::success(stdout_output(0, "claude 0.1.0"), true)]
    #[case::failure(failure_output("unknown flag"), false)]
    #[case::exit_two(stdout_output(2, ""), false)]
    fn healthy_iff_exit_status_zero(#[case] output: std::process::Output, #[case] healthy: bool) {
        let executor = executor_returning(output);

        assert_eq!(
            is_installation_healthy(
                &executor,
                Utf8Path::new("/opt/pkg/bin/claude"),
                &version_args()
            ),
            healthy
        );
    }

    #[test]
    fn failure_reason_includes_output() {
        let executor = executor_returning(failure_output("error: unknown flag --version"));

        let err = verify_installation(
            &executor,
            Utf8Path::new("/opt/pkg/bin/claude"),
            &version_args(),
        )
        .expect_err("non-zero exit");

        match err {
            InstallerError::VerificationFailed { path, reason } => {
                assert_eq!(path.as_str(), "/opt/pkg/bin/claude");
                assert!(reason.contains("unknown flag"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn spawn_error_is_verification_failure() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().times(1).returning(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "not executable").into())
        });

        let result = verify_installation(
            &executor,
            Utf8Path::new("/opt/pkg/bin/claude"),
            &version_args(),
        );

        assert!(matches!(
            result,
            Err(InstallerError::VerificationFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[rstest]
    #[case::large_output("head -c 204800 /dev/zero | tr '\\0' x; echo; echo claude 0.1.0")]
    #[case::non_utf8_output("printf 'claude \\377 0.1.0\\n'")]
    fn real_binary_exiting_zero_is_healthy(#[case] body: &str) {
        use crate::executor::SystemCommandExecutor;
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("temp dir");
        let script = temp.path().join("claude");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\nexit 0\n")).expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        let binary = Utf8Path::from_path(&script).expect("utf-8 temp path");

        assert!(is_installation_healthy(
            &SystemCommandExecutor,
            binary,
            &version_args()
        ));
    }
}
