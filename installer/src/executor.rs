//! Abstraction for running external commands.
//!
//! Dependency probes, the build command, and the smoke test all go through
//! [`CommandExecutor`], so tests can script outcomes without spawning real
//! processes.

use crate::error::{InstallerError, Result};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// A program invocation: program, arguments, working directory, and an
/// optional wall-clock limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandLine {
    /// Create an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Build an invocation from a `[program, args...]` vector.
    ///
    /// Returns `None` for an empty vector.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the command if it runs longer than `limit`.
    #[must_use]
    pub const fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// The wall-clock limit, if set.
    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Runs a command and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the
    /// command, or [`InstallerError::Io`] with kind `TimedOut` when the
    /// command exceeds its time limit.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use formula_installer::executor::{CommandExecutor, CommandLine, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run(&CommandLine::new("cargo").args(["--version"]))?;
    /// assert!(output.status.success());
    /// # Ok::<(), formula_installer::error::InstallerError>(())
    /// ```
    fn run(&self, command: &CommandLine) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &CommandLine) -> Result<Output> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        match command.timeout {
            None => cmd.output().map_err(InstallerError::from),
            Some(limit) => run_with_timeout(&mut cmd, limit),
        }
    }
}

/// Runs a command with a timeout.
///
/// Both pipes are drained on reader threads while the child runs, so a
/// chatty child cannot fill a pipe buffer and stall until the limit. Output
/// is kept as raw bytes.
fn run_with_timeout(cmd: &mut Command, limit: Duration) -> Result<Output> {
    let mut child = cmd.spawn()?;
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    if let Some(status) = child.wait_timeout(limit)? {
        return Ok(Output {
            status,
            stdout: collect(stdout_reader)?,
            stderr: collect(stderr_reader)?,
        });
    }

    // The kill result is irrelevant: the child is reaped either way. The
    // readers are left detached since a grandchild may still hold the pipes.
    drop(child.kill());
    child.wait()?;
    Err(InstallerError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("timed out after {} seconds", limit.as_secs()),
    )))
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut captured = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut captured)?;
        }
        Ok(captured)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let captured = reader
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))??;
    Ok(captured)
}

/// Combine stdout and stderr into one trimmed diagnostic string.
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_owned(),
        (out, "") => out.to_owned(),
        (out, err) => format!("{out}\n{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_argv_splits_program_and_args() {
        let argv = vec!["cargo".to_owned(), "install".to_owned(), "--path".to_owned()];
        let command = CommandLine::from_argv(&argv).expect("non-empty argv");
        assert_eq!(command.program(), "cargo");
        assert_eq!(command.arguments(), ["install", "--path"]);
    }

    #[test]
    fn from_argv_rejects_empty() {
        assert!(CommandLine::from_argv(&[]).is_none());
    }

    #[test]
    fn display_joins_program_and_args() {
        let command = CommandLine::new("rustc").args(["--version"]);
        assert_eq!(command.to_string(), "rustc --version");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_captures_output() {
        let command = CommandLine::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = SystemCommandExecutor.run(&command).expect("spawn sh");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(combined_output(&output), "out\nerr");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_honours_working_dir() {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::write(temp.path().join("marker"), b"x").expect("write marker");
        let command = CommandLine::new("sh")
            .args(["-c", "test -f marker"])
            .current_dir(temp.path());
        let output = SystemCommandExecutor.run(&command).expect("spawn sh");
        assert!(output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_kills_on_timeout() {
        let command = CommandLine::new("sleep")
            .args(["5"])
            .timeout(Duration::from_millis(100));
        let err = SystemCommandExecutor
            .run(&command)
            .expect_err("sleep must time out");
        assert!(matches!(err, InstallerError::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut));
    }

    #[cfg(unix)]
    #[test]
    fn timed_command_with_large_output_completes() {
        let command = CommandLine::new("sh")
            .args(["-c", "head -c 204800 /dev/zero | tr '\\0' x; exit 0"])
            .timeout(Duration::from_secs(20));
        let output = SystemCommandExecutor.run(&command).expect("spawn sh");
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 204_800);
    }

    #[cfg(unix)]
    #[test]
    fn timed_command_keeps_non_utf8_output() {
        let command = CommandLine::new("sh")
            .args(["-c", "printf 'claude \\377 0.1.0'; exit 0"])
            .timeout(Duration::from_secs(20));
        let output = SystemCommandExecutor.run(&command).expect("spawn sh");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"claude \xff 0.1.0");
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let command = CommandLine::new("definitely-not-a-real-program-7f3a");
        assert!(matches!(
            SystemCommandExecutor.run(&command),
            Err(InstallerError::Io(_))
        ));
    }
}
