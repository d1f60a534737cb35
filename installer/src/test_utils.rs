//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, behind the `test-support` feature, to the
//! integration suites under `tests/`.

use crate::error::{InstallerError, Result};
use crate::executor::{CommandExecutor, CommandLine};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};

/// Exit status carrying `code`, encoded as a wait status.
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Exit status carrying `code`.
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Output of a command that exits 0 silently.
#[must_use]
pub fn success_output() -> Output {
    stdout_output(0, "")
}

/// Output of a command that exits 1 after printing `stderr`.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Output of a command that exits with `code` after printing `stdout`.
#[must_use]
pub fn stdout_output(code: i32, stdout: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Hex-encoded SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// One file to place in a source tarball fixture.
#[derive(Debug, Clone, Copy)]
pub struct TarballEntry<'a> {
    /// Path relative to the tarball's top-level directory.
    pub path: &'a str,
    /// File contents.
    pub contents: &'a [u8],
    /// Unix permission bits.
    pub mode: u32,
}

/// Write a gzip tarball whose entries all live under `top_level/`, the
/// layout of a forge-generated source archive.
///
/// # Errors
///
/// Returns any I/O error raised while writing the archive.
pub fn write_source_tarball(
    archive_path: &Path,
    top_level: &str,
    entries: &[TarballEntry<'_>],
) -> std::io::Result<PathBuf> {
    let file = File::create(archive_path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.contents.len() as u64);
        header.set_mode(entry.mode);
        header.set_cksum();
        builder.append_data(
            &mut header,
            format!("{top_level}/{}", entry.path),
            entry.contents,
        )?;
    }
    builder.into_inner()?.finish()?;
    Ok(archive_path.to_path_buf())
}

/// A command the stub expects next, and what it answers with.
#[derive(Debug)]
pub struct ExpectedCall {
    /// Program name, such as `rustc` or `sh`.
    pub program: &'static str,
    /// Exact argument list.
    pub args: Vec<&'static str>,
    /// Canned result handed back to the caller.
    pub result: Result<Output>,
}

/// Scripted [`CommandExecutor`] that replays [`ExpectedCall`]s in order.
///
/// Any call that does not match the head of the script fails with
/// [`InstallerError::StubMismatch`].
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Script the executor with `expected`, consumed front to back.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Check that every scripted call was made.
    ///
    /// # Panics
    ///
    /// Panics while calls remain in the script.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "scripted commands were never run: {:?}",
            self.expected.borrow()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, command: &CommandLine) -> Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(InstallerError::StubMismatch {
                message: format!("unexpected command invocation: {command}"),
            });
        };

        if call.program != command.program() || call.args.as_slice() != command.arguments() {
            return Err(InstallerError::StubMismatch {
                message: format!(
                    "expected `{} {}`, got `{command}`",
                    call.program,
                    call.args.join(" ")
                ),
            });
        }

        call.result
    }
}
