//! Dependency probing for build and runtime requirements.
//!
//! Each declared dependency is probed by running its probe command
//! (`<name> --version` unless the manifest overrides it) and parsing a
//! version number from the output. Nothing is installed automatically: an
//! unsatisfied build dependency stops the pipeline before the build runs.

use crate::error::{InstallerError, Result};
use crate::executor::{CommandExecutor, CommandLine, combined_output};
use crate::manifest::dependency::{Dependency, DependencyKind, extract_version};
use log::{debug, warn};
use semver::Version;
use std::fmt;
use std::time::Duration;

/// Wall-clock limit for a single probe command.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// The tool ran and its version satisfies the requirement.
    ///
    /// `version` is `None` when the requirement is `*` and the output did not
    /// contain a recognisable version.
    Satisfied {
        /// Detected version, if any.
        version: Option<Version>,
    },
    /// The probe could not run or exited unsuccessfully.
    Missing {
        /// Why the probe failed.
        reason: String,
    },
    /// The tool ran but its version does not satisfy the requirement.
    Outdated {
        /// Detected version.
        found: Version,
    },
    /// The tool ran but printed no recognisable version.
    UnknownVersion,
}

impl DependencyStatus {
    /// Return true for [`DependencyStatus::Satisfied`].
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied {
                version: Some(version),
            } => write!(f, "found {version}"),
            Self::Satisfied { version: None } => write!(f, "found"),
            Self::Missing { reason } => write!(f, "not found ({reason})"),
            Self::Outdated { found } => write!(f, "found {found}"),
            Self::UnknownVersion => write!(f, "found, but version could not be determined"),
        }
    }
}

/// A dependency together with its probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    /// The declared dependency.
    pub dependency: Dependency,
    /// Build or runtime.
    pub kind: DependencyKind,
    /// Probe outcome.
    pub status: DependencyStatus,
}

impl DependencyCheck {
    /// Convert an unsatisfied check into [`InstallerError::DependencyUnsatisfied`].
    #[must_use]
    pub fn to_error(&self) -> Option<InstallerError> {
        if self.status.is_satisfied() {
            return None;
        }
        Some(InstallerError::DependencyUnsatisfied {
            name: self.dependency.name().to_owned(),
            requirement: self.dependency.requirement().to_string(),
            found: self.status.to_string(),
        })
    }
}

impl fmt::Display for DependencyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.status.is_satisfied() { "ok" } else { "!!" };
        write!(
            f,
            "[{marker}] {} ({}): {}",
            self.dependency, self.kind, self.status
        )
    }
}

/// Probe a single dependency.
///
/// # Examples
///
/// ```no_run
/// use formula_installer::deps::check_dependency;
/// use formula_installer::executor::SystemCommandExecutor;
/// use formula_installer::manifest::dependency::{Dependency, VersionConstraint};
///
/// let rust = Dependency::new("rust", VersionConstraint::parse(">=1.70").expect("valid"))
///     .with_probe(vec!["rustc".to_owned(), "--version".to_owned()]);
/// let status = check_dependency(&SystemCommandExecutor, &rust);
/// println!("{status}");
/// ```
pub fn check_dependency(executor: &dyn CommandExecutor, dependency: &Dependency) -> DependencyStatus {
    let Some(probe) = CommandLine::from_argv(dependency.probe()) else {
        return DependencyStatus::Missing {
            reason: "empty probe command".to_owned(),
        };
    };
    let command = probe.timeout(PROBE_TIMEOUT);
    debug!("probing {} with `{command}`", dependency.name());

    let output = match executor.run(&command) {
        Ok(output) => output,
        Err(err) => {
            return DependencyStatus::Missing {
                reason: err.to_string(),
            };
        }
    };
    if !output.status.success() {
        return DependencyStatus::Missing {
            reason: format!("`{command}` exited with {}", output.status),
        };
    }

    match extract_version(&combined_output(&output)) {
        Some(version) if dependency.requirement().matches(&version) => {
            DependencyStatus::Satisfied {
                version: Some(version),
            }
        }
        Some(found) => DependencyStatus::Outdated { found },
        None if dependency.requirement().is_any() => DependencyStatus::Satisfied { version: None },
        None => DependencyStatus::UnknownVersion,
    }
}

/// Probe every dependency in a set.
pub fn check_dependencies(
    executor: &dyn CommandExecutor,
    kind: DependencyKind,
    dependencies: &[Dependency],
) -> Vec<DependencyCheck> {
    dependencies
        .iter()
        .map(|dependency| DependencyCheck {
            dependency: dependency.clone(),
            kind,
            status: check_dependency(executor, dependency),
        })
        .collect()
}

/// Ensure every build dependency is present and satisfies its constraint.
///
/// # Errors
///
/// Returns [`InstallerError::DependencyUnsatisfied`] for the first
/// dependency that is missing, outdated, or of unknown version.
pub fn ensure_build_dependencies(
    executor: &dyn CommandExecutor,
    dependencies: &[Dependency],
) -> Result<Vec<DependencyCheck>> {
    let checks = check_dependencies(executor, DependencyKind::Build, dependencies);
    if let Some(err) = checks.iter().find_map(DependencyCheck::to_error) {
        return Err(err);
    }
    Ok(checks)
}

/// Probe runtime dependencies and log a warning for each unsatisfied one.
///
/// Runtime dependencies do not gate the install; the smoke test does.
pub fn warn_on_runtime_dependencies(
    executor: &dyn CommandExecutor,
    dependencies: &[Dependency],
) -> Vec<DependencyCheck> {
    let checks = check_dependencies(executor, DependencyKind::Runtime, dependencies);
    for check in checks.iter().filter(|check| !check.status.is_satisfied()) {
        warn!("runtime dependency {} {}", check.dependency, check.status);
    }
    checks
}
