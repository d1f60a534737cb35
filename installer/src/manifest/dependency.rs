//! Build and runtime dependency declarations.
//!
//! A dependency is a tool name, a semver requirement, and the command used to
//! ask the host which version is installed. Probing and constraint checking
//! live in [`crate::deps`]; this module only models and validates the data.

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a dependency is needed while building or while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Required only while compiling the source tree.
    Build,
    /// Required while the installed binary executes.
    Runtime,
}

impl DependencyKind {
    /// Lowercase label used in diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A version requirement such as `*`, `>=1.70`, or `^3, <4`.
///
/// # Examples
///
/// ```
/// use formula_installer::manifest::dependency::VersionConstraint;
/// use semver::Version;
///
/// let constraint = VersionConstraint::parse(">=1.70").expect("valid requirement");
/// assert!(constraint.matches(&Version::new(1, 82, 0)));
/// assert!(!constraint.matches(&Version::new(1, 69, 2)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint(VersionReq);

impl VersionConstraint {
    /// A constraint satisfied by any version.
    #[must_use]
    pub const fn any() -> Self {
        Self(VersionReq::STAR)
    }

    /// Parse a requirement string; an empty string means "any version".
    ///
    /// # Errors
    ///
    /// Returns the semver diagnostic when the requirement is malformed.
    pub fn parse(value: &str) -> Result<Self, semver::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(Self::any());
        }
        VersionReq::parse(trimmed).map(Self)
    }

    /// Return true when `version` satisfies the requirement.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(version)
    }

    /// Return true when any version is acceptable.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.0 == VersionReq::STAR
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = semver::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(constraint: VersionConstraint) -> Self {
        constraint.to_string()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named tool the package needs, with its version requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    name: String,
    requirement: VersionConstraint,
    probe: Vec<String>,
}

impl Dependency {
    /// Create a dependency probed with `<name> --version`.
    #[must_use]
    pub fn new(name: impl Into<String>, requirement: VersionConstraint) -> Self {
        let name = name.into();
        let probe = vec![name.clone(), "--version".to_owned()];
        Self {
            name,
            requirement,
            probe,
        }
    }

    /// Replace the probe command used to discover the installed version.
    ///
    /// An empty probe keeps the default.
    #[must_use]
    pub fn with_probe(mut self, probe: Vec<String>) -> Self {
        if !probe.is_empty() {
            self.probe = probe;
        }
        self
    }

    /// The dependency name as written in the manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version requirement.
    #[must_use]
    pub const fn requirement(&self) -> &VersionConstraint {
        &self.requirement
    }

    /// Program and arguments that print the installed version.
    #[must_use]
    pub fn probe(&self) -> &[String] {
        &self.probe
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requirement.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.requirement)
        }
    }
}

/// Pull the first dotted version number out of a tool's `--version` output.
///
/// Tokens need at least a major and minor component; missing patch numbers
/// are treated as zero and pre-release or build suffixes are dropped. This
/// copes with `rustc 1.82.0 (f6e511eec 2024-10-15)`, `OpenSSL 3.0.2 15 Mar
/// 2022`, and `git version 2.43.0`.
///
/// # Examples
///
/// ```
/// use formula_installer::manifest::dependency::extract_version;
/// use semver::Version;
///
/// let found = extract_version("OpenSSL 3.0.2 15 Mar 2022");
/// assert_eq!(found, Some(Version::new(3, 0, 2)));
/// ```
#[must_use]
pub fn extract_version(text: &str) -> Option<Version> {
    text.split_whitespace().find_map(parse_version_token)
}

fn parse_version_token(token: &str) -> Option<Version> {
    let stripped = token.trim_start_matches(['v', 'V', '(']);
    let numeric: String = stripped
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut components = numeric
        .split('.')
        .filter(|part| !part.is_empty())
        .map(str::parse::<u64>);

    let major = components.next()?.ok()?;
    let minor = components.next()?.ok()?;
    let patch = match components.next() {
        Some(parsed) => parsed.ok()?,
        None => 0,
    };
    Some(Version::new(major, minor, patch))
}
