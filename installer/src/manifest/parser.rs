//! Manifest deserialization and validation.
//!
//! Manifests are TOML documents. Deserialization goes through a raw schema
//! that rejects unknown keys; every field is then validated into the
//! [`Manifest`] domain types so that malformed values fail at parse time,
//! long before any network or build activity.

use super::checksum::Sha256Digest;
use super::dependency::{Dependency, DependencyKind, VersionConstraint};
use super::error::{ManifestError, Result};
use super::package_name::PackageName;
use super::{
    DependencySets, InstallSpec, Manifest, PackageIdentity, PackageSource, Recipe, SmokeTestSpec,
};
use crate::error::InstallerError;
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

/// Version used when neither the manifest nor the URL names one.
const FALLBACK_VERSION: &str = "latest";

/// Archive suffixes stripped when deriving a version from a URL.
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.zst", ".tar", ".zip"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: String,
    version: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    url: String,
    sha256: String,
    license: String,
    #[serde(default)]
    build_dependencies: Vec<RawDependency>,
    #[serde(default)]
    runtime_dependencies: Vec<RawDependency>,
    install: Option<RawInstall>,
    test: Option<RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    name: String,
    version: Option<String>,
    #[serde(default)]
    probe: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstall {
    command: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    binary: Option<String>,
    args: Option<Vec<String>>,
}

/// Parse a TOML string into a validated [`Manifest`].
///
/// # Errors
///
/// Returns [`ManifestError::Syntax`] for malformed TOML, missing required
/// keys, or unknown keys, and a field-specific variant for values that fail
/// validation (including placeholder checksums).
///
/// # Examples
///
/// ```
/// use formula_installer::manifest::parser::parse_manifest;
///
/// let toml = format!(
///     concat!(
///         "name = \"claude-cli\"\n",
///         "url = \"https://example.com/archive/v0.1.0.tar.gz\"\n",
///         "sha256 = \"{}\"\n",
///         "license = \"MIT\"\n",
///     ),
///     "a".repeat(64),
/// );
/// let manifest = parse_manifest(&toml).expect("valid manifest");
/// assert_eq!(manifest.name().as_str(), "claude-cli");
/// assert_eq!(manifest.version(), "0.1.0");
/// assert_eq!(manifest.smoke_test().args, ["--version"]);
/// ```
pub fn parse_manifest(text: &str) -> Result<Manifest> {
    let raw: RawManifest = toml::from_str(text).map_err(|e| ManifestError::Syntax {
        reason: e.to_string().trim().to_owned(),
    })?;
    validate(raw)
}

/// Read and parse a manifest file.
///
/// # Errors
///
/// Returns [`InstallerError::ManifestNotFound`] if the file does not exist,
/// [`InstallerError::Io`] if it cannot be read, and
/// [`InstallerError::InvalidChecksum`] or [`InstallerError::InvalidManifest`]
/// when parsing fails.
pub fn load_manifest(path: &Utf8Path) -> crate::error::Result<Manifest> {
    if !path.is_file() {
        return Err(InstallerError::ManifestNotFound {
            path: path.to_owned(),
        });
    }
    debug!("loading manifest from {path}");
    let text = std::fs::read_to_string(path)?;
    parse_manifest(&text).map_err(|source| InstallerError::from_manifest(path, source))
}

fn validate(raw: RawManifest) -> Result<Manifest> {
    let name = PackageName::try_from(raw.name)?;
    let url = parse_url("url", &raw.url, &["http", "https", "file"])?;
    let homepage = raw
        .homepage
        .as_deref()
        .map(|value| parse_url("homepage", value, &["http", "https"]))
        .transpose()?;
    let sha256 = Sha256Digest::try_from(raw.sha256)?;
    let license = non_empty("license", raw.license)?;
    let version = match raw.version {
        Some(version) => non_empty("version", version)?,
        None => derive_version(&url),
    };

    let dependencies = DependencySets {
        build: validate_dependencies(DependencyKind::Build, raw.build_dependencies)?,
        runtime: validate_dependencies(DependencyKind::Runtime, raw.runtime_dependencies)?,
    };
    let recipe = Recipe {
        install: validate_install(raw.install)?,
        test: validate_test(raw.test, &name)?,
    };

    let identity = PackageIdentity {
        name,
        version,
        description: raw.description,
        homepage,
        license,
    };
    Ok(Manifest::new(
        identity,
        PackageSource { url, sha256 },
        dependencies,
        recipe,
    ))
}

fn parse_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<Url> {
    let reject = |reason: String| ManifestError::InvalidUrl {
        field,
        value: value.to_owned(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| reject(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(reject(format!(
            "unsupported scheme \"{}\"; expected one of: {}",
            url.scheme(),
            schemes.join(", ")
        )));
    }
    Ok(url)
}

fn non_empty(field: &'static str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(ManifestError::EmptyField { field });
    }
    Ok(value)
}

fn validate_dependencies(
    kind: DependencyKind,
    raw: Vec<RawDependency>,
) -> Result<Vec<Dependency>> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|entry| {
            let reject = |reason: String| ManifestError::InvalidDependency {
                kind: kind.label(),
                name: entry.name.clone(),
                reason,
            };
            if entry.name.trim().is_empty() {
                return Err(reject("name must not be empty".to_owned()));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(reject("declared more than once".to_owned()));
            }
            let requirement = VersionConstraint::parse(entry.version.as_deref().unwrap_or(""))
                .map_err(|e| reject(format!("invalid version requirement: {e}")))?;
            Ok(Dependency::new(entry.name.clone(), requirement).with_probe(entry.probe))
        })
        .collect()
}

fn validate_install(raw: Option<RawInstall>) -> Result<InstallSpec> {
    let Some(install) = raw else {
        return Ok(InstallSpec::default());
    };
    let has_program = install
        .command
        .first()
        .is_some_and(|program| !program.trim().is_empty());
    if !has_program {
        return Err(ManifestError::EmptyField {
            field: "install.command",
        });
    }
    Ok(InstallSpec {
        command: install.command,
    })
}

fn validate_test(raw: Option<RawTest>, name: &PackageName) -> Result<SmokeTestSpec> {
    let (binary, args) = match raw {
        Some(test) => (test.binary, test.args),
        None => (None, None),
    };
    let binary = match binary {
        Some(binary) => non_empty("test.binary", binary)?,
        None => name.as_str().to_owned(),
    };
    if binary.contains(['/', '\\']) || binary == ".." {
        return Err(ManifestError::InvalidName {
            value: binary,
            reason: "test.binary must be a file name under <prefix>/bin".to_owned(),
        });
    }
    Ok(SmokeTestSpec {
        binary,
        args: args.unwrap_or_else(|| vec!["--version".to_owned()]),
    })
}

/// Derive a version from the last URL path segment.
///
/// `.../archive/v0.1.0.tar.gz` yields `0.1.0` and `.../tool-2.4.1.zip`
/// yields `2.4.1`. Anything that does not start with a digit after
/// stripping falls back to `latest`.
#[must_use]
pub fn derive_version(url: &Url) -> String {
    let Some(segment) = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
    else {
        return FALLBACK_VERSION.to_owned();
    };

    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| segment.strip_suffix(suffix))
        .unwrap_or(segment);
    let candidate = stem.rsplit('-').next().unwrap_or(stem);
    let version = candidate.trim_start_matches(['v', 'V']);

    if version.starts_with(|c: char| c.is_ascii_digit()) {
        version.to_owned()
    } else {
        FALLBACK_VERSION.to_owned()
    }
}
