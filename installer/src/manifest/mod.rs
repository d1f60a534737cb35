//! Package manifest model.
//!
//! A manifest is the declarative record a maintainer authors for each
//! upstream release: identity, source location, content checksum, license,
//! dependencies, the build command, and the smoke test. It is read-only at
//! install time and superseded rather than edited when a new release ships.
//!
//! # Sub-modules
//!
//! - [`checksum`] - SHA-256 digest newtype (`Sha256Digest`).
//! - [`dependency`] - Dependency declarations and version constraints.
//! - [`error`] - Validation error types.
//! - [`package_name`] - Package name newtype (`PackageName`).
//! - [`parser`] - TOML deserialization and validation.

pub mod checksum;
pub mod dependency;
pub mod error;
pub mod package_name;
pub mod parser;

use checksum::Sha256Digest;
use dependency::Dependency;
use package_name::PackageName;
use serde::Serialize;
use url::Url;

/// Token replaced by the install prefix in build command arguments.
pub const PREFIX_TOKEN: &str = "{prefix}";

/// Token replaced by the extracted source root in build command arguments.
pub const SOURCE_TOKEN: &str = "{source}";

/// Identity and provenance fields of a package.
///
/// Grouped so that the [`Manifest`] constructor stays within Clippy's
/// parameter limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageIdentity {
    /// Package identifier, unique within a repository.
    pub name: PackageName,
    /// Upstream version; keys the install prefix.
    pub version: String,
    /// Human-readable summary.
    pub description: Option<String>,
    /// Project homepage.
    pub homepage: Option<Url>,
    /// License identifier, typically SPDX.
    pub license: String,
}

/// Where the source comes from and how to check it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSource {
    /// Location of the source archive.
    pub url: Url,
    /// Expected SHA-256 of the archive.
    pub sha256: Sha256Digest,
}

/// The external build/install command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSpec {
    /// Program followed by its arguments, with `{prefix}`/`{source}` tokens.
    pub command: Vec<String>,
}

impl Default for InstallSpec {
    /// `cargo install --root {prefix} --path .`
    fn default() -> Self {
        Self {
            command: ["cargo", "install", "--root", PREFIX_TOKEN, "--path", "."]
                .iter()
                .map(|&arg| arg.to_owned())
                .collect(),
        }
    }
}

/// Post-install smoke test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeTestSpec {
    /// Binary file name under `<prefix>/bin`.
    pub binary: String,
    /// Arguments passed to the binary; `--version` unless overridden.
    pub args: Vec<String>,
}

/// A validated package manifest.
///
/// Construct one with [`parser::parse_manifest`] or
/// [`parser::load_manifest`]; every field has passed validation by then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    identity: PackageIdentity,
    source: PackageSource,
    build_dependencies: Vec<Dependency>,
    runtime_dependencies: Vec<Dependency>,
    install: InstallSpec,
    test: SmokeTestSpec,
}

/// Dependency sets of a package, grouped for [`Manifest::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySets {
    /// Needed only while building.
    pub build: Vec<Dependency>,
    /// Needed while the installed binary runs.
    pub runtime: Vec<Dependency>,
}

/// Build and smoke-test recipe of a package, grouped for [`Manifest::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Build/install command.
    pub install: InstallSpec,
    /// Smoke test.
    pub test: SmokeTestSpec,
}

impl Manifest {
    /// Assemble a manifest from already-validated parts.
    #[must_use]
    pub fn new(
        identity: PackageIdentity,
        source: PackageSource,
        dependencies: DependencySets,
        recipe: Recipe,
    ) -> Self {
        Self {
            identity,
            source,
            build_dependencies: dependencies.build,
            runtime_dependencies: dependencies.runtime,
            install: recipe.install,
            test: recipe.test,
        }
    }

    /// Package name.
    #[must_use]
    pub const fn name(&self) -> &PackageName {
        &self.identity.name
    }

    /// Upstream version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.identity.version
    }

    /// Human-readable description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.identity.description.as_deref()
    }

    /// Homepage URL, if any.
    #[must_use]
    pub const fn homepage(&self) -> Option<&Url> {
        self.identity.homepage.as_ref()
    }

    /// License identifier.
    #[must_use]
    pub fn license(&self) -> &str {
        &self.identity.license
    }

    /// Source archive URL.
    #[must_use]
    pub const fn source_url(&self) -> &Url {
        &self.source.url
    }

    /// Expected source archive digest.
    #[must_use]
    pub const fn checksum(&self) -> &Sha256Digest {
        &self.source.sha256
    }

    /// Dependencies required only at build time.
    #[must_use]
    pub fn build_dependencies(&self) -> &[Dependency] {
        &self.build_dependencies
    }

    /// Dependencies required at run time.
    #[must_use]
    pub fn runtime_dependencies(&self) -> &[Dependency] {
        &self.runtime_dependencies
    }

    /// Build/install command.
    #[must_use]
    pub const fn install(&self) -> &InstallSpec {
        &self.install
    }

    /// Smoke test definition.
    #[must_use]
    pub const fn smoke_test(&self) -> &SmokeTestSpec {
        &self.test
    }

    /// One-line summary, e.g. `claude-cli 0.1.0 (MIT)`.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{} {} ({})", self.name(), self.version(), self.license())
    }
}
