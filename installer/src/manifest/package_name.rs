//! Semantic wrapper for package names.
//!
//! Package names key the cellar layout (`<cellar>/<name>/<version>`), so they
//! are restricted to characters that are safe as a single path component.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated package name, unique within a package repository.
///
/// # Examples
///
/// ```
/// use formula_installer::manifest::package_name::PackageName;
///
/// let name = PackageName::try_from("claude-cli").expect("valid name");
/// assert_eq!(name.as_str(), "claude-cli");
/// assert!(PackageName::try_from("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Get the package name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for PackageName {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        validate_name(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for PackageName {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        validate_name(&value)?;
        Ok(Self(value))
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_name(value: &str) -> Result<()> {
    let reject = |reason: &str| ManifestError::InvalidName {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    if value.is_empty() {
        return Err(reject("name must not be empty"));
    }
    if value.starts_with('.') {
        return Err(reject("name must not start with '.'"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
    {
        return Err(reject("only ASCII letters, digits, '-', '_', '.', '+' are allowed"));
    }
    Ok(())
}
