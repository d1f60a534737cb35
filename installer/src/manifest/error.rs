//! Error types for manifest parsing and field validation.
//!
//! Each variant names the offending field or value and the constraint it
//! violated, so `formula-installer check` can report problems verbatim.

use thiserror::Error;

/// Errors arising from an invalid or unreadable package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The manifest is not valid TOML or does not match the schema.
    #[error("manifest syntax error: {reason}")]
    Syntax {
        /// Parser diagnostic.
        reason: String,
    },

    /// A package name is empty or contains unsupported characters.
    #[error("invalid package name \"{value}\": {reason}")]
    InvalidName {
        /// The rejected name.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A URL field does not parse or uses an unsupported scheme.
    #[error("invalid {field} \"{value}\": {reason}")]
    InvalidUrl {
        /// Manifest key holding the URL.
        field: &'static str,
        /// The rejected URL string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The `sha256` field is a placeholder, has the wrong length, or is not hex.
    #[error("invalid sha256 \"{value}\": {reason}")]
    InvalidChecksum {
        /// The rejected checksum string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A required field is present but empty.
    #[error("field {field} must not be empty")]
    EmptyField {
        /// Manifest key that was empty.
        field: &'static str,
    },

    /// A dependency entry is malformed.
    #[error("invalid {kind} dependency \"{name}\": {reason}")]
    InvalidDependency {
        /// `build` or `runtime`.
        kind: &'static str,
        /// Dependency name as written.
        name: String,
        /// Description of the validation failure.
        reason: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;
