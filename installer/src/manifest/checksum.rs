//! SHA-256 digest newtype for source artefact verification.
//!
//! Digests are accepted in either case and stored lowercase, so comparison
//! against a freshly computed hash is a plain string equality. Placeholder
//! values left behind by manifest templates are rejected outright rather
//! than compared.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Values maintainers leave in templates before the real digest is known.
const PLACEHOLDERS: &[&str] = &[
    "UPDATE_WITH_ACTUAL_SHA256",
    "REPLACE_ME",
    "PLACEHOLDER",
    "TODO",
    "TBD",
];

/// A validated, lowercase hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use formula_installer::manifest::checksum::Sha256Digest;
///
/// let upper = "AB".repeat(32);
/// let digest = Sha256Digest::try_from(upper.as_str()).expect("valid digest");
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// assert!(Sha256Digest::try_from("UPDATE_WITH_ACTUAL_SHA256").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a lowercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against another hex digest, ignoring case.
    ///
    /// Returns `false` for anything that is not a well-formed digest.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        other.len() == DIGEST_HEX_LEN && self.0.eq_ignore_ascii_case(other)
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        validate_sha256(value.trim())?;
        Ok(Self(value.trim().to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<Sha256Digest> for String {
    fn from(digest: Sha256Digest) -> Self {
        digest.0
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Return true when `value` is a known template placeholder.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDERS
            .iter()
            .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
}

fn validate_sha256(value: &str) -> Result<()> {
    let reject = |reason: String| ManifestError::InvalidChecksum {
        value: value.to_owned(),
        reason,
    };

    if is_placeholder(value) {
        return Err(reject(
            "placeholder value; compute the real digest with `formula-installer checksum`"
                .to_owned(),
        ));
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(reject(format!("non-hex character '{bad}'")));
    }
    if value.len() != DIGEST_HEX_LEN {
        return Err(reject(format!(
            "expected {DIGEST_HEX_LEN} hex characters, got {}",
            value.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid_digest() -> String {
        "a".repeat(64)
    }

    #[test]
    fn accepts_valid_sixty_four_char_hex() {
        let digest = Sha256Digest::try_from(valid_digest().as_str());
        assert!(digest.is_ok());
    }

    #[test]
    fn normalizes_uppercase_to_lowercase() {
        let digest = Sha256Digest::try_from("F".repeat(64)).expect("uppercase is accepted");
        assert_eq!(digest.as_str(), "f".repeat(64));
    }

    #[rstest]
    #[case::too_short("abcdef".to_owned())]
    #[case::too_long("a".repeat(65))]
    #[case::non_hex(format!("{}g", "a".repeat(63)))]
    fn rejects_malformed_digests(#[case] value: String) {
        let result = Sha256Digest::try_from(value);
        assert!(matches!(
            result,
            Err(ManifestError::InvalidChecksum { .. })
        ));
    }

    #[rstest]
    #[case::formula_template("UPDATE_WITH_ACTUAL_SHA256")]
    #[case::lowercase_todo("todo")]
    #[case::blank("   ")]
    fn rejects_placeholders(#[case] value: &str) {
        let err = Sha256Digest::try_from(value).expect_err("placeholder must be rejected");
        assert!(err.to_string().contains("placeholder"), "got: {err}");
    }

    #[test]
    fn matches_ignores_case() {
        let digest = Sha256Digest::try_from(valid_digest()).expect("valid");
        assert!(digest.matches(&"A".repeat(64)));
        assert!(!digest.matches(&"b".repeat(64)));
        assert!(!digest.matches("a"));
    }

    #[test]
    fn deserializes_through_validation() {
        let parsed: std::result::Result<Sha256Digest, _> =
            serde_json::from_str("\"UPDATE_WITH_ACTUAL_SHA256\"");
        assert!(parsed.is_err());
    }
}
