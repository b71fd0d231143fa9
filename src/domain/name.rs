//! Artifact names.
//!
//! A name is the only key an artifact has. It has to survive two encodings:
//! a single URL path segment on the way in, and a single object-store path
//! part on the way down. Anything that would be ambiguous in either place is
//! rejected up front so the two layers never disagree about identity.

use std::fmt;
use std::str::FromStr;

use super::error::DomainError;

pub const MAX_NAME_BYTES: usize = 255;

/// A validated artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::EmptyName);
        }
        if raw.len() > MAX_NAME_BYTES {
            return Err(DomainError::NameTooLong {
                max: MAX_NAME_BYTES,
            });
        }
        if raw == "." || raw == ".." {
            return Err(DomainError::invalid_name(raw, "relative path segment"));
        }
        if raw.contains('/') {
            return Err(DomainError::invalid_name(raw, "contains `/`"));
        }
        if raw.chars().any(char::is_control) {
            return Err(DomainError::invalid_name(raw, "contains control characters"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArtifactName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for raw in ["greet", "invoice-v2", "welcome.email", "Ünïcödé", "a b"] {
            let name = ArtifactName::parse(raw).expect("valid name");
            assert_eq!(name.as_str(), raw);
        }
    }

    #[test]
    fn rejects_empty_and_relative_segments() {
        assert_eq!(ArtifactName::parse(""), Err(DomainError::EmptyName));
        assert!(matches!(
            ArtifactName::parse(".."),
            Err(DomainError::InvalidName { .. })
        ));
        assert!(matches!(
            ArtifactName::parse("."),
            Err(DomainError::InvalidName { .. })
        ));
    }

    #[test]
    fn rejects_separators_and_control_characters() {
        assert!(ArtifactName::parse("nested/name").is_err());
        assert!(ArtifactName::parse("tab\tname").is_err());
        assert!(ArtifactName::parse("nul\0").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        let raw = "x".repeat(MAX_NAME_BYTES + 1);
        assert_eq!(
            ArtifactName::parse(raw),
            Err(DomainError::NameTooLong {
                max: MAX_NAME_BYTES
            })
        );
        assert!(ArtifactName::parse("x".repeat(MAX_NAME_BYTES)).is_ok());
    }
}
