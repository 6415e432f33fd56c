//! Cherry-pick and validation patterns.

use crate::error::{Error, Result};
use crate::version::Version;
use std::fmt;
use std::str::FromStr;

/// Selects a migration by version, or a repeatable migration by description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPattern {
    text: String,
    version: Option<Version>,
}

impl MigrationPattern {
    /// Create a pattern. Text that parses as a version matches versioned migrations;
    /// anything else is compared against repeatable descriptions.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let version = Version::parse(&text).ok().filter(|v| !v.is_sentinel());
        Self { text, version }
    }

    /// Whether the pattern selects the given migration.
    pub fn matches(&self, version: Option<&Version>, description: &str) -> bool {
        match version {
            Some(version) => self.version.as_ref() == Some(version),
            None => normalize_description(&self.text) == normalize_description(description),
        }
    }
}

impl fmt::Display for MigrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn normalize_description(text: &str) -> String {
    text.replace('_', " ")
}

/// Conditions that validate reports as errors unless explicitly allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidMatch {
    /// Resolved but not yet applied.
    Pending,
    /// Applied but no longer resolved.
    Missing,
    /// Applied and newer than anything resolved.
    Future,
    /// Resolved but ignored.
    Ignored,
    /// Resolved below the current version and therefore only applicable out of order.
    OutOfOrder,
}

/// Which migrations a [`ValidatePattern`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Versioned and repeatable.
    Any,
    /// Versioned only.
    Versioned,
    /// Repeatable only.
    Repeatable,
}

/// Which condition a [`ValidatePattern`] suppresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternState {
    /// Every condition.
    Any,
    /// Missing migrations.
    Missing,
    /// Pending migrations.
    Pending,
    /// Ignored migrations.
    Ignored,
    /// Future migrations.
    Future,
    /// Failed migrations.
    Failed,
}

impl From<ValidMatch> for PatternState {
    fn from(value: ValidMatch) -> Self {
        match value {
            ValidMatch::Pending => PatternState::Pending,
            ValidMatch::Missing => PatternState::Missing,
            ValidMatch::Future => PatternState::Future,
            ValidMatch::Ignored | ValidMatch::OutOfOrder => PatternState::Ignored,
        }
    }
}

/// An ignore pattern of the form `type:state`, e.g. `*:missing` or `repeatable:pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatePattern {
    kind: PatternKind,
    state: PatternState,
}

impl ValidatePattern {
    /// Create a pattern from its parts.
    pub fn new(kind: PatternKind, state: PatternState) -> Self {
        Self { kind, state }
    }

    /// Whether the pattern covers a migration of the given kind in the given condition.
    pub fn matches(&self, versioned: bool, state: PatternState) -> bool {
        let kind_matches = match self.kind {
            PatternKind::Any => true,
            PatternKind::Versioned => versioned,
            PatternKind::Repeatable => !versioned,
        };
        kind_matches && (self.state == PatternState::Any || self.state == state)
    }

    /// Whether any pattern in `patterns` covers the migration.
    pub fn any_matches(patterns: &[ValidatePattern], versioned: bool, state: PatternState) -> bool {
        patterns.iter().any(|p| p.matches(versioned, state))
    }
}

impl FromStr for ValidatePattern {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: text.to_string(),
            reason: reason.to_string(),
        };

        let (kind, state) = text
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected the form type:state"))?;

        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            "*" => PatternKind::Any,
            "versioned" => PatternKind::Versioned,
            "repeatable" => PatternKind::Repeatable,
            _ => return Err(invalid("type must be one of *, versioned, repeatable")),
        };

        let state = match state.trim().to_ascii_lowercase().as_str() {
            "*" => PatternState::Any,
            "missing" => PatternState::Missing,
            "pending" => PatternState::Pending,
            "ignored" => PatternState::Ignored,
            "future" => PatternState::Future,
            "failed" => PatternState::Failed,
            _ => {
                return Err(invalid(
                    "state must be one of *, missing, pending, ignored, future, failed",
                ))
            }
        };

        Ok(Self { kind, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_pattern_versions() {
        let pattern = MigrationPattern::new("1_1");
        assert!(pattern.matches(Some(&Version::parse("1.1").unwrap()), "whatever"));
        assert!(pattern.matches(Some(&Version::parse("1.1.0").unwrap()), "whatever"));
        assert!(!pattern.matches(Some(&Version::parse("1.2").unwrap()), "whatever"));
    }

    #[test]
    fn test_migration_pattern_descriptions() {
        let pattern = MigrationPattern::new("seed_data");
        assert!(pattern.matches(None, "seed data"));
        assert!(!pattern.matches(None, "other"));
        assert!(!pattern.matches(Some(&Version::parse("1").unwrap()), "seed data"));
    }

    #[test]
    fn test_parse_validate_pattern() {
        let pattern: ValidatePattern = "*:missing".parse().unwrap();
        assert!(pattern.matches(true, PatternState::Missing));
        assert!(pattern.matches(false, PatternState::Missing));
        assert!(!pattern.matches(true, PatternState::Pending));

        let pattern: ValidatePattern = "Repeatable:*".parse().unwrap();
        assert!(pattern.matches(false, PatternState::Failed));
        assert!(!pattern.matches(true, PatternState::Failed));
    }

    #[test]
    fn test_invalid_validate_patterns() {
        for text in ["missing", "foo:missing", "*:bogus", ""] {
            assert!(matches!(
                text.parse::<ValidatePattern>(),
                Err(Error::InvalidPattern { .. })
            ));
        }
    }
}
