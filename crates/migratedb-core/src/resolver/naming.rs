//! Script file naming: `V<version>__<description>.sql`, `B<version>__<description>.sql`
//! and `R__<description>.sql`.

use crate::error::{Error, Result};
use crate::version::Version;

/// Separates the version from the description.
pub const SEPARATOR: &str = "__";

/// Extension of migration scripts.
pub const SUFFIX: &str = ".sql";

/// What a script name declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// `V` prefix.
    Versioned,
    /// `B` prefix.
    Baseline,
    /// `R` prefix.
    Repeatable,
}

/// A parsed script name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName {
    /// Kind declared by the prefix.
    pub kind: ScriptKind,
    /// Version, absent for repeatable scripts.
    pub version: Option<Version>,
    /// Description with underscores turned into spaces.
    pub description: String,
}

impl ScriptName {
    /// Parse a file name.
    ///
    /// Returns `Ok(None)` for files that are not migration scripts at all
    /// (wrong extension or prefix) and an error for files that look like
    /// migrations but are malformed.
    pub fn parse(file_name: &str) -> Result<Option<Self>> {
        let Some(stem) = file_name.strip_suffix(SUFFIX) else {
            return Ok(None);
        };

        let kind = match stem.chars().next() {
            Some('V') => ScriptKind::Versioned,
            Some('B') => ScriptKind::Baseline,
            Some('R') => ScriptKind::Repeatable,
            _ => return Ok(None),
        };
        let rest = &stem[1..];

        let invalid = |reason: String| Error::InvalidMigrationName {
            name: file_name.to_string(),
            reason,
        };

        let (version_text, description) = rest
            .split_once(SEPARATOR)
            .ok_or_else(|| invalid(format!("missing '{}' separator", SEPARATOR)))?;
        let description = description.replace('_', " ").trim().to_string();

        let version = match kind {
            ScriptKind::Repeatable => {
                if !version_text.is_empty() {
                    return Err(invalid("repeatable migrations cannot have a version".to_string()));
                }
                None
            }
            ScriptKind::Versioned | ScriptKind::Baseline => {
                if version_text.is_empty() {
                    return Err(invalid("missing version".to_string()));
                }
                let version = Version::parse(version_text).map_err(|e| invalid(e.to_string()))?;
                if version.is_sentinel() {
                    return Err(invalid(format!("'{}' is not a numeric version", version_text)));
                }
                Some(version)
            }
        };

        if kind == ScriptKind::Repeatable && description.is_empty() {
            return Err(invalid("repeatable migrations need a description".to_string()));
        }

        Ok(Some(Self {
            kind,
            version,
            description,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_name() {
        let name = ScriptName::parse("V1_2__add_users_table.sql").unwrap().unwrap();
        assert_eq!(name.kind, ScriptKind::Versioned);
        assert_eq!(name.version, Some(Version::parse("1.2").unwrap()));
        assert_eq!(name.description, "add users table");
    }

    #[test]
    fn test_baseline_and_repeatable_names() {
        let name = ScriptName::parse("B5__snapshot.sql").unwrap().unwrap();
        assert_eq!(name.kind, ScriptKind::Baseline);

        let name = ScriptName::parse("R__refresh_views.sql").unwrap().unwrap();
        assert_eq!(name.kind, ScriptKind::Repeatable);
        assert!(name.version.is_none());
        assert_eq!(name.description, "refresh views");
    }

    #[test]
    fn test_non_migrations_are_skipped() {
        assert_eq!(ScriptName::parse("README.md").unwrap(), None);
        assert_eq!(ScriptName::parse("helper.sql").unwrap(), None);
        assert_eq!(ScriptName::parse("V1__init.sql.conf").unwrap(), None);
    }

    #[test]
    fn test_malformed_names() {
        for name in ["V1_init.sql", "Vx__bad.sql", "R1__seed.sql", "V__nover.sql", "R__.sql", "Vlatest__x.sql"] {
            assert!(
                matches!(ScriptName::parse(name), Err(Error::InvalidMigrationName { .. })),
                "{name}"
            );
        }
    }
}
