//! Applied migrations: rows of the schema history table.

use super::types::MigrationType;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Description stored by backends that cannot store an empty string.
pub const NO_DESCRIPTION_MARKER: &str = "<< no description >>";

/// Longest description stored in the schema history.
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// One row of the schema history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Position in application order. Strictly increasing.
    pub installed_rank: i32,
    /// Version, or `None` for repeatable migrations and schema markers.
    pub version: Option<Version>,
    /// Description at the time of application.
    pub description: String,
    /// Migration type.
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    /// Script name.
    pub script: String,
    /// Checksum at the time of application.
    pub checksum: Option<i32>,
    /// When the row was written.
    pub installed_on: DateTime<Utc>,
    /// Who applied the migration.
    pub installed_by: String,
    /// Execution time in milliseconds.
    pub execution_time: i32,
    /// Whether the migration succeeded.
    pub success: bool,
}

impl AppliedMigration {
    /// Whether this row belongs to a repeatable migration (or a versionless marker).
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    /// Version or description, whichever identifies the row.
    pub fn identifier(&self) -> String {
        match &self.version {
            Some(version) => version.to_string(),
            None => self.description.clone(),
        }
    }
}

/// The values of a row about to be appended to the schema history.
///
/// The history assigns `installed_rank` and `installed_on`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppliedMigration {
    /// Version, or `None` for repeatable migrations.
    pub version: Option<Version>,
    /// Description.
    pub description: String,
    /// Migration type.
    pub migration_type: MigrationType,
    /// Script name.
    pub script: String,
    /// Checksum.
    pub checksum: Option<i32>,
    /// Who applied the migration.
    pub installed_by: String,
    /// Execution time in milliseconds.
    pub execution_time: i32,
    /// Whether the migration succeeded.
    pub success: bool,
}

impl NewAppliedMigration {
    /// Complete the row with the rank and timestamp chosen by the history.
    pub fn into_applied(self, installed_rank: i32, installed_on: DateTime<Utc>) -> AppliedMigration {
        AppliedMigration {
            installed_rank,
            version: self.version,
            description: abbreviate_description(&self.description),
            migration_type: self.migration_type,
            script: self.script,
            checksum: self.checksum,
            installed_on,
            installed_by: self.installed_by,
            execution_time: self.execution_time,
            success: self.success,
        }
    }
}

/// Shorten a description to the length kept in the schema history.
pub fn abbreviate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_LENGTH {
        return description.to_string();
    }
    let kept: String = description.chars().take(MAX_DESCRIPTION_LENGTH - 3).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviate_long_description() {
        let long = "x".repeat(250);
        let short = abbreviate_description(&long);
        assert_eq!(short.chars().count(), MAX_DESCRIPTION_LENGTH);
        assert!(short.ends_with("..."));
        assert_eq!(abbreviate_description("short"), "short");
    }

    #[test]
    fn test_row_serialization() {
        let row = NewAppliedMigration {
            version: Some(Version::parse("1.2").unwrap()),
            description: "add users".to_string(),
            migration_type: MigrationType::Sql,
            script: "V1_2__add_users.sql".to_string(),
            checksum: Some(-42),
            installed_by: "ci".to_string(),
            execution_time: 12,
            success: true,
        }
        .into_applied(3, Utc::now());

        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"type\":\"SQL\""));
        let back: AppliedMigration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
        assert_eq!(back.identifier(), "1.2");
    }
}
