//! Migration types and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a migration, as recorded in the schema history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// Marker row recording that MigrateDB created the managed schemas.
    Schema,
    /// Marker row recording a baseline of an existing schema.
    Baseline,
    /// Marker row logically removing an earlier history entry.
    Delete,
    /// A SQL script migration.
    Sql,
    /// A SQL script baseline migration.
    SqlBaseline,
    /// A migration implemented in Rust code.
    Code,
    /// A baseline migration implemented in Rust code.
    CodeBaseline,
    /// A migration produced by a custom resolver.
    Custom,
    /// A baseline migration produced by a custom resolver.
    CustomBaseline,
}

impl MigrationType {
    /// Types that only ever appear as schema history rows, never as resolved migrations.
    pub fn is_synthetic(self) -> bool {
        matches!(
            self,
            MigrationType::Schema | MigrationType::Baseline | MigrationType::Delete
        )
    }

    /// Whether this is an authored baseline migration (`B` script or equivalent).
    pub fn is_baseline_migration(self) -> bool {
        matches!(
            self,
            MigrationType::SqlBaseline | MigrationType::CodeBaseline | MigrationType::CustomBaseline
        )
    }

    /// Whether a history row of this type establishes a baseline.
    pub fn is_baseline(self) -> bool {
        self == MigrationType::Baseline || self.is_baseline_migration()
    }

    /// The name used in the schema history table.
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationType::Schema => "SCHEMA",
            MigrationType::Baseline => "BASELINE",
            MigrationType::Delete => "DELETE",
            MigrationType::Sql => "SQL",
            MigrationType::SqlBaseline => "SQL_BASELINE",
            MigrationType::Code => "CODE",
            MigrationType::CodeBaseline => "CODE_BASELINE",
            MigrationType::Custom => "CUSTOM",
            MigrationType::CustomBaseline => "CUSTOM_BASELINE",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciled lifecycle state of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// Resolved and waiting to be applied.
    Pending,
    /// Resolved but above the configured target.
    AboveTarget,
    /// Resolved but at or below the baseline.
    BelowBaseline,
    /// The baseline of this schema.
    Baseline,
    /// Resolved but will not be applied.
    Ignored,
    /// Applied successfully, no longer resolved, older than the latest resolved version.
    MissingSuccess,
    /// Failed, no longer resolved, older than the latest resolved version.
    MissingFailed,
    /// Applied successfully.
    Success,
    /// Applied and failed.
    Failed,
    /// Applied successfully after a newer version had already been applied.
    OutOfOrder,
    /// Applied successfully, newer than anything resolved.
    FutureSuccess,
    /// Failed, newer than anything resolved.
    FutureFailed,
    /// Repeatable migration whose resolved checksum changed since its last run.
    Outdated,
    /// Earlier run of a repeatable migration that has run again since.
    Superseded,
    /// Logically removed from the schema history.
    Deleted,
}

impl MigrationState {
    /// Display name used in reports.
    pub fn display_name(self) -> &'static str {
        match self {
            MigrationState::Pending => "Pending",
            MigrationState::AboveTarget => "Above Target",
            MigrationState::BelowBaseline => "Below Baseline",
            MigrationState::Baseline => "Baseline",
            MigrationState::Ignored => "Ignored",
            MigrationState::MissingSuccess => "Missing",
            MigrationState::MissingFailed => "Failed (Missing)",
            MigrationState::Success => "Success",
            MigrationState::Failed => "Failed",
            MigrationState::OutOfOrder => "Out of Order",
            MigrationState::FutureSuccess => "Future",
            MigrationState::FutureFailed => "Failed (Future)",
            MigrationState::Outdated => "Outdated",
            MigrationState::Superseded => "Superseded",
            MigrationState::Deleted => "Deleted",
        }
    }

    /// Whether a migration in this state is resolvable locally.
    pub fn is_resolved(self) -> bool {
        !matches!(
            self,
            MigrationState::MissingSuccess
                | MigrationState::MissingFailed
                | MigrationState::FutureSuccess
                | MigrationState::FutureFailed
                | MigrationState::Deleted
        )
    }

    /// Whether a migration in this state has a row in the schema history.
    pub fn is_applied(self) -> bool {
        !matches!(
            self,
            MigrationState::Pending
                | MigrationState::AboveTarget
                | MigrationState::BelowBaseline
                | MigrationState::Ignored
        )
    }

    /// Whether the recorded attempt failed.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            MigrationState::Failed | MigrationState::FutureFailed | MigrationState::MissingFailed
        )
    }

    /// Applied, but newer than any resolved migration.
    pub fn is_future(self) -> bool {
        matches!(
            self,
            MigrationState::FutureSuccess | MigrationState::FutureFailed
        )
    }

    /// Applied, but no longer resolved.
    pub fn is_missing(self) -> bool {
        matches!(
            self,
            MigrationState::MissingSuccess | MigrationState::MissingFailed
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
