//! Validation of reconciled migrations.
//!
//! Findings are values, not errors: [`ValidateResult`] collects one
//! [`ValidateOutput`] per invalid migration and migrate decides whether to
//! escalate.

use crate::info::MigrationInfo;
use crate::migration::{
    abbreviate_description, AppliedMigration, MigrationState, MigrationType, ResolvedMigration,
    ValidMatch, NO_DESCRIPTION_MARKER,
};
use serde::Serialize;
use std::fmt;

/// What is wrong with a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A repeatable migration failed.
    FailedRepeatableMigration,
    /// A versioned migration failed.
    FailedVersionedMigration,
    /// An applied repeatable migration is no longer resolved.
    AppliedRepeatableMigrationNotResolved,
    /// An applied versioned migration is no longer resolved.
    AppliedVersionedMigrationNotResolved,
    /// A resolved repeatable migration has not been applied.
    ResolvedRepeatableMigrationNotApplied,
    /// A resolved versioned migration has not been applied.
    ResolvedVersionedMigrationNotApplied,
    /// A repeatable migration changed since its last run.
    OutdatedRepeatableMigration,
    /// Applied and resolved types differ.
    TypeMismatch,
    /// Applied and resolved checksums differ.
    ChecksumMismatch,
    /// Applied and resolved descriptions differ.
    DescriptionMismatch,
}

impl ErrorCode {
    /// The code as reported.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FailedRepeatableMigration => "FAILED_REPEATABLE_MIGRATION",
            ErrorCode::FailedVersionedMigration => "FAILED_VERSIONED_MIGRATION",
            ErrorCode::AppliedRepeatableMigrationNotResolved => "APPLIED_REPEATABLE_MIGRATION_NOT_RESOLVED",
            ErrorCode::AppliedVersionedMigrationNotResolved => "APPLIED_VERSIONED_MIGRATION_NOT_RESOLVED",
            ErrorCode::ResolvedRepeatableMigrationNotApplied => "RESOLVED_REPEATABLE_MIGRATION_NOT_APPLIED",
            ErrorCode::ResolvedVersionedMigrationNotApplied => "RESOLVED_VERSIONED_MIGRATION_NOT_APPLIED",
            ErrorCode::OutdatedRepeatableMigration => "OUTDATED_REPEATABLE_MIGRATION",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::ChecksumMismatch => "CHECKSUM_MISMATCH",
            ErrorCode::DescriptionMismatch => "DESCRIPTION_MISMATCH",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    /// Kind of problem.
    pub code: ErrorCode,
    /// Human readable explanation.
    pub message: String,
}

impl ErrorDetails {
    fn new(code: ErrorCode, message: String) -> Self {
        Self { code, message }
    }
}

/// A finding together with the migration it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateOutput {
    /// Version, if versioned.
    pub version: Option<String>,
    /// Description.
    pub description: String,
    /// Where the migration was found, or its recorded script.
    pub file_path: String,
    /// The finding.
    pub details: ErrorDetails,
}

impl ValidateOutput {
    /// Describe a finding for `info`.
    pub fn new(info: &MigrationInfo, details: ErrorDetails) -> Self {
        Self {
            version: info.version().map(ToString::to_string),
            description: info.description().to_string(),
            file_path: info
                .physical_location()
                .unwrap_or_else(|| info.script())
                .to_string(),
            details,
        }
    }
}

/// Outcome of a validate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateResult {
    /// Schema history table validated against.
    pub table: String,
    /// Number of resolved migrations validated.
    pub migrations_validated: usize,
    /// Invalid migrations.
    pub invalid_migrations: Vec<ValidateOutput>,
    /// Non-fatal remarks.
    pub warnings: Vec<String>,
}

impl ValidateResult {
    /// Create a result.
    pub fn new(table: impl Into<String>, migrations_validated: usize, invalid_migrations: Vec<ValidateOutput>) -> Self {
        Self {
            table: table.into(),
            migrations_validated,
            invalid_migrations,
            warnings: Vec::new(),
        }
    }

    /// Whether no invalid migration was found.
    pub fn is_valid(&self) -> bool {
        self.invalid_migrations.is_empty()
    }

    /// The findings' messages, one per line.
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "successfully validated {} migrations against {}",
                self.migrations_validated, self.table
            );
        }
        let mut summary = format!(
            "migrations have failed validation against {}",
            self.table
        );
        for output in &self.invalid_migrations {
            summary.push('\n');
            summary.push_str(&output.details.message);
        }
        summary
    }
}

/// Validate one reconciled migration.
pub fn validate_migration(info: &MigrationInfo) -> Option<ErrorDetails> {
    let state = info.state();
    if matches!(state, MigrationState::AboveTarget | MigrationState::Deleted) {
        return None;
    }

    let settings = &info.context().settings;
    let versioned = info.is_versioned();
    let allowed = |condition: ValidMatch| settings.is_allowed(condition, versioned);
    let identity = identify(info);

    if state.is_failed()
        && !(state == MigrationState::FutureFailed && allowed(ValidMatch::Future))
        && !settings.is_failure_ignored(versioned)
    {
        let code = if versioned {
            ErrorCode::FailedVersionedMigration
        } else {
            ErrorCode::FailedRepeatableMigration
        };
        return Some(ErrorDetails::new(
            code,
            format!(
                "Detected failed migration {}. Please remove any half-completed changes then run repair to fix the schema history.",
                identity
            ),
        ));
    }

    if let Some(applied) = info.applied() {
        if info.resolved().is_none()
            && !applied.migration_type.is_synthetic()
            && state != MigrationState::Superseded
            && !(state.is_missing() && allowed(ValidMatch::Missing))
            && !(state.is_future() && allowed(ValidMatch::Future))
        {
            let code = if versioned {
                ErrorCode::AppliedVersionedMigrationNotResolved
            } else {
                ErrorCode::AppliedRepeatableMigrationNotResolved
            };
            return Some(ErrorDetails::new(
                code,
                format!(
                    "Detected applied migration not resolved locally: {}. If you removed this migration intentionally, run repair to mark the migration as deleted.",
                    identity
                ),
            ));
        }
    }

    let not_applied = if versioned {
        ErrorCode::ResolvedVersionedMigrationNotApplied
    } else {
        ErrorCode::ResolvedRepeatableMigrationNotApplied
    };

    if state == MigrationState::Ignored
        && !info.is_excluded()
        && !allowed(ValidMatch::Ignored)
        && !allowed(ValidMatch::OutOfOrder)
    {
        return Some(ErrorDetails::new(
            not_applied,
            format!(
                "Detected resolved migration not applied to database: {}. To ignore this migration, add an ignore pattern '*:ignored'. To allow executing this migration, enable out of order.",
                identity
            ),
        ));
    }

    if !allowed(ValidMatch::Pending) {
        if state == MigrationState::Pending {
            return Some(ErrorDetails::new(
                not_applied,
                format!(
                    "Detected resolved migration not applied to database: {}. To fix this error, either run migrate, or add an ignore pattern '*:pending'.",
                    identity
                ),
            ));
        }
        if state == MigrationState::Outdated {
            return Some(ErrorDetails::new(
                ErrorCode::OutdatedRepeatableMigration,
                format!(
                    "Detected outdated resolved repeatable migration that should be re-applied to database: {}. Run migrate to execute this migration.",
                    identity
                ),
            ));
        }
    }

    let (Some(resolved), Some(applied)) = (info.resolved(), info.applied()) else {
        return None;
    };
    if applied.migration_type == MigrationType::Delete {
        return None;
    }
    if let Some(version) = info.version() {
        if *version <= info.context().baseline {
            return None;
        }
    }

    if resolved.migration_type() != applied.migration_type {
        return Some(mismatch(
            ErrorCode::TypeMismatch,
            "type",
            &identity,
            applied.migration_type,
            resolved.migration_type(),
        ));
    }

    let compare_checksum = resolved.version().is_some()
        || (allowed(ValidMatch::Pending)
            && !matches!(state, MigrationState::Outdated | MigrationState::Superseded));
    if compare_checksum && !resolved.checksum_matches(applied.checksum) {
        return Some(mismatch(
            ErrorCode::ChecksumMismatch,
            "checksum",
            &identity,
            display_checksum(applied.checksum),
            display_checksum(resolved.checksum()),
        ));
    }

    if description_mismatch(resolved, applied) {
        return Some(mismatch(
            ErrorCode::DescriptionMismatch,
            "description",
            &identity,
            &applied.description,
            resolved.description(),
        ));
    }
    None
}

fn identify(info: &MigrationInfo) -> String {
    match info.version() {
        Some(version) => format!("to version {} ({})", version, info.description()),
        None => format!("'{}'", info.description()),
    }
}

fn mismatch(
    code: ErrorCode,
    what: &str,
    identity: &str,
    applied: impl fmt::Display,
    resolved: impl fmt::Display,
) -> ErrorDetails {
    ErrorDetails::new(
        code,
        format!(
            "Migration {} mismatch for migration {}\n-> Applied to database : {}\n-> Resolved locally    : {}\nEither revert the changes to the migration, or run repair to update the schema history.",
            what, identity, applied, resolved
        ),
    )
}

fn display_checksum(checksum: Option<i32>) -> String {
    checksum.map_or_else(|| "null".to_string(), |c| c.to_string())
}

pub(crate) fn description_mismatch(resolved: &ResolvedMigration, applied: &AppliedMigration) -> bool {
    let resolved = abbreviate_description(resolved.description());
    let applied = applied.description.as_str();
    if resolved == applied {
        return false;
    }
    let empty_marker = |a: &str, b: &str| a.is_empty() && b == NO_DESCRIPTION_MARKER;
    !(empty_marker(&resolved, applied) || empty_marker(applied, &resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrateConfig;
    use crate::info::test_support::{
        applied, applied_typed, reconcile_default, reconcile_with, resolved, resolved_checksum,
        resolved_typed,
    };

    fn codes(infos: &[MigrationInfo]) -> Vec<ErrorCode> {
        infos
            .iter()
            .filter_map(MigrationInfo::validate)
            .map(|details| details.code)
            .collect()
    }

    #[test]
    fn test_pending_whitelist() {
        let resolved_set = || vec![resolved(Some("1"), "init")];

        let infos = reconcile_default(resolved_set(), Vec::new());
        assert_eq!(codes(&infos), vec![ErrorCode::ResolvedVersionedMigrationNotApplied]);

        let config = MigrateConfig::default().with_allowed_match(ValidMatch::Pending);
        let infos = reconcile_with(resolved_set(), Vec::new(), &config).unwrap();
        assert!(codes(&infos).is_empty());
    }

    #[test]
    fn test_failed_migration() {
        let infos = reconcile_default(
            vec![resolved(Some("1"), "one")],
            vec![applied(1, Some("1"), "one", false)],
        );
        assert_eq!(codes(&infos), vec![ErrorCode::FailedVersionedMigration]);
    }

    #[test]
    fn test_future_failed_is_ignored_by_default() {
        let infos = reconcile_default(
            vec![resolved(Some("1"), "one")],
            vec![applied(1, Some("1"), "one", true), applied(2, Some("2"), "two", false)],
        );
        assert!(codes(&infos).is_empty());

        let config = MigrateConfig::default().with_ignore_patterns(Vec::new());
        let infos = reconcile_with(
            vec![resolved(Some("1"), "one")],
            vec![applied(1, Some("1"), "one", true), applied(2, Some("2"), "two", false)],
            &config,
        )
        .unwrap();
        assert_eq!(codes(&infos), vec![ErrorCode::FailedVersionedMigration]);
    }

    #[test]
    fn test_missing_migration() {
        let history = || vec![applied(1, Some("1"), "one", true), applied(2, Some("2"), "two", true)];
        let infos = reconcile_default(vec![resolved(Some("2"), "two")], history());
        assert_eq!(codes(&infos), vec![ErrorCode::AppliedVersionedMigrationNotResolved]);

        let config = MigrateConfig::default().with_allowed_match(ValidMatch::Missing);
        let infos = reconcile_with(vec![resolved(Some("2"), "two")], history(), &config).unwrap();
        assert!(codes(&infos).is_empty());
    }

    #[test]
    fn test_ignored_migration() {
        let infos = reconcile_default(
            vec![resolved(Some("1"), "one"), resolved(Some("2"), "two"), resolved(Some("3"), "three")],
            vec![applied(1, Some("1"), "one", true), applied(2, Some("3"), "three", true)],
        );
        assert_eq!(codes(&infos), vec![ErrorCode::ResolvedVersionedMigrationNotApplied]);
    }

    #[test]
    fn test_checksum_mismatch_prints_both_sides() {
        let infos = reconcile_default(
            vec![resolved_checksum(Some("1"), "one", 42)],
            vec![applied(1, Some("1"), "one", true)],
        );
        let details = infos[0].validate().unwrap();
        assert_eq!(details.code, ErrorCode::ChecksumMismatch);
        assert!(details.message.contains("Applied to database : 1"));
        assert!(details.message.contains("Resolved locally    : 42"));
    }

    #[test]
    fn test_type_and_description_mismatch() {
        let infos = reconcile_default(
            vec![resolved_typed(Some("1"), "one", MigrationType::Code)],
            vec![applied(1, Some("1"), "one", true)],
        );
        assert_eq!(codes(&infos), vec![ErrorCode::TypeMismatch]);

        let infos = reconcile_default(
            vec![resolved(Some("1"), "renamed")],
            vec![applied(1, Some("1"), "one", true)],
        );
        assert_eq!(codes(&infos), vec![ErrorCode::DescriptionMismatch]);
    }

    #[test]
    fn test_no_description_marker_matches_empty() {
        let infos = reconcile_default(
            vec![resolved(Some("1"), "")],
            vec![applied(1, Some("1"), NO_DESCRIPTION_MARKER, true)],
        );
        assert!(codes(&infos).is_empty());
    }

    #[test]
    fn test_outdated_repeatable() {
        let infos = reconcile_default(vec![resolved_checksum(None, "seed", 5)], vec![applied(1, None, "seed", true)]);
        assert_eq!(codes(&infos), vec![ErrorCode::OutdatedRepeatableMigration]);

        let config = MigrateConfig::default().with_allowed_match(ValidMatch::Pending);
        let infos = reconcile_with(vec![resolved_checksum(None, "seed", 5)], vec![applied(1, None, "seed", true)], &config)
            .unwrap();
        assert!(codes(&infos).is_empty());
    }

    #[test]
    fn test_mismatch_at_or_below_baseline_is_ignored() {
        let infos = reconcile_default(
            vec![resolved_checksum(Some("1"), "one", 42), resolved(Some("2"), "two")],
            vec![
                applied_typed(1, Some("1"), "base", MigrationType::Baseline),
                applied(2, Some("2"), "two", true),
            ],
        );
        assert!(codes(&infos).is_empty());
    }

    #[test]
    fn test_summary() {
        let infos = reconcile_default(vec![resolved(Some("1"), "init")], Vec::new());
        let outputs: Vec<ValidateOutput> = infos
            .iter()
            .filter_map(|i| i.validate().map(|d| ValidateOutput::new(i, d)))
            .collect();
        let result = ValidateResult::new("history", 1, outputs);
        assert!(!result.is_valid());
        assert!(result.summary().contains("version 1 (init)"));
        assert_eq!(result.invalid_migrations[0].file_path, "V1__init.sql");
    }
}
