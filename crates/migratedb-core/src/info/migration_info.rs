//! The reconciled view of one migration.

use super::context::VersionContext;
use crate::migration::{AppliedMigration, MigrationState, MigrationType, ResolvedMigration};
use crate::validate::{self, ErrorDetails};
use crate::version::Version;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A resolved migration, an applied migration, or both, with its computed state.
///
/// Recomputed wholesale on every refresh; never mutated in place.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    resolved: Option<ResolvedMigration>,
    applied: Option<AppliedMigration>,
    state: MigrationState,
    out_of_order: bool,
    excluded: bool,
    context: Arc<VersionContext>,
}

impl MigrationInfo {
    pub(crate) fn new(
        resolved: Option<ResolvedMigration>,
        applied: Option<AppliedMigration>,
        state: MigrationState,
        context: Arc<VersionContext>,
    ) -> Self {
        debug_assert!(resolved.is_some() || applied.is_some());
        Self {
            resolved,
            applied,
            state,
            out_of_order: false,
            excluded: false,
            context,
        }
    }

    pub(crate) fn with_out_of_order(mut self, out_of_order: bool) -> Self {
        self.out_of_order = out_of_order;
        self
    }

    pub(crate) fn with_excluded(mut self, excluded: bool) -> Self {
        self.excluded = excluded;
        self
    }

    /// The resolved migration, if any.
    pub fn resolved(&self) -> Option<&ResolvedMigration> {
        self.resolved.as_ref()
    }

    /// The history row, if any.
    pub fn applied(&self) -> Option<&AppliedMigration> {
        self.applied.as_ref()
    }

    /// Computed state.
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Version, or `None` for repeatable migrations and schema markers.
    pub fn version(&self) -> Option<&Version> {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => applied.version.as_ref(),
            (None, Some(resolved)) => resolved.version(),
            (None, None) => None,
        }
    }

    /// Whether this is a versioned migration.
    pub fn is_versioned(&self) -> bool {
        self.version().is_some()
    }

    /// Description, as recorded if applied.
    pub fn description(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.description,
            (None, Some(resolved)) => resolved.description(),
            (None, None) => "",
        }
    }

    /// Script name, as recorded if applied.
    pub fn script(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.script,
            (None, Some(resolved)) => resolved.script(),
            (None, None) => "",
        }
    }

    /// Migration type, as recorded if applied.
    pub fn migration_type(&self) -> MigrationType {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => applied.migration_type,
            (None, Some(resolved)) => resolved.migration_type(),
            (None, None) => MigrationType::Sql,
        }
    }

    /// Checksum, as recorded if applied.
    pub fn checksum(&self) -> Option<i32> {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => applied.checksum,
            (None, Some(resolved)) => resolved.checksum(),
            (None, None) => None,
        }
    }

    /// Installed rank, if applied.
    pub fn installed_rank(&self) -> Option<i32> {
        self.applied.as_ref().map(|a| a.installed_rank)
    }

    /// When the migration was applied.
    pub fn installed_on(&self) -> Option<DateTime<Utc>> {
        self.applied.as_ref().map(|a| a.installed_on)
    }

    /// Who applied the migration.
    pub fn installed_by(&self) -> Option<&str> {
        self.applied.as_ref().map(|a| a.installed_by.as_str())
    }

    /// Execution time in milliseconds, if applied.
    pub fn execution_time(&self) -> Option<i32> {
        self.applied.as_ref().map(|a| a.execution_time)
    }

    /// Where the resolved migration was found.
    pub fn physical_location(&self) -> Option<&str> {
        self.resolved.as_ref().map(ResolvedMigration::physical_location)
    }

    /// Whether the row was applied after a higher version.
    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    /// Whether the migration is skipped by its executor or by cherry-picking.
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Whether the migration may run inside a transaction.
    pub fn can_execute_in_transaction(&self) -> bool {
        self.resolved
            .as_ref()
            .map_or(true, |r| r.executor().can_execute_in_transaction())
    }

    /// Whether the executor wants to run at all.
    pub fn should_execute(&self) -> bool {
        self.resolved
            .as_ref()
            .map_or(true, |r| r.executor().should_execute())
    }

    /// The snapshot this info was computed against.
    pub fn context(&self) -> &VersionContext {
        &self.context
    }

    /// Problems validation reports for this migration.
    pub fn validate(&self) -> Option<ErrorDetails> {
        validate::validate_migration(self)
    }

    /// Compare two infos by execution order.
    ///
    /// Unapplied below-baseline entries come first, then everything with an
    /// installed rank ordered by rank, then the remaining entries by version
    /// with repeatable migrations last, ordered by description. Below-baseline
    /// entries also precede unapplied entries of lower version, which keeps
    /// the order total.
    pub fn execution_order(&self, other: &Self) -> Ordering {
        self.order_group()
            .cmp(&other.order_group())
            .then_with(|| match (self.installed_rank(), other.installed_rank()) {
                (Some(left), Some(right)) => left.cmp(&right),
                _ => compare_versions(self, other),
            })
    }

    fn order_group(&self) -> u8 {
        if self.state == MigrationState::BelowBaseline && self.applied.is_none() {
            0
        } else if self.applied.is_some() {
            1
        } else {
            2
        }
    }
}

fn compare_versions(left: &MigrationInfo, right: &MigrationInfo) -> Ordering {
    match (left.version(), right.version()) {
        (Some(a), Some(b)) => a.cmp(b).then_with(|| {
            let a_baseline = left.migration_type().is_baseline_migration();
            let b_baseline = right.migration_type().is_baseline_migration();
            b_baseline.cmp(&a_baseline)
        }),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.description().cmp(right.description()),
    }
}

impl fmt::Display for MigrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(version) => write!(f, "version {}", version)?,
            None => write!(f, "repeatable")?,
        }
        if !self.description().is_empty() {
            write!(f, " - {}", self.description())?;
        }
        Ok(())
    }
}
