//! Navigable migration index.
//!
//! Correlates resolved and applied migrations: versioned migrations by
//! version, repeatable migrations by description. Built in one pass over the
//! resolved list and two passes over the history (delete markers, then
//! out-of-order detection), all derived values computed up front.

use crate::error::{Error, Result};
use crate::migration::{AppliedMigration, MigrationType, ResolvedMigration};
use crate::version::Version;
use std::collections::BTreeMap;

/// A history row with the attributes derived while indexing.
#[derive(Debug, Clone)]
pub struct AppliedEntry {
    /// The row.
    pub migration: AppliedMigration,
    /// A later DELETE marker removed this row logically.
    pub deleted: bool,
    /// Applied after a higher version had already been applied.
    pub out_of_order: bool,
}

impl AppliedEntry {
    fn new(migration: AppliedMigration) -> Self {
        Self {
            migration,
            deleted: false,
            out_of_order: false,
        }
    }
}

/// Everything known about one version.
#[derive(Debug, Clone, Default)]
pub struct VersionedEntry {
    /// The incremental (`V`) migration at this version.
    pub resolved_incremental: Option<ResolvedMigration>,
    /// The baseline (`B`) migration at this version.
    pub resolved_baseline: Option<ResolvedMigration>,
    /// History rows at this version, in rank order. DELETE markers excluded.
    pub applied: Vec<AppliedEntry>,
}

impl VersionedEntry {
    /// Applied rows that have not been deleted.
    pub fn live(&self) -> impl Iterator<Item = &AppliedEntry> {
        self.applied.iter().filter(|entry| !entry.deleted)
    }

    /// Whether a live row consumes the resolved baseline migration.
    pub fn baseline_applied(&self) -> bool {
        self.live()
            .any(|entry| entry.migration.migration_type.is_baseline_migration())
    }

    /// Whether a live row consumes the resolved incremental migration.
    pub fn incremental_applied(&self) -> bool {
        self.live()
            .any(|entry| !entry.migration.migration_type.is_baseline_migration())
    }
}

/// Everything known about one repeatable migration.
#[derive(Debug, Clone, Default)]
pub struct RepeatableEntry {
    /// The resolved migration with this description.
    pub resolved: Option<ResolvedMigration>,
    /// Runs of this migration, in rank order.
    pub applied: Vec<AppliedEntry>,
}

impl RepeatableEntry {
    /// The most recent run that has not been deleted.
    pub fn latest_run(&self) -> Option<&AppliedEntry> {
        self.applied.iter().rev().find(|entry| !entry.deleted)
    }
}

/// Resolved and applied migrations correlated by version and description.
#[derive(Debug, Clone, Default)]
pub struct MigrationIndex {
    versioned: BTreeMap<Version, VersionedEntry>,
    repeatable: BTreeMap<String, RepeatableEntry>,
    schema_markers: Vec<AppliedMigration>,
    baseline: Option<Version>,
    last_applied: Option<Version>,
    has_applied: bool,
}

impl MigrationIndex {
    /// Build the index. `applied` must be in installed rank order.
    pub fn build(resolved: Vec<ResolvedMigration>, applied: Vec<AppliedMigration>) -> Result<Self> {
        let mut index = Self::default();
        for migration in resolved {
            index.add_resolved(migration)?;
        }
        index.add_applied(applied)?;
        index.mark_out_of_order();
        index.compute_pointers();
        Ok(index)
    }

    fn add_resolved(&mut self, migration: ResolvedMigration) -> Result<()> {
        let Some(version) = migration.version().cloned() else {
            let entry = self
                .repeatable
                .entry(migration.description().to_string())
                .or_default();
            if let Some(existing) = &entry.resolved {
                return Err(Error::DuplicateRepeatableMigration {
                    description: migration.description().to_string(),
                    first: existing.physical_location().to_string(),
                    second: migration.physical_location().to_string(),
                });
            }
            entry.resolved = Some(migration);
            return Ok(());
        };

        let entry = self.versioned.entry(version.clone()).or_default();
        let slot = if migration.migration_type().is_baseline_migration() {
            &mut entry.resolved_baseline
        } else {
            &mut entry.resolved_incremental
        };
        if let Some(existing) = slot {
            return Err(Error::DuplicateVersionedMigration {
                version: version.to_string(),
                first: existing.physical_location().to_string(),
                second: migration.physical_location().to_string(),
            });
        }
        *slot = Some(migration);
        Ok(())
    }

    fn add_applied(&mut self, applied: Vec<AppliedMigration>) -> Result<()> {
        for row in applied {
            if row.migration_type == MigrationType::Delete {
                if row.success {
                    self.mark_deleted(&row)?;
                }
                continue;
            }
            if row.migration_type != MigrationType::Schema {
                self.has_applied = true;
            }
            match row.version.clone() {
                Some(version) => self
                    .versioned
                    .entry(version)
                    .or_default()
                    .applied
                    .push(AppliedEntry::new(row)),
                None if row.migration_type == MigrationType::Schema => {
                    self.schema_markers.push(row)
                }
                None => self
                    .repeatable
                    .entry(row.description.clone())
                    .or_default()
                    .applied
                    .push(AppliedEntry::new(row)),
            }
        }
        Ok(())
    }

    fn mark_deleted(&mut self, marker: &AppliedMigration) -> Result<()> {
        let runs = match &marker.version {
            Some(version) => self.versioned.get_mut(version).map(|e| &mut e.applied),
            None => self
                .repeatable
                .get_mut(&marker.description)
                .map(|e| &mut e.applied),
        };
        // A marker without a matching row is left over from a removed failure.
        let Some(runs) = runs.filter(|runs| !runs.is_empty()) else {
            return Ok(());
        };
        match runs.iter_mut().rev().find(|entry| !entry.deleted) {
            Some(target) => {
                target.deleted = true;
                Ok(())
            }
            None => Err(Error::DuplicateDeletedMigration {
                migration: marker.identifier(),
                installed_rank: marker.installed_rank,
            }),
        }
    }

    fn mark_out_of_order(&mut self) {
        let mut rows: Vec<&mut AppliedEntry> = self
            .versioned
            .values_mut()
            .flat_map(|entry| entry.applied.iter_mut())
            .collect();
        rows.sort_by_key(|entry| entry.migration.installed_rank);

        let mut highest: Option<Version> = None;
        for entry in rows {
            if entry.deleted {
                continue;
            }
            let Some(version) = entry.migration.version.as_ref() else {
                continue;
            };
            match &highest {
                Some(max) if version <= max => entry.out_of_order = true,
                _ => highest = Some(version.clone()),
            }
        }
    }

    fn compute_pointers(&mut self) {
        self.last_applied = self
            .versioned
            .iter()
            .rev()
            .find(|(_, entry)| entry.live().next().is_some())
            .map(|(version, _)| version.clone());

        self.baseline = self
            .versioned
            .values()
            .flat_map(|entry| entry.live())
            .filter(|entry| entry.migration.success && entry.migration.migration_type.is_baseline())
            .max_by_key(|entry| entry.migration.installed_rank)
            .and_then(|entry| entry.migration.version.clone());
    }

    /// Versioned entries, ascending by version.
    pub fn versioned(&self) -> &BTreeMap<Version, VersionedEntry> {
        &self.versioned
    }

    /// Repeatable entries, ascending by description.
    pub fn repeatable(&self) -> &BTreeMap<String, RepeatableEntry> {
        &self.repeatable
    }

    /// Schema creation markers.
    pub fn schema_markers(&self) -> &[AppliedMigration] {
        &self.schema_markers
    }

    /// Version of the latest successful baseline row.
    pub fn baseline(&self) -> Option<&Version> {
        self.baseline.as_ref()
    }

    /// Highest version with a row that has not been deleted.
    pub fn last_applied(&self) -> Option<&Version> {
        self.last_applied.as_ref()
    }

    /// Whether the history holds anything besides schema markers.
    pub fn has_applied(&self) -> bool {
        self.has_applied
    }

    /// Highest resolved version, incremental or baseline.
    pub fn latest_resolved(&self) -> Option<&Version> {
        self.versioned
            .iter()
            .rev()
            .find(|(_, entry)| entry.resolved_incremental.is_some() || entry.resolved_baseline.is_some())
            .map(|(version, _)| version)
    }

    /// First resolved incremental version above the last applied one.
    pub fn next_resolved(&self) -> Option<&Version> {
        let floor = self.last_applied.clone().unwrap_or(Version::EMPTY);
        self.versioned
            .iter()
            .find(|(version, entry)| **version > floor && entry.resolved_incremental.is_some())
            .map(|(version, _)| version)
    }

    /// Per description, the rank of the latest run.
    pub fn latest_repeatable_runs(&self) -> BTreeMap<String, i32> {
        self.repeatable
            .iter()
            .filter_map(|(description, entry)| {
                entry
                    .latest_run()
                    .map(|run| (description.clone(), run.migration.installed_rank))
            })
            .collect()
    }
}
