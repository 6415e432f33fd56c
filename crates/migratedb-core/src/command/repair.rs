//! The repair command.
//!
//! Repair brings the schema history back in line with the resolved
//! migrations: failed rows are removed, rows of migrations that no longer
//! resolve are marked deleted, and applied rows take over the checksum,
//! description and type of their resolved counterpart.

use crate::callback::{CallbackExecutor, Event};
use crate::config::MigrateConfig;
use crate::error::Result;
use crate::history::SchemaHistory;
use crate::info::{InfoContext, MigrationInfo, MigrationInfoService};
use crate::migration::{AppliedMigration, MigrationState};
use crate::resolver::Resolver;
use crate::validate::description_mismatch;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// A schema history row touched by repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutput {
    /// Version, if versioned.
    pub version: Option<String>,
    /// Description.
    pub description: String,
    /// Installed rank of the row.
    pub installed_rank: i32,
}

impl From<&AppliedMigration> for RepairOutput {
    fn from(row: &AppliedMigration) -> Self {
        Self {
            version: row.version.as_ref().map(ToString::to_string),
            description: row.description.clone(),
            installed_rank: row.installed_rank,
        }
    }
}

/// Outcome of a repair run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairResult {
    /// Failed rows that were removed.
    pub removed: Vec<RepairOutput>,
    /// Rows marked as deleted.
    pub deleted: Vec<RepairOutput>,
    /// Rows realigned with their resolved migration.
    pub aligned: Vec<RepairOutput>,
}

impl RepairResult {
    /// Whether repair changed nothing.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.deleted.is_empty() && self.aligned.is_empty()
    }
}

/// Repairs the schema history.
pub struct Repair<'a> {
    history: &'a dyn SchemaHistory,
    resolver: &'a dyn Resolver,
    config: &'a MigrateConfig,
    callbacks: &'a CallbackExecutor,
}

impl<'a> Repair<'a> {
    /// Create a repair run.
    pub fn new(
        history: &'a dyn SchemaHistory,
        resolver: &'a dyn Resolver,
        config: &'a MigrateConfig,
        callbacks: &'a CallbackExecutor,
    ) -> Self {
        Self {
            history,
            resolver,
            config,
            callbacks,
        }
    }

    /// Run repair.
    pub fn run(self) -> Result<RepairResult> {
        self.callbacks.on_event(Event::BeforeRepair)?;
        let mut result = RepairResult::default();
        if !self.history.exists()? {
            info!(table = self.history.table(), "schema history table does not exist, nothing to repair");
            self.callbacks.on_event(Event::AfterRepair)?;
            return Ok(result);
        }

        {
            let history = self.history;
            let _guard = history.lock().acquire();
            let settings = InfoContext::for_repair(self.config);

            let removed = history.remove_failed_migrations(&|row: &AppliedMigration| {
                !settings.is_failure_ignored(row.version.is_some())
            })?;
            result.removed = removed.iter().map(RepairOutput::from).collect();

            let mut service = MigrationInfoService::new(self.resolver, history, self.config, settings);
            service.refresh()?;
            result.deleted = self.delete_missing(&service)?;
            result.aligned = self.align_applied(&service)?;
        }

        if result.is_empty() {
            info!(table = self.history.table(), "schema history table is already consistent");
        } else {
            info!(
                table = self.history.table(),
                removed = result.removed.len() as u64,
                deleted = result.deleted.len() as u64,
                aligned = result.aligned.len() as u64,
                "Successfully repaired schema history table"
            );
        }
        self.callbacks.on_event(Event::AfterRepair)?;
        Ok(result)
    }

    /// Mark rows of migrations that no longer resolve as deleted.
    ///
    /// Rows newer than every resolved migration are kept: they belong to a
    /// newer release, not to a removed migration.
    fn delete_missing(&self, service: &MigrationInfoService<'_>) -> Result<Vec<RepairOutput>> {
        let resolved_repeatables: HashSet<&str> = service
            .resolved_migrations()
            .into_iter()
            .filter(|m| m.is_repeatable())
            .map(|m| m.description())
            .collect();

        let mut deleted = Vec::new();
        for info in service.all() {
            let Some(applied) = info.applied() else {
                continue;
            };
            if info.resolved().is_some() || applied.migration_type.is_synthetic() {
                continue;
            }
            let missing = match info.state() {
                MigrationState::MissingSuccess | MigrationState::MissingFailed => true,
                MigrationState::Superseded => !resolved_repeatables.contains(applied.description.as_str()),
                _ => false,
            };
            if !missing {
                continue;
            }
            debug!(migration = %applied.identifier(), rank = applied.installed_rank, "marking migration as deleted");
            self.history.delete(applied, self.config.installed_by())?;
            deleted.push(RepairOutput::from(applied));
        }
        Ok(deleted)
    }

    /// Copy checksum, description and type of resolved migrations onto their rows.
    fn align_applied(&self, service: &MigrationInfoService<'_>) -> Result<Vec<RepairOutput>> {
        let mut aligned = Vec::new();
        for info in service.all() {
            if !needs_alignment(info) {
                continue;
            }
            let (Some(resolved), Some(applied)) = (info.resolved(), info.applied()) else {
                continue;
            };
            debug!(migration = %applied.identifier(), rank = applied.installed_rank, "aligning applied migration");
            self.history.update(applied, resolved)?;
            aligned.push(RepairOutput::from(applied));
        }
        Ok(aligned)
    }
}

fn needs_alignment(info: &MigrationInfo) -> bool {
    let (Some(resolved), Some(applied)) = (info.resolved(), info.applied()) else {
        return false;
    };
    if applied.migration_type.is_synthetic() || info.state() == MigrationState::Ignored {
        return false;
    }

    let checksum_differs = !resolved.checksum_matches(applied.checksum);
    let other_differs =
        description_mismatch(resolved, applied) || resolved.migration_type() != applied.migration_type;
    if resolved.is_repeatable() {
        // A changed repeatable checksum means the migration must run again.
        !checksum_differs && other_differs
    } else {
        checksum_differs || other_differs
    }
}
