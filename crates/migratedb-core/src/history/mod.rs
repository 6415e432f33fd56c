//! Schema history: the append-only ledger of applied migrations.
//!
//! Backends implement the storage primitives; markers, creation retries and
//! the DELETE bookkeeping are shared default methods.

pub mod lock;
pub mod memory;
pub mod sled_history;

pub use self::lock::{HistoryLock, HistoryLockGuard};
pub use self::memory::MemorySchemaHistory;
pub use self::sled_history::SledSchemaHistory;

use crate::error::Result;
use crate::migration::{AppliedMigration, MigrationType, NewAppliedMigration, ResolvedMigration};
use crate::retry::{self, CREATE_RETRIES, CREATE_RETRY_DELAY};
use crate::version::Version;
use tracing::{debug, info};

/// Description of the row recording schema creation.
pub const SCHEMA_MARKER_DESCRIPTION: &str = "<< MigrateDB Schema Creation >>";

/// Storage for the schema history table.
pub trait SchemaHistory: Send + Sync {
    /// Name of the history table.
    fn table(&self) -> &str;

    /// The lock serializing migrate, repair and baseline runs on this table.
    fn lock(&self) -> &HistoryLock;

    /// Whether the table exists.
    fn exists(&self) -> Result<bool>;

    /// Create the table.
    fn create(&self) -> Result<()>;

    /// Drop the table with every row.
    fn drop_table(&self) -> Result<()>;

    /// Every row, ordered by installed rank.
    fn all_applied_migrations(&self) -> Result<Vec<AppliedMigration>>;

    /// Append a row at one past the highest installed rank.
    fn add_applied_migration(&self, row: NewAppliedMigration) -> Result<AppliedMigration>;

    /// Overwrite description, type and checksum of a row with the resolved values.
    fn update(&self, applied: &AppliedMigration, resolved: &ResolvedMigration) -> Result<()>;

    /// Physically remove the row with the given rank.
    fn remove(&self, installed_rank: i32) -> Result<()>;

    /// Create the table unless it exists, retrying races between concurrent initializers.
    fn create_if_not_exists(&self) -> Result<()> {
        retry::with_fixed_backoff("create schema history", CREATE_RETRIES, CREATE_RETRY_DELAY, || {
            if self.exists()? {
                return Ok(());
            }
            info!(table = self.table(), "creating schema history table");
            self.create()
        })
    }

    /// Remove failed rows for which `should_remove` holds. Returns the removed rows.
    fn remove_failed_migrations(
        &self,
        should_remove: &dyn Fn(&AppliedMigration) -> bool,
    ) -> Result<Vec<AppliedMigration>> {
        let failed: Vec<AppliedMigration> = self
            .all_applied_migrations()?
            .into_iter()
            .filter(|row| !row.success && should_remove(row))
            .collect();
        for row in &failed {
            debug!(table = self.table(), rank = row.installed_rank, migration = %row.identifier(), "removing failed migration");
            self.remove(row.installed_rank)?;
        }
        Ok(failed)
    }

    /// Logically delete an applied migration by appending a DELETE marker for it.
    fn delete(&self, applied: &AppliedMigration, installed_by: &str) -> Result<AppliedMigration> {
        self.add_applied_migration(NewAppliedMigration {
            version: applied.version.clone(),
            description: applied.description.clone(),
            migration_type: MigrationType::Delete,
            script: applied.script.clone(),
            checksum: applied.checksum,
            installed_by: installed_by.to_string(),
            execution_time: 0,
            success: true,
        })
    }

    /// The baseline marker or applied baseline migration, if any.
    fn baseline_marker(&self) -> Result<Option<AppliedMigration>> {
        Ok(self
            .all_applied_migrations()?
            .into_iter()
            .rev()
            .find(|row| row.migration_type.is_baseline()))
    }

    /// Whether the first row records that MigrateDB created the schemas.
    fn has_schemas_marker(&self) -> Result<bool> {
        Ok(self
            .all_applied_migrations()?
            .first()
            .is_some_and(|row| row.migration_type == MigrationType::Schema))
    }

    /// Whether any row other than a schema or baseline marker exists.
    fn has_applied_migrations(&self) -> Result<bool> {
        Ok(self.all_applied_migrations()?.iter().any(|row| {
            !matches!(
                row.migration_type,
                MigrationType::Schema | MigrationType::Baseline
            )
        }))
    }

    /// Record that MigrateDB created `schemas`.
    fn add_schemas_marker(&self, schemas: &[String], installed_by: &str) -> Result<AppliedMigration> {
        let script = schemas
            .iter()
            .map(|schema| format!("\"{}\"", schema))
            .collect::<Vec<_>>()
            .join(",");
        self.add_applied_migration(NewAppliedMigration {
            version: None,
            description: SCHEMA_MARKER_DESCRIPTION.to_string(),
            migration_type: MigrationType::Schema,
            script,
            checksum: None,
            installed_by: installed_by.to_string(),
            execution_time: 0,
            success: true,
        })
    }

    /// Record a baseline at `version`.
    fn add_baseline_marker(
        &self,
        version: &Version,
        description: &str,
        installed_by: &str,
    ) -> Result<AppliedMigration> {
        self.add_applied_migration(NewAppliedMigration {
            version: Some(version.clone()),
            description: description.to_string(),
            migration_type: MigrationType::Baseline,
            script: description.to_string(),
            checksum: None,
            installed_by: installed_by.to_string(),
            execution_time: 0,
            success: true,
        })
    }
}

impl dyn SchemaHistory + '_ {
    /// Run `f` while holding the history lock.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.lock().with(f)
    }
}
