//! In-process schema history.

use super::{HistoryLock, SchemaHistory};
use crate::error::{Error, Result};
use crate::migration::{abbreviate_description, AppliedMigration, NewAppliedMigration, ResolvedMigration};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Schema history kept in memory. Useful for embedded databases and tests.
#[derive(Debug)]
pub struct MemorySchemaHistory {
    table: String,
    lock: HistoryLock,
    rows: RwLock<Option<BTreeMap<i32, AppliedMigration>>>,
}

impl MemorySchemaHistory {
    /// Create a history whose table does not exist yet.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            lock: HistoryLock::new(),
            rows: RwLock::new(None),
        }
    }

    /// Create a history pre-populated with rows, as if written by an earlier run.
    pub fn with_rows(table: impl Into<String>, rows: Vec<AppliedMigration>) -> Self {
        let history = Self::new(table);
        *history.rows.write() = Some(rows.into_iter().map(|r| (r.installed_rank, r)).collect());
        history
    }

    fn missing(&self) -> Error {
        Error::History {
            table: self.table.clone(),
            message: "table does not exist".to_string(),
        }
    }
}

impl SchemaHistory for MemorySchemaHistory {
    fn table(&self) -> &str {
        &self.table
    }

    fn lock(&self) -> &HistoryLock {
        &self.lock
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.rows.read().is_some())
    }

    fn create(&self) -> Result<()> {
        let mut rows = self.rows.write();
        if rows.is_none() {
            *rows = Some(BTreeMap::new());
        }
        Ok(())
    }

    fn drop_table(&self) -> Result<()> {
        *self.rows.write() = None;
        Ok(())
    }

    fn all_applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        Ok(self
            .rows
            .read()
            .as_ref()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn add_applied_migration(&self, row: NewAppliedMigration) -> Result<AppliedMigration> {
        let mut guard = self.rows.write();
        let rows = guard.as_mut().ok_or_else(|| self.missing())?;
        let rank = rows.keys().next_back().map_or(1, |last| last + 1);
        let applied = row.into_applied(rank, Utc::now());
        rows.insert(rank, applied.clone());
        Ok(applied)
    }

    fn update(&self, applied: &AppliedMigration, resolved: &ResolvedMigration) -> Result<()> {
        let mut guard = self.rows.write();
        let rows = guard.as_mut().ok_or_else(|| self.missing())?;
        let row = rows
            .get_mut(&applied.installed_rank)
            .ok_or_else(|| Error::History {
                table: self.table.clone(),
                message: format!("no row with installed rank {}", applied.installed_rank),
            })?;
        row.description = abbreviate_description(resolved.description());
        row.migration_type = resolved.migration_type();
        row.checksum = resolved.checksum();
        Ok(())
    }

    fn remove(&self, installed_rank: i32) -> Result<()> {
        let mut guard = self.rows.write();
        let rows = guard.as_mut().ok_or_else(|| self.missing())?;
        rows.remove(&installed_rank);
        Ok(())
    }
}
