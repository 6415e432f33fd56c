//! Persistent schema history backed by a sled tree.

use super::{HistoryLock, SchemaHistory};
use crate::error::{Error, Result};
use crate::migration::{abbreviate_description, AppliedMigration, NewAppliedMigration, ResolvedMigration};
use chrono::Utc;
use tracing::debug;

/// Schema history stored in a sled tree named after the table.
///
/// Rows are JSON values keyed by the big-endian installed rank, so tree
/// order is installed-rank order.
pub struct SledSchemaHistory {
    db: sled::Db,
    table: String,
    tree_name: String,
    lock: HistoryLock,
}

impl SledSchemaHistory {
    /// Prefix of the trees holding history tables.
    pub const TREE_PREFIX: &'static str = "history:";

    /// Attach to the history table `table` in `db`. The table is not created.
    pub fn open(db: sled::Db, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            tree_name: format!("{}{}", Self::TREE_PREFIX, table),
            db,
            table,
            lock: HistoryLock::new(),
        }
    }

    /// Flush changes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self) -> Result<sled::Tree> {
        if !self.exists()? {
            return Err(Error::History {
                table: self.table.clone(),
                message: "table does not exist".to_string(),
            });
        }
        Ok(self.db.open_tree(&self.tree_name)?)
    }

    fn rank_key(rank: i32) -> [u8; 4] {
        rank.to_be_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<AppliedMigration> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl SchemaHistory for SledSchemaHistory {
    fn table(&self) -> &str {
        &self.table
    }

    fn lock(&self) -> &HistoryLock {
        &self.lock
    }

    fn exists(&self) -> Result<bool> {
        let name = self.tree_name.as_bytes();
        Ok(self.db.tree_names().iter().any(|tree| tree.as_ref() == name))
    }

    fn create(&self) -> Result<()> {
        self.db.open_tree(&self.tree_name)?;
        debug!(table = %self.table, tree = %self.tree_name, "opened schema history tree");
        Ok(())
    }

    fn drop_table(&self) -> Result<()> {
        if self.db.drop_tree(&self.tree_name)? {
            debug!(table = %self.table, tree = %self.tree_name, "dropped schema history tree");
        }
        Ok(())
    }

    fn all_applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let tree = self.tree()?;
        let mut rows = Vec::new();
        for result in tree.iter() {
            let (_, value) = result?;
            rows.push(Self::decode(&value)?);
        }
        Ok(rows)
    }

    fn add_applied_migration(&self, row: NewAppliedMigration) -> Result<AppliedMigration> {
        let tree = self.tree()?;
        loop {
            let rank = match tree.last()? {
                Some((_, value)) => Self::decode(&value)?.installed_rank + 1,
                None => 1,
            };
            let applied = row.clone().into_applied(rank, Utc::now());
            let value = serde_json::to_vec(&applied)?;
            let swapped = tree.compare_and_swap(Self::rank_key(rank), None as Option<&[u8]>, Some(value))?;
            if swapped.is_ok() {
                tree.flush()?;
                return Ok(applied);
            }
            // Another writer took the rank first.
        }
    }

    fn update(&self, applied: &AppliedMigration, resolved: &ResolvedMigration) -> Result<()> {
        let tree = self.tree()?;
        let key = Self::rank_key(applied.installed_rank);
        let mut row = match tree.get(key)? {
            Some(value) => Self::decode(&value)?,
            None => {
                return Err(Error::History {
                    table: self.table.clone(),
                    message: format!("no row with installed rank {}", applied.installed_rank),
                })
            }
        };
        row.description = abbreviate_description(resolved.description());
        row.migration_type = resolved.migration_type();
        row.checksum = resolved.checksum();
        tree.insert(key, serde_json::to_vec(&row)?)?;
        tree.flush()?;
        Ok(())
    }

    fn remove(&self, installed_rank: i32) -> Result<()> {
        let tree = self.tree()?;
        tree.remove(Self::rank_key(installed_rank))?;
        tree.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SledSchemaHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledSchemaHistory")
            .field("table", &self.table)
            .field("tree", &self.tree_name)
            .finish_non_exhaustive()
    }
}
