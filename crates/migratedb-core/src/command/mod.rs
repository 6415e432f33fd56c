//! Commands run against a schema history: migrate, validate, repair and baseline.
//!
//! Each command borrows its collaborators for the duration of one run and
//! returns a serializable result struct.

pub mod baseline;
pub mod migrate;
pub mod repair;
pub mod validate;

pub use self::baseline::{Baseline, BaselineResult};
pub use self::migrate::{Migrate, MigrateOutput, MigrateResult};
pub use self::repair::{Repair, RepairOutput, RepairResult};
pub use self::validate::Validate;

use crate::config::MigrateConfig;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::history::SchemaHistory;
use tracing::info;

/// Create the schema history table, and the managed schemas when allowed.
///
/// When MigrateDB created at least one schema the history starts with a
/// schema marker, so that a later clean knows the schemas are its own.
pub(crate) fn create_history(
    database: &mut dyn Database,
    history: &dyn SchemaHistory,
    config: &MigrateConfig,
) -> Result<()> {
    if history.exists()? {
        return Ok(());
    }

    let created = if config.create_schemas {
        database
            .ensure_schemas(&config.schemas)
            .map_err(|e| Error::database("create schemas", e))?
    } else {
        Vec::new()
    };
    if !created.is_empty() {
        info!(schemas = ?created, "created schemas");
    }

    history.create_if_not_exists()?;
    if !created.is_empty() && !history.has_schemas_marker()? {
        history.add_schemas_marker(&created, config.installed_by())?;
    }
    Ok(())
}
