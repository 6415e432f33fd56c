//! Resolved migrations and the executor contract.

use super::types::MigrationType;
use crate::config::MigrateConfig;
use crate::database::Session;
use crate::error::BoxError;
use crate::version::Version;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Everything an executor can touch while applying a migration.
pub struct ExecutionContext<'a> {
    /// Session the migration runs on. Its current schema is the default schema.
    pub session: &'a mut dyn Session,
    /// The schema the session was switched to.
    pub schema: &'a str,
    /// Active configuration.
    pub config: &'a MigrateConfig,
}

/// Executes one resolved migration.
pub trait MigrationExecutor: Send + Sync {
    /// Apply the migration.
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), BoxError>;

    /// Whether the migration may run inside a transaction.
    fn can_execute_in_transaction(&self) -> bool {
        true
    }

    /// Whether the migration should run at all. Migrations opting out are reported as ignored.
    fn should_execute(&self) -> bool {
        true
    }
}

/// A migration found by a resolver.
///
/// Identity is `(checksum, equivalent_checksum, description, script, type)`;
/// the executor does not take part in equality.
#[derive(Clone)]
pub struct ResolvedMigration {
    version: Option<Version>,
    description: String,
    script: String,
    checksum: Option<i32>,
    equivalent_checksum: Option<i32>,
    migration_type: MigrationType,
    physical_location: String,
    executor: Arc<dyn MigrationExecutor>,
}

impl ResolvedMigration {
    /// Create a resolved migration. A `None` version makes it repeatable.
    pub fn new(
        version: Option<Version>,
        description: impl Into<String>,
        script: impl Into<String>,
        checksum: Option<i32>,
        migration_type: MigrationType,
        executor: Arc<dyn MigrationExecutor>,
    ) -> Self {
        let script = script.into();
        Self {
            version,
            description: description.into(),
            physical_location: script.clone(),
            script,
            checksum,
            equivalent_checksum: checksum,
            migration_type,
            executor,
        }
    }

    /// Set the checksum computed before placeholder replacement.
    pub fn with_equivalent_checksum(mut self, checksum: Option<i32>) -> Self {
        self.equivalent_checksum = checksum;
        self
    }

    /// Set where the migration was found.
    pub fn with_physical_location(mut self, location: impl Into<String>) -> Self {
        self.physical_location = location.into();
        self
    }

    /// Version, or `None` for a repeatable migration.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Script name recorded in the schema history.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Checksum after placeholder replacement.
    pub fn checksum(&self) -> Option<i32> {
        self.checksum
    }

    /// Checksum before placeholder replacement.
    pub fn equivalent_checksum(&self) -> Option<i32> {
        self.equivalent_checksum
    }

    /// Migration type.
    pub fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    /// Where the migration was found.
    pub fn physical_location(&self) -> &str {
        &self.physical_location
    }

    /// The executor.
    pub fn executor(&self) -> &Arc<dyn MigrationExecutor> {
        &self.executor
    }

    /// Whether this is a repeatable migration.
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    /// Whether an applied checksum matches either checksum of this migration.
    pub fn checksum_matches(&self, applied: Option<i32>) -> bool {
        self.checksum == applied
            || (self.equivalent_checksum.is_some() && self.equivalent_checksum == applied)
    }
}

impl PartialEq for ResolvedMigration {
    fn eq(&self, other: &Self) -> bool {
        self.checksum == other.checksum
            && self.equivalent_checksum == other.equivalent_checksum
            && self.description == other.description
            && self.script == other.script
            && self.migration_type == other.migration_type
    }
}

impl Eq for ResolvedMigration {}

impl Hash for ResolvedMigration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.checksum.hash(state);
        self.equivalent_checksum.hash(state);
        self.description.hash(state);
        self.script.hash(state);
        self.migration_type.hash(state);
    }
}

impl fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("script", &self.script)
            .field("checksum", &self.checksum)
            .field("equivalent_checksum", &self.equivalent_checksum)
            .field("migration_type", &self.migration_type)
            .field("physical_location", &self.physical_location)
            .finish_non_exhaustive()
    }
}
