//! The `MigrateDb` entry point.

use crate::callback::{Callback, CallbackExecutor};
use crate::command::{
    create_history, Baseline, BaselineResult, Migrate, MigrateResult, Repair, RepairResult, Validate,
};
use crate::config::MigrateConfig;
use crate::database::Database;
use crate::error::{BoxError, Error, Result};
use crate::history::SchemaHistory;
use crate::info::{InfoContext, MigrationInfoService};
use crate::resolver::{CompositeResolver, Resolver};
use crate::retry;
use crate::validate::ValidateResult;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs commands for one database and one schema history table.
pub struct MigrateDb {
    config: MigrateConfig,
    database: Box<dyn Database>,
    history: Arc<dyn SchemaHistory>,
    resolver: CompositeResolver,
    callbacks: CallbackExecutor,
}

impl MigrateDb {
    /// Create an instance with no resolvers and no callbacks.
    pub fn new(config: MigrateConfig, database: Box<dyn Database>, history: Arc<dyn SchemaHistory>) -> Self {
        Self {
            config,
            database,
            history,
            resolver: CompositeResolver::new(),
            callbacks: CallbackExecutor::new(),
        }
    }

    /// Create an instance, obtaining the database from `factory`.
    ///
    /// Failed attempts are retried `connect_retries` times with exponential
    /// backoff capped at `connect_retries_interval`.
    pub fn connect<F>(config: MigrateConfig, history: Arc<dyn SchemaHistory>, mut factory: F) -> Result<Self>
    where
        F: FnMut() -> std::result::Result<Box<dyn Database>, BoxError>,
    {
        let database = retry::with_exponential_backoff(
            "connect to database",
            config.connect_retries,
            config.connect_retries_interval,
            || factory().map_err(|e| Error::database("connect", e)),
        )?;
        Ok(Self::new(config, database, history))
    }

    /// Add a migration resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver.add(resolver);
        self
    }

    /// Register a lifecycle callback.
    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.register(callback);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// The schema history.
    pub fn history(&self) -> &dyn SchemaHistory {
        self.history.as_ref()
    }

    /// Reconcile resolved and applied migrations.
    pub fn info(&self) -> Result<MigrationInfoService<'_>> {
        let mut service = MigrationInfoService::new(
            &self.resolver,
            self.history.as_ref(),
            &self.config,
            InfoContext::from_config(&self.config),
        );
        service.refresh()?;
        Ok(service)
    }

    /// Validate resolved migrations against the schema history.
    pub fn validate(&self) -> Result<ValidateResult> {
        Validate::new(self.history.as_ref(), &self.resolver, &self.config, &self.callbacks).run()
    }

    /// Apply pending migrations.
    ///
    /// Validates first when `validate_on_migrate` is set, pending migrations
    /// tolerated. A schema without history table is baselined when it is not
    /// empty and `baseline_on_migrate` is set.
    pub fn migrate(&mut self) -> Result<MigrateResult> {
        let history = self.history.as_ref();
        let config = &self.config;

        if config.validate_on_migrate {
            let result = Validate::new(history, &self.resolver, config, &self.callbacks)
                .allow_pending(true)
                .run()?;
            if !result.is_valid() {
                if !config.clean_on_validation_error {
                    return Err(Error::Validation(result));
                }
                warn!(schemas = ?config.schemas, "validation failed, cleaning schemas");
                self.database
                    .clean(&config.schemas)
                    .map_err(|e| Error::database("clean", e))?;
                history.drop_table()?;
            }
        }

        if !history.exists()? {
            let schema = config.default_schema();
            let empty = self
                .database
                .is_schema_empty(schema)
                .map_err(|e| Error::database(format!("inspect schema {}", schema), e))?;
            if empty {
                create_history(&mut *self.database, history, config)?;
            } else if config.baseline_on_migrate {
                info!(schema, "baselining non-empty schema without schema history table");
                Baseline::new(&mut *self.database, history, config, &self.callbacks).run()?;
            } else {
                return Err(Error::Baseline {
                    table: history.table().to_string(),
                    reason: format!(
                        "found non-empty schema {} without schema history table; run baseline or enable baseline_on_migrate",
                        schema
                    ),
                });
            }
        }

        Migrate::new(&mut *self.database, history, &self.resolver, config, &self.callbacks).run()
    }

    /// Repair the schema history.
    pub fn repair(&self) -> Result<RepairResult> {
        Repair::new(self.history.as_ref(), &self.resolver, &self.config, &self.callbacks).run()
    }

    /// Baseline the schema at `baseline_version`.
    pub fn baseline(&mut self) -> Result<BaselineResult> {
        Baseline::new(&mut *self.database, self.history.as_ref(), &self.config, &self.callbacks).run()
    }
}

impl std::fmt::Debug for MigrateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrateDb")
            .field("table", &self.history.table())
            .field("resolver", &self.resolver)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::RecordingDatabase;
    use crate::history::MemorySchemaHistory;
    use crate::info::test_support::resolver;
    use crate::migration::MigrationState;
    use std::cell::Cell;
    use std::time::Duration;

    fn migratedb(config: MigrateConfig, database: RecordingDatabase) -> MigrateDb {
        MigrateDb::new(config, Box::new(database), Arc::new(MemorySchemaHistory::new("history")))
            .with_resolver(Arc::new(resolver(&[Some("1"), Some("2")])))
    }

    #[test]
    fn test_migrate_then_info() {
        let mut db = migratedb(MigrateConfig::default(), RecordingDatabase::new());
        let result = db.migrate().unwrap();
        assert_eq!(result.migrations_executed, 2);

        let info = db.info().unwrap();
        assert!(info.pending().is_empty());
        assert!(info.all().iter().any(|i| i.state() == MigrationState::Success));
        assert!(db.validate().unwrap().is_valid());
    }

    #[test]
    fn test_non_empty_schema_requires_baseline() {
        let mut database = RecordingDatabase::new();
        database.empty = false;
        let mut db = migratedb(MigrateConfig::default(), database);
        assert!(matches!(db.migrate(), Err(Error::Baseline { .. })));
    }

    #[test]
    fn test_baseline_on_migrate() {
        let mut database = RecordingDatabase::new();
        database.empty = false;
        let config = MigrateConfig::default().with_baseline_on_migrate(true);
        let mut db = migratedb(config, database);

        let result = db.migrate().unwrap();
        assert_eq!(result.migrations_executed, 1);
        assert_eq!(result.initial_schema_version.as_deref(), Some("1"));

        let info = db.info().unwrap();
        let states: Vec<MigrationState> = info.all().iter().map(|i| i.state()).collect();
        assert!(states.contains(&MigrationState::Baseline));
        assert!(info.pending().is_empty());
        assert!(db.validate().unwrap().is_valid());
    }

    #[test]
    fn test_connect_retries() {
        let attempts = Cell::new(0);
        let config = MigrateConfig::default().with_connect_retries(3, Duration::from_millis(1));
        let db = MigrateDb::connect(config, Arc::new(MemorySchemaHistory::new("history")), || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                return Err("connection refused".into());
            }
            Ok(Box::new(RecordingDatabase::new()) as Box<dyn Database>)
        });
        assert!(db.is_ok());
        assert_eq!(attempts.get(), 3);
    }
}
