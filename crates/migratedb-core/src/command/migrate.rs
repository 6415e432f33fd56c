//! The apply loop.
//!
//! Each iteration refreshes the reconciliation, refuses to continue past a
//! failed migration, and applies the next group of pending migrations: one
//! migration, or everything pending when grouping is enabled. A group runs in
//! a single transaction when all of its migrations can.

use crate::callback::{CallbackExecutor, Event};
use crate::config::MigrateConfig;
use crate::database::{Database, Session};
use crate::error::{Error, Result};
use crate::history::SchemaHistory;
use crate::info::{InfoContext, MigrationInfo, MigrationInfoService};
use crate::migration::{
    ExecutionContext, MigrationState, MigrationType, NewAppliedMigration, ResolvedMigration, ValidMatch,
};
use crate::resolver::Resolver;
use crate::version::Version;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One migration applied by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrateOutput {
    /// `Versioned` or `Repeatable`.
    pub category: String,
    /// Version, if versioned.
    pub version: Option<String>,
    /// Description.
    pub description: String,
    /// Migration type.
    pub migration_type: MigrationType,
    /// Where the migration was found.
    pub file_path: String,
    /// Execution time in milliseconds.
    pub execution_time: i32,
}

/// Outcome of a migrate run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrateResult {
    /// The default schema.
    pub schema_name: String,
    /// Schema version before the run, `None` for an empty schema.
    pub initial_schema_version: Option<String>,
    /// Schema version after the run, `None` for an empty schema.
    pub target_schema_version: Option<String>,
    /// Applied migrations, in application order.
    pub migrations: Vec<MigrateOutput>,
    /// Number of applied migrations.
    pub migrations_executed: usize,
    /// Non-fatal remarks.
    pub warnings: Vec<String>,
    /// Whether the run completed.
    pub success: bool,
}

/// A pending migration selected for the current group.
struct Step {
    info: MigrationInfo,
    resolved: ResolvedMigration,
    out_of_order: bool,
}

/// A failed step, with the history row describing the failed attempt when
/// the executor itself failed.
struct Failure {
    error: Error,
    row: Option<NewAppliedMigration>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self { error, row: None }
    }
}

/// Applies pending migrations.
pub struct Migrate<'a> {
    database: &'a mut dyn Database,
    history: &'a dyn SchemaHistory,
    resolver: &'a dyn Resolver,
    config: &'a MigrateConfig,
    callbacks: &'a CallbackExecutor,
    applied_in_run: HashSet<ResolvedMigration>,
    previous_versioned: bool,
    schema_version: Version,
    result: MigrateResult,
}

impl<'a> Migrate<'a> {
    /// Create a migrate run. The schema history table must exist.
    pub fn new(
        database: &'a mut dyn Database,
        history: &'a dyn SchemaHistory,
        resolver: &'a dyn Resolver,
        config: &'a MigrateConfig,
        callbacks: &'a CallbackExecutor,
    ) -> Self {
        Self {
            database,
            history,
            resolver,
            config,
            callbacks,
            applied_in_run: HashSet::new(),
            previous_versioned: true,
            schema_version: Version::EMPTY,
            result: MigrateResult {
                schema_name: config.default_schema().to_string(),
                ..MigrateResult::default()
            },
        }
    }

    /// Apply every pending migration up to the target.
    ///
    /// The session's current schema is switched back to what it was before
    /// the run, whether or not the run succeeds.
    pub fn run(mut self) -> Result<MigrateResult> {
        let started = Instant::now();
        let original_schema = self
            .session()
            .current_schema()
            .map_err(|e| Error::database("read current schema", e))?;
        let outcome = self.migrate_all();
        if let Err(err) = self.session().change_current_schema_to(&original_schema) {
            warn!(schema = %original_schema, error = %err, "failed to restore current schema");
        }
        match outcome {
            Ok(()) => {
                self.callbacks.on_event(Event::AfterMigrate)?;
                self.log_summary(started);
                self.result.success = true;
                Ok(self.result)
            }
            Err(err) => {
                if let Err(callback) = self.callbacks.on_event(Event::AfterMigrateError) {
                    warn!(error = %callback, "afterMigrateError callback failed");
                }
                Err(err)
            }
        }
    }

    fn migrate_all(&mut self) -> Result<()> {
        self.callbacks.on_event(Event::BeforeMigrate)?;

        let history = self.history;
        let _run_guard = self.config.group.then(|| history.lock().acquire());
        let mut first_run = true;
        loop {
            let count = {
                let _guard = history.lock().acquire();
                self.migrate_group(first_run)?
            };
            first_run = false;
            self.result.migrations_executed += count;
            if count == 0 || self.config.target == Some(Version::NEXT) {
                break;
            }
        }
        self.result.target_schema_version = version_text(&self.schema_version);

        if self.previous_versioned {
            self.callbacks.on_event(Event::AfterVersioned)?;
        }
        Ok(())
    }

    /// Refresh, check for blockers and apply the next group. Returns the number applied.
    fn migrate_group(&mut self, first_run: bool) -> Result<usize> {
        let config = self.config;
        let schema = config.default_schema();
        let settings = InfoContext::from_config(config);
        let mut service = MigrationInfoService::new(self.resolver, self.history, config, settings.clone());
        service.refresh()?;
        let current_version = service.current_version();

        if first_run {
            info!(schema, version = %current_version, "current version of schema");
            self.result.initial_schema_version = version_text(&current_version);
            self.schema_version = current_version.clone();
            if config.out_of_order {
                self.warn(format!(
                    "outOfOrder mode is active. Migration of schema {} may not be reproducible.",
                    schema
                ));
            }
        }

        if first_run && !service.future().is_empty() {
            self.warn_future(&service, &current_version);
        }

        let failed = service.failed();
        if let Some(first) = failed.first() {
            let tolerated = failed.len() == 1
                && first.state() == MigrationState::FutureFailed
                && settings.is_allowed(ValidMatch::Future, true);
            if !tolerated {
                return Err(Error::FailedMigration {
                    schema: schema.to_string(),
                    what: match first.version() {
                        Some(version) => format!("migration to version {}", version),
                        None => format!("repeatable migration ('{}')", first.description()),
                    },
                });
            }
            if first_run {
                self.warn(format!(
                    "Schema {} contains a failed future migration to version {}",
                    schema,
                    first.version().map(ToString::to_string).unwrap_or_default()
                ));
            }
        }

        let limit = if config.group { usize::MAX } else { 1 };
        let group: Vec<Step> = service
            .pending()
            .into_iter()
            .filter_map(|info| {
                let resolved = info.resolved()?;
                if self.applied_in_run.contains(resolved) {
                    return None;
                }
                let out_of_order = info.version().is_some_and(|v| *v < current_version);
                Some(Step {
                    info: info.clone(),
                    resolved: resolved.clone(),
                    out_of_order,
                })
            })
            .take(limit)
            .collect();

        if group.is_empty() {
            return Ok(0);
        }
        self.apply_group(&group)?;
        Ok(group.len())
    }

    fn warn_future(&mut self, service: &MigrationInfoService<'_>, current_version: &Version) {
        let schema = self.config.default_schema();
        let latest = service
            .resolved_migrations()
            .into_iter()
            .rev()
            .find_map(ResolvedMigration::version)
            .cloned();
        match latest {
            Some(latest) => self.warn(format!(
                "Schema {} has a version ({}) that is newer than the latest available migration ({})",
                schema, current_version, latest
            )),
            None => {
                let message = format!(
                    "Schema {} has version {}, but no migration could be resolved in the configured locations",
                    schema, current_version
                );
                error!("{}", message);
                self.result.warnings.push(message);
            }
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.result.warnings.push(message);
    }

    /// Whether the group runs inside one transaction.
    fn transaction_mode(&self, group: &[Step]) -> Result<bool> {
        let mut steps = group.iter();
        let Some(first) = steps.next() else {
            return Ok(true);
        };
        let mut in_transaction = first.info.can_execute_in_transaction();
        for step in steps {
            let can = step.info.can_execute_in_transaction();
            if can != in_transaction && !self.config.mixed {
                return Err(Error::MixedTransactionModes {
                    migration: step.resolved.script().to_string(),
                });
            }
            in_transaction &= can;
        }

        if in_transaction && group.len() > 1 && !self.database.supports_multi_statement_transactions() {
            debug!(size = group.len() as u64, "database cannot group statements in one transaction");
            return Ok(false);
        }
        Ok(in_transaction)
    }

    fn apply_group(&mut self, group: &[Step]) -> Result<()> {
        let in_transaction = self.transaction_mode(group)?;
        if in_transaction {
            self.session()
                .begin()
                .map_err(|e| Error::database("begin transaction", e))?;
        }

        let mut buffered = Vec::new();
        for step in group {
            match self.apply_migration(step, in_transaction) {
                Ok(row) if in_transaction => buffered.push(row),
                Ok(row) => {
                    self.history.add_applied_migration(row)?;
                }
                Err(failure) => return Err(self.fail_group(failure, in_transaction, buffered)),
            }
        }

        if in_transaction {
            self.record_and_commit(buffered)?;
        }
        Ok(())
    }

    /// Write the rows of a transactional group, then commit. Rows already
    /// written are removed again when either step fails.
    fn record_and_commit(&mut self, rows: Vec<NewAppliedMigration>) -> Result<()> {
        let mut written = Vec::with_capacity(rows.len());
        let mut outcome = Ok(());
        for row in rows {
            match self.history.add_applied_migration(row) {
                Ok(applied) => written.push(applied.installed_rank),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        if outcome.is_ok() {
            outcome = self
                .session()
                .commit()
                .map_err(|e| Error::database("commit", e));
        }

        if outcome.is_err() {
            self.rollback();
            for rank in written {
                if let Err(err) = self.history.remove(rank) {
                    error!(rank, error = %err, "failed to remove schema history row");
                }
            }
        }
        outcome
    }

    fn fail_group(&mut self, failure: Failure, in_transaction: bool, buffered: Vec<NewAppliedMigration>) -> Error {
        let Failure { error, row } = failure;
        if in_transaction {
            self.rollback();
        }

        let failed = error
            .migration()
            .map(|info| migration_text(info, error_out_of_order(&error)))
            .unwrap_or_else(|| "migration group".to_string());
        if in_transaction && self.database.supports_ddl_transactions() {
            error!("Migration of {} failed! Changes successfully rolled back.", failed);
            return error;
        }

        // Changes already made cannot be undone, so the history records them.
        for applied in buffered {
            if let Err(err) = self.history.add_applied_migration(applied) {
                error!(error = %err, "failed to record applied migration");
            }
        }
        if let Some(row) = row {
            error!(
                "Migration of {} failed! Please restore backups and roll back database and code!",
                failed
            );
            if let Err(err) = self.history.add_applied_migration(row) {
                error!(error = %err, "failed to record failed migration");
            }
        }
        error
    }

    /// Run one migration and return its history row.
    fn apply_migration(&mut self, step: &Step, in_transaction: bool) -> std::result::Result<NewAppliedMigration, Failure> {
        if self.previous_versioned && step.resolved.version().is_none() {
            self.callbacks.on_event(Event::AfterVersioned)?;
            self.callbacks.on_event(Event::BeforeRepeatables)?;
            self.previous_versioned = false;
        }

        let started = Instant::now();
        if self.config.skip_executing_migrations {
            debug!(migration = %step.info, "skipping execution");
        } else if let Err(error) = self.execute(step, in_transaction) {
            let row = error
                .migration()
                .map(|_| self.history_row(&step.resolved, elapsed_ms(started), false));
            return Err(Failure { error, row });
        }

        let execution_time = elapsed_ms(started);
        self.applied_in_run.insert(step.resolved.clone());
        if let Some(version) = step.resolved.version() {
            if *version > self.schema_version {
                self.schema_version = version.clone();
            }
        }
        self.result.migrations.push(MigrateOutput {
            category: if step.resolved.is_repeatable() { "Repeatable" } else { "Versioned" }.to_string(),
            version: step.resolved.version().map(ToString::to_string),
            description: step.resolved.description().to_string(),
            migration_type: step.resolved.migration_type(),
            file_path: step.resolved.physical_location().to_string(),
            execution_time,
        });
        Ok(self.history_row(&step.resolved, execution_time, true))
    }

    fn execute(&mut self, step: &Step, in_transaction: bool) -> Result<()> {
        let config = self.config;
        let schema = config.default_schema();
        {
            let session = self.session();
            session
                .restore_original_state()
                .map_err(|e| Error::database("restore session state", e))?;
            session
                .change_current_schema_to(schema)
                .map_err(|e| Error::database(format!("change current schema to {}", schema), e))?;
        }

        self.callbacks.on_each(Event::BeforeEachMigrate, &step.info)?;
        info!(
            schema,
            "Migrating schema \"{}\" to {}",
            schema,
            migration_text(&step.info, step.out_of_order)
        );

        let executed = {
            let mut context = ExecutionContext {
                session: self.session(),
                schema,
                config,
            };
            step.resolved.executor().execute(&mut context)
        };
        if let Err(source) = executed {
            if let Err(callback) = self.callbacks.on_each(Event::AfterEachMigrateError, &step.info) {
                warn!(error = %callback, "afterEachMigrateError callback failed");
            }
            return Err(Error::Migrate {
                info: Box::new(step.info.clone()),
                out_of_order: step.out_of_order,
                executable_in_transaction: in_transaction,
                message: format!("migration {} failed: {}", step.resolved.script(), source),
                source: Some(source),
            });
        }

        if self.database.uses_single_session() {
            self.session()
                .restore_original_state()
                .map_err(|e| Error::database("restore session state", e))?;
        }
        self.callbacks.on_each(Event::AfterEachMigrate, &step.info)?;
        Ok(())
    }

    fn history_row(&self, resolved: &ResolvedMigration, execution_time: i32, success: bool) -> NewAppliedMigration {
        NewAppliedMigration {
            version: resolved.version().cloned(),
            description: resolved.description().to_string(),
            migration_type: resolved.migration_type(),
            script: resolved.script().to_string(),
            checksum: resolved.checksum(),
            installed_by: self.config.installed_by().to_string(),
            execution_time,
            success,
        }
    }

    fn session(&mut self) -> &mut dyn Session {
        self.database.migration_session()
    }

    fn rollback(&mut self) {
        if let Err(err) = self.session().rollback() {
            error!(error = %err, "rollback failed");
        }
    }

    fn log_summary(&self, started: Instant) {
        let schema = &self.result.schema_name;
        let count = self.result.migrations_executed;
        if count == 0 {
            info!(schema = %schema, "Schema \"{}\" is up to date. No migration necessary.", schema);
            return;
        }
        let version = self
            .result
            .target_schema_version
            .as_deref()
            .unwrap_or(Version::EMPTY.as_str());
        info!(
            schema = %schema,
            count = count as u64,
            version,
            elapsed_ms = elapsed_ms(started),
            "Successfully applied {} migration(s) to schema \"{}\", now at version v{}",
            count,
            schema,
            version
        );
    }
}

fn version_text(version: &Version) -> Option<String> {
    (*version != Version::EMPTY).then(|| version.to_string())
}

fn error_out_of_order(error: &Error) -> bool {
    matches!(error, Error::Migrate { out_of_order: true, .. })
}

fn migration_text(info: &MigrationInfo, out_of_order: bool) -> String {
    let text = match info.version() {
        Some(version) => format!("version \"{}\"", version),
        None => format!("repeatable migration \"{}\"", info.description()),
    };
    let text = if info.is_versioned() && !info.description().is_empty() {
        format!("{} - {}", text, info.description())
    } else {
        text
    };
    if out_of_order {
        format!("{} [out of order]", text)
    } else {
        text
    }
}

fn elapsed_ms(started: Instant) -> i32 {
    i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX)
}
