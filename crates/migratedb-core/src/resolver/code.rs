//! Migrations written as Rust code.

use super::{ResolveContext, Resolver};
use crate::error::{BoxError, Error, Result};
use crate::migration::{ExecutionContext, MigrationExecutor, MigrationType, ResolvedMigration};
use crate::version::Version;
use std::fmt;
use std::sync::Arc;

type MigrateFn = dyn Fn(&mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync;

/// A migration implemented by a closure.
#[derive(Clone)]
pub struct CodeMigration {
    version: Option<Version>,
    description: String,
    baseline: bool,
    checksum: Option<i32>,
    script: Option<String>,
    transactional: bool,
    should_execute: bool,
    run: Arc<MigrateFn>,
}

impl CodeMigration {
    fn build<F>(version: Option<Version>, description: &str, baseline: bool, run: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            version,
            description: description.to_string(),
            baseline,
            checksum: None,
            script: None,
            transactional: true,
            should_execute: true,
            run: Arc::new(run),
        }
    }

    /// A versioned migration.
    pub fn versioned<F>(version: &str, description: &str, run: F) -> Result<Self>
    where
        F: Fn(&mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Ok(Self::build(Some(numeric(version)?), description, false, run))
    }

    /// A baseline migration, applied instead of every versioned migration at or below it on an empty schema.
    pub fn baseline<F>(version: &str, description: &str, run: F) -> Result<Self>
    where
        F: Fn(&mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Ok(Self::build(Some(numeric(version)?), description, true, run))
    }

    /// A repeatable migration.
    pub fn repeatable<F>(description: &str, run: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::build(None, description, false, run)
    }

    /// Set the checksum. Repeatable code migrations rerun when it changes.
    pub fn with_checksum(mut self, checksum: i32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Override the script name recorded in the schema history.
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Run outside of any transaction.
    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Set whether the migration runs at all.
    pub fn with_should_execute(mut self, should_execute: bool) -> Self {
        self.should_execute = should_execute;
        self
    }

    fn script_name(&self) -> String {
        if let Some(script) = &self.script {
            return script.clone();
        }
        let prefix = match (&self.version, self.baseline) {
            (None, _) => "R",
            (Some(_), true) => "B",
            (Some(_), false) => "V",
        };
        let version = self
            .version
            .as_ref()
            .map(|v| v.as_str().replace('.', "_"))
            .unwrap_or_default();
        format!("{}{}__{}", prefix, version, self.description.replace(' ', "_"))
    }

    fn to_resolved(&self) -> ResolvedMigration {
        let migration_type = if self.baseline {
            MigrationType::CodeBaseline
        } else {
            MigrationType::Code
        };
        let script = self.script_name();
        ResolvedMigration::new(
            self.version.clone(),
            self.description.clone(),
            script.clone(),
            self.checksum,
            migration_type,
            Arc::new(CodeExecutor {
                run: self.run.clone(),
                transactional: self.transactional,
                should_execute: self.should_execute,
            }),
        )
        .with_physical_location(format!("code:{}", script))
    }
}

impl fmt::Debug for CodeMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("baseline", &self.baseline)
            .field("checksum", &self.checksum)
            .field("transactional", &self.transactional)
            .finish_non_exhaustive()
    }
}

fn numeric(text: &str) -> Result<Version> {
    let version = Version::parse(text)?;
    if version.is_sentinel() {
        return Err(Error::InvalidVersionFormat {
            text: text.to_string(),
            reason: "code migrations need a numeric version".to_string(),
        });
    }
    Ok(version)
}

struct CodeExecutor {
    run: Arc<MigrateFn>,
    transactional: bool,
    should_execute: bool,
}

impl MigrationExecutor for CodeExecutor {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> {
        (self.run)(context)
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.transactional
    }

    fn should_execute(&self) -> bool {
        self.should_execute
    }
}

/// Resolves a fixed list of [`CodeMigration`]s.
#[derive(Debug, Clone, Default)]
pub struct CodeResolver {
    migrations: Vec<CodeMigration>,
}

impl CodeResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration.
    pub fn add(&mut self, migration: CodeMigration) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    /// Add a migration, builder style.
    pub fn with(mut self, migration: CodeMigration) -> Self {
        self.migrations.push(migration);
        self
    }
}

impl Resolver for CodeResolver {
    fn resolve_migrations(&self, _context: &ResolveContext<'_>) -> Result<Vec<ResolvedMigration>> {
        Ok(self.migrations.iter().map(CodeMigration::to_resolved).collect())
    }
}
