//! MigrateDB Core - schema history reconciliation and migration engine.
//!
//! This crate reconciles the migrations available locally with the ones
//! recorded in a schema history table, derives the state of each migration,
//! validates the two against each other and applies pending migrations.

pub mod callback;
pub mod command;
pub mod config;
pub mod database;
pub mod error;
pub mod history;
pub mod info;
pub mod migratedb;
pub mod migration;
pub mod resolver;
pub mod retry;
pub mod validate;
pub mod version;

pub use callback::{Callback, CallbackExecutor, Event};
pub use command::{BaselineResult, MigrateOutput, MigrateResult, RepairOutput, RepairResult};
pub use config::MigrateConfig;
pub use database::{Database, Session};
pub use error::{BoxError, Error, Result};
pub use history::{HistoryLock, MemorySchemaHistory, SchemaHistory, SledSchemaHistory};
pub use info::{InfoContext, MigrationInfo, MigrationInfoService, VersionContext};
pub use migratedb::MigrateDb;
pub use migration::{
    AppliedMigration, ExecutionContext, MigrationExecutor, MigrationPattern, MigrationState,
    MigrationType, NewAppliedMigration, ResolvedMigration, ValidMatch, ValidatePattern,
};
pub use resolver::{CodeMigration, CodeResolver, CompositeResolver, ResolveContext, Resolver, ScriptResolver};
pub use validate::{ErrorCode, ErrorDetails, ValidateOutput, ValidateResult};
pub use version::Version;
