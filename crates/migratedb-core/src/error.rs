//! Core error types.

use crate::info::MigrationInfo;
use crate::validate::ValidateResult;
use thiserror::Error;

/// Error type returned by collaborators (executors, sessions, vendor backends).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// MigrateDB errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A version string could not be parsed.
    #[error("invalid version '{text}': {reason}")]
    InvalidVersionFormat {
        /// The rejected text.
        text: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two resolved migrations claim the same version.
    #[error("found more than one migration with version {version}\nOffenders:\n-> {first}\n-> {second}")]
    DuplicateVersionedMigration {
        /// The contested version.
        version: String,
        /// Location of the first migration.
        first: String,
        /// Location of the second migration.
        second: String,
    },

    /// Two resolved repeatable migrations share a description.
    #[error("found more than one repeatable migration with description '{description}'\nOffenders:\n-> {first}\n-> {second}")]
    DuplicateRepeatableMigration {
        /// The contested description.
        description: String,
        /// Location of the first migration.
        first: String,
        /// Location of the second migration.
        second: String,
    },

    /// A DELETE marker targets an applied migration that is already deleted.
    #[error("corrupted schema history: migration {migration} is marked as deleted more than once (installed rank {installed_rank})")]
    DuplicateDeletedMigration {
        /// Version or description of the migration.
        migration: String,
        /// Rank of the offending DELETE marker.
        installed_rank: i32,
    },

    /// Only a baseline migration resolves at a version that cannot be baselined.
    #[error("pending baseline migration at version {version} has no incremental counterpart and cannot be applied to a non-empty schema history")]
    PendingBaselineOnlyMigration {
        /// The version of the baseline migration.
        version: String,
    },

    /// The configured target version matches no migration.
    #[error("no migration with a target version {target} could be found. Ensure target is specified correctly and the migration exists")]
    TargetVersionNotFound {
        /// The configured target.
        target: String,
    },

    /// The schema history contains a failed migration that blocks migrate.
    #[error("schema {schema} contains a failed {what}; run repair after removing any half-completed changes")]
    FailedMigration {
        /// The schema being migrated.
        schema: String,
        /// Human readable description of the failed migration.
        what: String,
    },

    /// Applying a migration failed.
    #[error("{message}")]
    Migrate {
        /// The migration that failed.
        info: Box<MigrationInfo>,
        /// Whether the migration was applied out of order.
        out_of_order: bool,
        /// Whether the migration was able to run inside a transaction.
        executable_in_transaction: bool,
        /// Description of the failure.
        message: String,
        /// Underlying executor or database error.
        #[source]
        source: Option<BoxError>,
    },

    /// A group mixes transactional and non-transactional migrations.
    #[error("detected both transactional and non-transactional migrations within the same migration group (even though mixed is false). First offending migration: {migration}")]
    MixedTransactionModes {
        /// The first migration that disagreed with the group.
        migration: String,
    },

    /// Validation found problems and migrate was asked to fail on them.
    #[error("validate failed: {}", .0.summary())]
    Validation(ValidateResult),

    /// A script name does not follow the naming convention.
    #[error("invalid migration name '{name}': {reason}")]
    InvalidMigrationName {
        /// The file name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An ignore or cherry-pick pattern could not be parsed.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Baseline could not be applied.
    #[error("unable to baseline schema history table {table}: {reason}")]
    Baseline {
        /// The schema history table.
        table: String,
        /// Why baseline was refused.
        reason: String,
    },

    /// A resolver could not load migrations.
    #[error("unable to resolve migrations from {location}: {message}")]
    Resolver {
        /// Where the resolver was looking.
        location: String,
        /// What went wrong.
        message: String,
    },

    /// A callback failed.
    #[error("callback {callback} failed on {event}")]
    Callback {
        /// The event being handled.
        event: String,
        /// Name of the callback.
        callback: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// A database or session operation failed.
    #[error("database error: {context}")]
    Database {
        /// The operation that failed.
        context: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// Schema history table access failed.
    #[error("schema history table {table}: {message}")]
    History {
        /// The schema history table.
        table: String,
        /// What went wrong.
        message: String,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Row serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a collaborator error raised by a database or session call.
    pub fn database(context: impl Into<String>, source: BoxError) -> Self {
        Error::Database {
            context: context.into(),
            source,
        }
    }

    /// The migration attached to a [`Error::Migrate`] failure.
    pub fn migration(&self) -> Option<&MigrationInfo> {
        match self {
            Error::Migrate { info, .. } => Some(info),
            _ => None,
        }
    }

    /// Whether retrying the same operation might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Storage(_) | Error::Io(_) | Error::History { .. }
        )
    }
}
