//! Migration data model.
//!
//! Resolved migrations come from resolvers, applied migrations from the
//! schema history. Both are passive values; the reconciliation in
//! [`crate::info`] correlates them.

pub mod applied;
pub mod pattern;
pub mod resolved;
pub mod types;

pub use applied::{abbreviate_description, AppliedMigration, NewAppliedMigration, NO_DESCRIPTION_MARKER};
pub use pattern::{MigrationPattern, PatternKind, PatternState, ValidMatch, ValidatePattern};
pub use resolved::{ExecutionContext, MigrationExecutor, ResolvedMigration};
pub use types::{MigrationState, MigrationType};
