//! Reconciliation of resolved migrations with the schema history.
//!
//! [`MigrationIndex`] correlates the two inputs, [`reconcile`] derives a
//! [`MigrationState`](crate::migration::MigrationState) for every entry and
//! [`MigrationInfoService`] exposes the sorted result.

pub mod context;
pub mod index;
pub mod migration_info;
pub mod reconcile;
pub mod service;

pub use self::context::{InfoContext, VersionContext};
pub use self::index::{AppliedEntry, MigrationIndex, RepeatableEntry, VersionedEntry};
pub use self::migration_info::MigrationInfo;
pub use self::reconcile::{reconcile, Reconciliation};
pub use self::service::MigrationInfoService;
