//! Database capability traits.
//!
//! The core never talks to a driver directly. A backend implements
//! [`Database`] for connection-wide operations and hands out a [`Session`]
//! for the connection migrations run on.

use crate::error::BoxError;

/// A connection migrations and history updates run on.
pub trait Session: Send {
    /// The schema the session currently resolves unqualified names against.
    fn current_schema(&mut self) -> Result<String, BoxError>;

    /// Switch the current schema.
    fn change_current_schema_to(&mut self, schema: &str) -> Result<(), BoxError>;

    /// Undo any session state changed by migrations (current schema, settings).
    fn restore_original_state(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Open a transaction.
    fn begin(&mut self) -> Result<(), BoxError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), BoxError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), BoxError>;

    /// Execute a script as a whole.
    fn execute_script(&mut self, script: &str) -> Result<(), BoxError>;
}

/// Connection-wide capabilities of a database backend.
pub trait Database: Send {
    /// Whether DDL statements take part in transactions.
    fn supports_ddl_transactions(&self) -> bool;

    /// Whether a transaction may span several statements.
    fn supports_multi_statement_transactions(&self) -> bool {
        true
    }

    /// Whether migrations and history updates share one session.
    fn uses_single_session(&self) -> bool {
        false
    }

    /// The session migrations run on.
    fn migration_session(&mut self) -> &mut dyn Session;

    /// Create the given schemas if they do not exist. Returns the schemas that were created.
    fn ensure_schemas(&mut self, schemas: &[String]) -> Result<Vec<String>, BoxError>;

    /// Whether the schema holds no objects.
    fn is_schema_empty(&mut self, schema: &str) -> Result<bool, BoxError>;

    /// Drop every object in the given schemas.
    fn clean(&mut self, schemas: &[String]) -> Result<(), BoxError>;
}
