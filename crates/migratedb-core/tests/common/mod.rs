//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use migratedb_core::{BoxError, Database, Session};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the fake database has seen.
#[derive(Debug, Default)]
pub struct DbState {
    /// Statements that survived (committed, or run outside a transaction).
    pub committed: Vec<String>,
    /// Statements of the open transaction.
    pub in_flight: Vec<String>,
    pub in_transaction: bool,
    pub ddl_transactions: bool,
    pub empty: bool,
    pub cleaned: usize,
    pub transactions: usize,
}

pub type Handle = Arc<Mutex<DbState>>;

/// Session of [`TestDatabase`]. Scripts containing `FAIL` raise an error.
pub struct TestSession {
    state: Handle,
    schema: String,
}

impl Session for TestSession {
    fn current_schema(&mut self) -> Result<String, BoxError> {
        Ok(self.schema.clone())
    }

    fn change_current_schema_to(&mut self, schema: &str) -> Result<(), BoxError> {
        self.schema = schema.to_string();
        Ok(())
    }

    fn begin(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if state.in_transaction {
            return Err("transaction already open".into());
        }
        state.in_transaction = true;
        state.transactions += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        let statements = std::mem::take(&mut state.in_flight);
        state.committed.extend(statements);
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        let statements = std::mem::take(&mut state.in_flight);
        if !state.ddl_transactions {
            state.committed.extend(statements);
        }
        state.in_transaction = false;
        Ok(())
    }

    fn execute_script(&mut self, script: &str) -> Result<(), BoxError> {
        if script.contains("FAIL") {
            return Err(format!("syntax error near '{}'", script.trim()).into());
        }
        let mut state = self.state.lock();
        let statement = script.trim().to_string();
        if state.in_transaction {
            state.in_flight.push(statement);
        } else {
            state.committed.push(statement);
        }
        state.empty = false;
        Ok(())
    }
}

/// An in-memory stand-in for a database backend.
pub struct TestDatabase {
    state: Handle,
    session: TestSession,
}

impl TestDatabase {
    /// An empty database with transactional DDL, and a handle to inspect it.
    pub fn new() -> (Self, Handle) {
        let state: Handle = Arc::new(Mutex::new(DbState {
            ddl_transactions: true,
            empty: true,
            ..DbState::default()
        }));
        let database = Self {
            session: TestSession {
                state: state.clone(),
                schema: "public".to_string(),
            },
            state: state.clone(),
        };
        (database, state)
    }

    pub fn boxed() -> (Box<dyn Database>, Handle) {
        let (database, handle) = Self::new();
        (Box::new(database), handle)
    }
}

impl Database for TestDatabase {
    fn supports_ddl_transactions(&self) -> bool {
        self.state.lock().ddl_transactions
    }

    fn migration_session(&mut self) -> &mut dyn Session {
        &mut self.session
    }

    fn ensure_schemas(&mut self, schemas: &[String]) -> Result<Vec<String>, BoxError> {
        Ok(schemas.to_vec())
    }

    fn is_schema_empty(&mut self, _schema: &str) -> Result<bool, BoxError> {
        Ok(self.state.lock().empty)
    }

    fn clean(&mut self, _schemas: &[String]) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        state.committed.clear();
        state.empty = true;
        state.cleaned += 1;
        Ok(())
    }
}
