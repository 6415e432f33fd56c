//! Lifecycle callbacks.

use crate::error::{BoxError, Error, Result};
use crate::info::MigrationInfo;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Points in a command's lifecycle at which callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Before migrate starts.
    BeforeMigrate,
    /// Before each migration is applied.
    BeforeEachMigrate,
    /// After each migration is applied successfully.
    AfterEachMigrate,
    /// After a migration failed.
    AfterEachMigrateError,
    /// After the last versioned migration of a run.
    AfterVersioned,
    /// Before the first repeatable migration of a run.
    BeforeRepeatables,
    /// After migrate succeeds.
    AfterMigrate,
    /// After migrate fails.
    AfterMigrateError,
    /// Before repair.
    BeforeRepair,
    /// After repair.
    AfterRepair,
    /// Before validate.
    BeforeValidate,
    /// After validate.
    AfterValidate,
    /// Before baseline.
    BeforeBaseline,
    /// After baseline.
    AfterBaseline,
}

impl Event {
    /// Conventional callback name, e.g. `beforeEachMigrate`.
    pub fn id(self) -> &'static str {
        match self {
            Event::BeforeMigrate => "beforeMigrate",
            Event::BeforeEachMigrate => "beforeEachMigrate",
            Event::AfterEachMigrate => "afterEachMigrate",
            Event::AfterEachMigrateError => "afterEachMigrateError",
            Event::AfterVersioned => "afterVersioned",
            Event::BeforeRepeatables => "beforeRepeatables",
            Event::AfterMigrate => "afterMigrate",
            Event::AfterMigrateError => "afterMigrateError",
            Event::BeforeRepair => "beforeRepair",
            Event::AfterRepair => "afterRepair",
            Event::BeforeValidate => "beforeValidate",
            Event::AfterValidate => "afterValidate",
            Event::BeforeBaseline => "beforeBaseline",
            Event::AfterBaseline => "afterBaseline",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Hook invoked at lifecycle events.
pub trait Callback: Send + Sync {
    /// Whether the callback wants `event`.
    fn supports(&self, event: Event) -> bool;

    /// Handle `event`. `migration` is set for the per-migration events.
    fn handle(&self, event: Event, migration: Option<&MigrationInfo>) -> std::result::Result<(), BoxError>;

    /// Name used in error messages.
    fn name(&self) -> &str {
        "callback"
    }
}

/// Dispatches events to registered callbacks in registration order.
#[derive(Clone, Default)]
pub struct CallbackExecutor {
    callbacks: Vec<Arc<dyn Callback>>,
}

impl CallbackExecutor {
    /// Create an executor with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn register(&mut self, callback: Arc<dyn Callback>) {
        self.callbacks.push(callback);
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Deliver `event` to every interested callback. The first failure aborts delivery.
    pub fn on_event(&self, event: Event) -> Result<()> {
        self.dispatch(event, None)
    }

    /// Deliver a per-migration event.
    pub fn on_each(&self, event: Event, migration: &MigrationInfo) -> Result<()> {
        self.dispatch(event, Some(migration))
    }

    fn dispatch(&self, event: Event, migration: Option<&MigrationInfo>) -> Result<()> {
        for callback in self.callbacks.iter().filter(|c| c.supports(event)) {
            debug!(event = %event, callback = callback.name(), "executing callback");
            callback
                .handle(event, migration)
                .map_err(|source| Error::Callback {
                    event: event.id().to_string(),
                    callback: callback.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for CallbackExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackExecutor")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Callback for Recorder {
        fn supports(&self, event: Event) -> bool {
            event != Event::AfterValidate
        }

        fn handle(&self, event: Event, _migration: Option<&MigrationInfo>) -> std::result::Result<(), BoxError> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    struct Failing;

    impl Callback for Failing {
        fn supports(&self, _event: Event) -> bool {
            true
        }

        fn handle(&self, _event: Event, _migration: Option<&MigrationInfo>) -> std::result::Result<(), BoxError> {
            Err("nope".into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_dispatch_filters_events() {
        let recorder = Arc::new(Recorder::default());
        let mut executor = CallbackExecutor::new();
        executor.register(recorder.clone());

        executor.on_event(Event::BeforeValidate).unwrap();
        executor.on_event(Event::AfterValidate).unwrap();
        executor.on_event(Event::BeforeMigrate).unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec![Event::BeforeValidate, Event::BeforeMigrate]
        );
    }

    #[test]
    fn test_failure_names_callback() {
        let mut executor = CallbackExecutor::new();
        executor.register(Arc::new(Failing));
        let err = executor.on_event(Event::BeforeRepair).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("failing"));
        assert!(text.contains("beforeRepair"));
    }
}
