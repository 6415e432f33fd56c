//! The validate command.

use crate::callback::{CallbackExecutor, Event};
use crate::config::MigrateConfig;
use crate::error::Result;
use crate::history::SchemaHistory;
use crate::info::{InfoContext, MigrationInfoService};
use crate::migration::ValidMatch;
use crate::resolver::Resolver;
use crate::validate::ValidateResult;
use std::time::Instant;
use tracing::{error, info};

/// Compares resolved migrations with the schema history.
///
/// Findings are returned in the [`ValidateResult`]; only structural problems
/// (duplicate migrations, a corrupted history) are errors.
pub struct Validate<'a> {
    history: &'a dyn SchemaHistory,
    resolver: &'a dyn Resolver,
    config: &'a MigrateConfig,
    callbacks: &'a CallbackExecutor,
    allow_pending: bool,
}

impl<'a> Validate<'a> {
    /// Create a validate run.
    pub fn new(
        history: &'a dyn SchemaHistory,
        resolver: &'a dyn Resolver,
        config: &'a MigrateConfig,
        callbacks: &'a CallbackExecutor,
    ) -> Self {
        Self {
            history,
            resolver,
            config,
            callbacks,
            allow_pending: false,
        }
    }

    /// Tolerate pending migrations in addition to the configured matches.
    pub fn allow_pending(mut self, allow: bool) -> Self {
        self.allow_pending = allow;
        self
    }

    /// Run validation.
    pub fn run(self) -> Result<ValidateResult> {
        self.callbacks.on_event(Event::BeforeValidate)?;
        let started = Instant::now();

        let mut settings = InfoContext::from_config(self.config);
        if self.allow_pending {
            settings.allowed_matches.insert(ValidMatch::Pending);
        }
        let mut service = MigrationInfoService::new(self.resolver, self.history, self.config, settings);
        service.refresh()?;

        let count = service.resolved().len();
        let result = ValidateResult::new(self.history.table(), count, service.validate());
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.is_valid() {
            info!(
                table = self.history.table(),
                count = count as u64,
                elapsed_ms,
                "Successfully validated {} migration(s)",
                count
            );
        } else {
            error!(
                table = self.history.table(),
                invalid = result.invalid_migrations.len() as u64,
                "{}",
                result.summary()
            );
        }

        self.callbacks.on_event(Event::AfterValidate)?;
        Ok(result)
    }
}
