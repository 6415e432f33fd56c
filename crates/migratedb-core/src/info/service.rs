//! Migration info service: the refreshed, sorted view of all migrations.

use super::context::{InfoContext, VersionContext};
use super::migration_info::MigrationInfo;
use super::reconcile::reconcile;
use crate::config::MigrateConfig;
use crate::error::Result;
use crate::history::SchemaHistory;
use crate::migration::{MigrationState, MigrationType, ResolvedMigration};
use crate::resolver::{ResolveContext, Resolver};
use crate::validate::ValidateOutput;
use crate::version::Version;
use std::sync::Arc;
use tracing::debug;

/// Reconciles a resolver with a schema history on demand.
///
/// Every query is a filter over the list computed by the last
/// [`refresh`](Self::refresh); nothing is recomputed between refreshes.
pub struct MigrationInfoService<'a> {
    resolver: &'a dyn Resolver,
    history: &'a dyn SchemaHistory,
    config: &'a MigrateConfig,
    settings: InfoContext,
    context: Option<Arc<VersionContext>>,
    infos: Vec<MigrationInfo>,
}

impl<'a> MigrationInfoService<'a> {
    /// Create a service. Call [`refresh`](Self::refresh) before querying.
    pub fn new(
        resolver: &'a dyn Resolver,
        history: &'a dyn SchemaHistory,
        config: &'a MigrateConfig,
        settings: InfoContext,
    ) -> Self {
        Self {
            resolver,
            history,
            config,
            settings,
            context: None,
            infos: Vec::new(),
        }
    }

    /// Re-read resolved and applied migrations and recompute every state.
    pub fn refresh(&mut self) -> Result<()> {
        let resolved = self
            .resolver
            .resolve_migrations(&ResolveContext::new(self.config))?;
        let applied = if self.history.exists()? {
            self.history.all_applied_migrations()?
        } else {
            Vec::new()
        };
        debug!(
            table = self.history.table(),
            resolved = resolved.len(),
            applied = applied.len(),
            "refreshing migration info"
        );

        let reconciliation = reconcile(resolved, applied, &self.settings)?;
        self.context = Some(reconciliation.context);
        self.infos = reconciliation.infos;
        Ok(())
    }

    /// The pointers of the last refresh.
    pub fn context(&self) -> Option<&VersionContext> {
        self.context.as_deref()
    }

    /// Every migration, in execution order.
    pub fn all(&self) -> &[MigrationInfo] {
        &self.infos
    }

    /// The highest applied version, or the last applied repeatable migration
    /// when no versioned migration has been applied.
    pub fn current(&self) -> Option<&MigrationInfo> {
        let counts = |info: &&MigrationInfo| {
            info.applied().is_some()
                && info.state() != MigrationState::Deleted
                && !matches!(
                    info.migration_type(),
                    MigrationType::Delete | MigrationType::Schema
                )
        };

        let versioned = self
            .infos
            .iter()
            .filter(counts)
            .filter(|info| info.version().is_some())
            .fold(None::<&MigrationInfo>, |best, info| match best {
                Some(best) if best.version() >= info.version() => Some(best),
                _ => Some(info),
            });
        if versioned.is_some() {
            return versioned;
        }

        self.infos
            .iter()
            .rev()
            .filter(counts)
            .find(|info| info.version().is_none())
    }

    /// Version of [`current`](Self::current), or `EMPTY`.
    pub fn current_version(&self) -> Version {
        self.current()
            .and_then(|info| info.version().cloned())
            .unwrap_or(Version::EMPTY)
    }

    /// Migrations waiting to be applied, including outdated repeatable migrations.
    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| matches!(info.state(), MigrationState::Pending | MigrationState::Outdated))
    }

    /// Migrations with a history row.
    pub fn applied(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| info.state().is_applied())
    }

    /// Migrations that are resolvable locally.
    pub fn resolved(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| info.resolved().is_some())
    }

    /// Migrations whose recorded attempt failed.
    pub fn failed(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| info.state().is_failed())
    }

    /// Applied migrations newer than anything resolved.
    pub fn future(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| info.state().is_future())
    }

    /// Migrations applied out of order.
    pub fn out_of_order(&self) -> Vec<&MigrationInfo> {
        self.filter(|info| info.state() == MigrationState::OutOfOrder)
    }

    /// The first pending migration.
    pub fn next(&self) -> Option<&MigrationInfo> {
        self.infos
            .iter()
            .find(|info| matches!(info.state(), MigrationState::Pending | MigrationState::Outdated))
    }

    /// Resolved migrations, for reporting which migration files the run saw.
    pub fn resolved_migrations(&self) -> Vec<&ResolvedMigration> {
        self.infos.iter().filter_map(MigrationInfo::resolved).collect()
    }

    /// Validation findings, one per invalid migration.
    pub fn validate(&self) -> Vec<ValidateOutput> {
        self.infos
            .iter()
            .filter_map(|info| info.validate().map(|details| ValidateOutput::new(info, details)))
            .collect()
    }

    fn filter(&self, predicate: impl Fn(&MigrationInfo) -> bool) -> Vec<&MigrationInfo> {
        self.infos.iter().filter(|info| predicate(info)).collect()
    }
}
