//! State computation.
//!
//! Turns a [`MigrationIndex`] into the sorted list of [`MigrationInfo`]s:
//! first the pointers (target, baseline, pending baseline, last resolved and
//! last applied versions), then one state per history row and per resolved
//! migration not consumed by a row.

use super::context::{InfoContext, VersionContext};
use super::index::{AppliedEntry, MigrationIndex, RepeatableEntry, VersionedEntry};
use super::migration_info::MigrationInfo;
use crate::error::{Error, Result};
use crate::migration::{AppliedMigration, MigrationState, MigrationType, ResolvedMigration};
use crate::version::Version;
use std::sync::Arc;

/// Output of one reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The pointers the states were computed against.
    pub context: Arc<VersionContext>,
    /// One info per resolved or applied migration, in execution order.
    pub infos: Vec<MigrationInfo>,
}

/// Reconcile resolved migrations with the schema history.
///
/// `applied` must be in installed rank order.
pub fn reconcile(
    resolved: Vec<ResolvedMigration>,
    applied: Vec<AppliedMigration>,
    settings: &InfoContext,
) -> Result<Reconciliation> {
    let index = MigrationIndex::build(resolved, applied)?;
    let context = Arc::new(version_context(&index, settings));

    let mut infos = Vec::new();
    for (version, entry) in index.versioned() {
        versioned_infos(version, entry, &context, &mut infos)?;
    }
    for entry in index.repeatable().values() {
        repeatable_infos(entry, &context, &mut infos);
    }
    for marker in index.schema_markers() {
        infos.push(MigrationInfo::new(
            None,
            Some(marker.clone()),
            MigrationState::Success,
            context.clone(),
        ));
    }

    infos.sort_by(MigrationInfo::execution_order);
    check_target(&infos, settings)?;
    Ok(Reconciliation { context, infos })
}

fn version_context(index: &MigrationIndex, settings: &InfoContext) -> VersionContext {
    let last_applied = index.last_applied().cloned().unwrap_or(Version::EMPTY);

    let target = settings.target.as_ref().map(|target| {
        if *target == Version::CURRENT {
            last_applied.clone()
        } else if *target == Version::LATEST {
            index.latest_resolved().cloned().unwrap_or(Version::LATEST)
        } else if *target == Version::NEXT {
            index.next_resolved().cloned().unwrap_or_else(|| last_applied.clone())
        } else {
            target.clone()
        }
    });

    let pending_baseline = if index.has_applied() {
        None
    } else {
        index
            .versioned()
            .iter()
            .rev()
            .filter(|(version, _)| target.as_ref().map_or(true, |t| *version <= t))
            .find(|(version, entry)| {
                entry.resolved_baseline.as_ref().is_some_and(|baseline| {
                    !settings.is_excluded_by_cherry_pick(Some(version), baseline.description())
                })
            })
            .map(|(version, _)| version.clone())
    };

    let last_resolved = index
        .versioned()
        .iter()
        .rev()
        .find(|(version, entry)| {
            entry.resolved_incremental.is_some()
                || (entry.resolved_baseline.is_some() && pending_baseline.as_ref() == Some(*version))
        })
        .map(|(version, _)| version.clone())
        .unwrap_or(Version::EMPTY);

    VersionContext::new(
        settings.clone(),
        target,
        index.baseline().cloned().unwrap_or(Version::EMPTY),
        last_resolved,
        last_applied,
        pending_baseline,
        index.latest_repeatable_runs(),
    )
}

fn versioned_infos(
    version: &Version,
    entry: &VersionedEntry,
    context: &Arc<VersionContext>,
    infos: &mut Vec<MigrationInfo>,
) -> Result<()> {
    for row in &entry.applied {
        let resolved = if row.migration.migration_type.is_baseline_migration() {
            &entry.resolved_baseline
        } else {
            &entry.resolved_incremental
        };
        infos.push(applied_versioned_info(row, resolved.as_ref(), context));
    }

    if let Some(incremental) = &entry.resolved_incremental {
        if !entry.incremental_applied() {
            infos.push(unapplied_versioned_info(version, incremental, false, context)?);
        }
    }

    if let Some(baseline) = &entry.resolved_baseline {
        let is_pending = context.pending_baseline.as_ref() == Some(version);
        if !entry.baseline_applied() && (is_pending || entry.resolved_incremental.is_none()) {
            infos.push(unapplied_versioned_info(version, baseline, true, context)?);
        }
    }
    Ok(())
}

fn applied_versioned_info(
    row: &AppliedEntry,
    resolved: Option<&ResolvedMigration>,
    context: &Arc<VersionContext>,
) -> MigrationInfo {
    let migration = &row.migration;
    if row.deleted {
        return MigrationInfo::new(
            None,
            Some(migration.clone()),
            MigrationState::Deleted,
            context.clone(),
        );
    }

    let future = migration
        .version
        .as_ref()
        .is_some_and(|version| *version > context.last_resolved);

    let state = if migration.migration_type == MigrationType::Baseline {
        MigrationState::Baseline
    } else if migration.success {
        if row.out_of_order {
            MigrationState::OutOfOrder
        } else if resolved.is_some() {
            MigrationState::Success
        } else if future {
            MigrationState::FutureSuccess
        } else {
            MigrationState::MissingSuccess
        }
    } else if resolved.is_some() {
        MigrationState::Failed
    } else if future {
        MigrationState::FutureFailed
    } else {
        MigrationState::MissingFailed
    };

    MigrationInfo::new(resolved.cloned(), Some(migration.clone()), state, context.clone())
        .with_out_of_order(row.out_of_order)
}

fn unapplied_versioned_info(
    version: &Version,
    resolved: &ResolvedMigration,
    is_baseline: bool,
    context: &Arc<VersionContext>,
) -> Result<MigrationInfo> {
    let settings = &context.settings;
    let excluded = !resolved.executor().should_execute()
        || settings.is_excluded_by_cherry_pick(Some(version), resolved.description());

    let below_pending_baseline = context.pending_baseline.as_ref().is_some_and(|pending| {
        if is_baseline {
            version < pending
        } else {
            version <= pending
        }
    });

    let state = if excluded {
        MigrationState::Ignored
    } else if *version <= context.baseline || below_pending_baseline {
        MigrationState::BelowBaseline
    } else if context.target.as_ref().is_some_and(|t| version > t) {
        MigrationState::AboveTarget
    } else if *version < context.last_applied && !settings.out_of_order {
        MigrationState::Ignored
    } else if is_baseline && context.pending_baseline.as_ref() != Some(version) {
        return Err(Error::PendingBaselineOnlyMigration {
            version: version.to_string(),
        });
    } else {
        MigrationState::Pending
    };

    Ok(
        MigrationInfo::new(Some(resolved.clone()), None, state, context.clone())
            .with_excluded(excluded),
    )
}

fn repeatable_infos(
    entry: &RepeatableEntry,
    context: &Arc<VersionContext>,
    infos: &mut Vec<MigrationInfo>,
) {
    let latest_rank = entry.latest_run().map(|run| run.migration.installed_rank);
    let excluded = entry.resolved.as_ref().is_some_and(|resolved| {
        !resolved.executor().should_execute()
            || context
                .settings
                .is_excluded_by_cherry_pick(None, resolved.description())
    });

    for row in &entry.applied {
        let migration = &row.migration;
        let info = if row.deleted {
            MigrationInfo::new(None, Some(migration.clone()), MigrationState::Deleted, context.clone())
        } else if Some(migration.installed_rank) != latest_rank {
            MigrationInfo::new(None, Some(migration.clone()), MigrationState::Superseded, context.clone())
        } else {
            let resolved = entry.resolved.as_ref();
            let state = match (migration.success, resolved) {
                (true, Some(resolved)) if !excluded && !resolved.checksum_matches(migration.checksum) => {
                    MigrationState::Outdated
                }
                (true, Some(_)) => MigrationState::Success,
                (true, None) => MigrationState::MissingSuccess,
                (false, Some(_)) => MigrationState::Failed,
                (false, None) => MigrationState::MissingFailed,
            };
            MigrationInfo::new(resolved.cloned(), Some(migration.clone()), state, context.clone())
                .with_excluded(excluded)
        };
        infos.push(info);
    }

    if latest_rank.is_none() {
        if let Some(resolved) = &entry.resolved {
            let state = if excluded {
                MigrationState::Ignored
            } else {
                MigrationState::Pending
            };
            infos.push(
                MigrationInfo::new(Some(resolved.clone()), None, state, context.clone())
                    .with_excluded(excluded),
            );
        }
    }
}

fn check_target(infos: &[MigrationInfo], settings: &InfoContext) -> Result<()> {
    let Some(target) = &settings.target else {
        return Ok(());
    };
    if !settings.fail_on_missing_target || target.is_sentinel() {
        return Ok(());
    }
    if infos.iter().any(|info| info.version() == Some(target)) {
        return Ok(());
    }
    Err(Error::TargetVersionNotFound {
        target: target.to_string(),
    })
}
