//! Inputs to reconciliation.
//!
//! [`InfoContext`] carries the settings a refresh is run with;
//! [`VersionContext`] is the snapshot of pointers derived from the index.
//! Both are plain values built once and never mutated afterwards.

use crate::config::MigrateConfig;
use crate::migration::{MigrationPattern, PatternState, ValidMatch, ValidatePattern};
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};

/// Settings a refresh is computed with.
#[derive(Debug, Clone, Default)]
pub struct InfoContext {
    /// Configured target, possibly symbolic.
    pub target: Option<Version>,
    /// Whether pending migrations below the current version may run.
    pub out_of_order: bool,
    /// Restrict pending migrations to these.
    pub cherry_pick: Vec<MigrationPattern>,
    /// Conditions validation tolerates.
    pub allowed_matches: BTreeSet<ValidMatch>,
    /// Conditions validation tolerates, per migration kind.
    pub ignore_patterns: Vec<ValidatePattern>,
    /// Fail when a literal target matches no migration.
    pub fail_on_missing_target: bool,
}

impl InfoContext {
    /// Settings taken from the configuration.
    pub fn from_config(config: &MigrateConfig) -> Self {
        Self {
            target: config.target.clone(),
            out_of_order: config.out_of_order,
            cherry_pick: config.cherry_pick.clone(),
            allowed_matches: config.allowed_matches.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            fail_on_missing_target: config.fail_on_missing_target,
        }
    }

    /// Settings used by repair: everything resolvable is considered and every condition tolerated.
    pub fn for_repair(config: &MigrateConfig) -> Self {
        Self {
            target: Some(Version::LATEST),
            allowed_matches: [
                ValidMatch::Pending,
                ValidMatch::Missing,
                ValidMatch::Future,
                ValidMatch::Ignored,
                ValidMatch::OutOfOrder,
            ]
            .into_iter()
            .collect(),
            fail_on_missing_target: false,
            ..Self::from_config(config)
        }
    }

    /// Whether validation tolerates `condition` for a versioned or repeatable migration.
    pub fn is_allowed(&self, condition: ValidMatch, versioned: bool) -> bool {
        self.allowed_matches.contains(&condition)
            || ValidatePattern::any_matches(&self.ignore_patterns, versioned, condition.into())
    }

    /// Whether the ignore patterns cover failed migrations of this kind.
    pub fn is_failure_ignored(&self, versioned: bool) -> bool {
        ValidatePattern::any_matches(&self.ignore_patterns, versioned, PatternState::Failed)
    }

    /// Whether the cherry-pick list excludes a migration.
    pub fn is_excluded_by_cherry_pick(&self, version: Option<&Version>, description: &str) -> bool {
        !self.cherry_pick.is_empty()
            && !self
                .cherry_pick
                .iter()
                .any(|pattern| pattern.matches(version, description))
    }
}

/// Pointers derived from the index for one refresh.
#[derive(Debug, Clone)]
pub struct VersionContext {
    /// Settings of the refresh.
    pub settings: InfoContext,
    /// Target with symbolic markers resolved. `None` means unbounded.
    pub target: Option<Version>,
    /// Version of the latest baseline row, or `EMPTY`.
    pub baseline: Version,
    /// Highest version with a resolved migration that could apply.
    pub last_resolved: Version,
    /// Highest applied version, or `EMPTY`.
    pub last_applied: Version,
    /// Baseline migration to apply on an empty history.
    pub pending_baseline: Option<Version>,
    /// Per description, the rank of the latest run.
    pub latest_repeatable_runs: BTreeMap<String, i32>,
}

impl VersionContext {
    /// Create a context from its parts.
    pub fn new(
        settings: InfoContext,
        target: Option<Version>,
        baseline: Version,
        last_resolved: Version,
        last_applied: Version,
        pending_baseline: Option<Version>,
        latest_repeatable_runs: BTreeMap<String, i32>,
    ) -> Self {
        Self {
            settings,
            target,
            baseline,
            last_resolved,
            last_applied,
            pending_baseline,
            latest_repeatable_runs,
        }
    }
}
