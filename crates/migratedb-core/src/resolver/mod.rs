//! Migration resolvers.
//!
//! A resolver discovers migrations (scripts, code, anything custom) and
//! returns them as [`ResolvedMigration`]s. [`CompositeResolver`] merges the
//! output of several resolvers.

pub mod checksum;
pub mod code;
pub mod naming;
pub mod placeholders;
pub mod script;

pub use self::checksum::checksum;
pub use self::code::{CodeMigration, CodeResolver};
pub use self::naming::{ScriptKind, ScriptName};
pub use self::script::ScriptResolver;

use crate::config::MigrateConfig;
use crate::error::Result;
use crate::migration::ResolvedMigration;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// What a resolver may consult.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Active configuration.
    pub config: &'a MigrateConfig,
}

impl<'a> ResolveContext<'a> {
    /// Create a context.
    pub fn new(config: &'a MigrateConfig) -> Self {
        Self { config }
    }
}

/// Discovers migrations.
pub trait Resolver: Send + Sync {
    /// Every migration this resolver knows about, in any order.
    fn resolve_migrations(&self, context: &ResolveContext<'_>) -> Result<Vec<ResolvedMigration>>;
}

/// Merges several resolvers.
///
/// Migrations identical across resolvers are reported once. The result is
/// sorted: versioned migrations by version (a baseline migration before an
/// incremental one of the same version), then repeatable migrations by
/// description.
#[derive(Clone, Default)]
pub struct CompositeResolver {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl CompositeResolver {
    /// Create an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver.
    pub fn with(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Add a resolver.
    pub fn add(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    /// Number of resolvers.
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Whether no resolvers were added.
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl Resolver for CompositeResolver {
    fn resolve_migrations(&self, context: &ResolveContext<'_>) -> Result<Vec<ResolvedMigration>> {
        let mut seen = HashSet::new();
        let mut migrations = Vec::new();
        for resolver in &self.resolvers {
            for migration in resolver.resolve_migrations(context)? {
                if seen.insert(migration.clone()) {
                    migrations.push(migration);
                }
            }
        }
        migrations.sort_by(compare_resolved);
        Ok(migrations)
    }
}

impl std::fmt::Debug for CompositeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeResolver")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

/// Order in which resolved migrations are reported.
pub fn compare_resolved(a: &ResolvedMigration, b: &ResolvedMigration) -> Ordering {
    match (a.version(), b.version()) {
        (Some(left), Some(right)) => left.cmp(right).then_with(|| {
            let a_baseline = a.migration_type().is_baseline_migration();
            let b_baseline = b.migration_type().is_baseline_migration();
            b_baseline.cmp(&a_baseline)
        }),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.description().cmp(b.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut crate::migration::ExecutionContext<'_>) -> std::result::Result<(), crate::error::BoxError> {
        Ok(())
    }

    #[test]
    fn test_composite_dedups_and_sorts() {
        let first = CodeResolver::new()
            .with(CodeMigration::repeatable("views", noop))
            .with(CodeMigration::versioned("2", "second", noop).unwrap())
            .with(CodeMigration::versioned("1", "first", noop).unwrap());
        let second = CodeResolver::new()
            .with(CodeMigration::versioned("1", "first", noop).unwrap())
            .with(CodeMigration::baseline("2", "snapshot", noop).unwrap())
            .with(CodeMigration::repeatable("audit", noop));

        let composite = CompositeResolver::new()
            .with(Arc::new(first))
            .with(Arc::new(second));
        let config = MigrateConfig::default();
        let resolved = composite
            .resolve_migrations(&ResolveContext::new(&config))
            .unwrap();

        let descriptions: Vec<&str> = resolved.iter().map(|m| m.description()).collect();
        assert_eq!(descriptions, vec!["first", "snapshot", "second", "audit", "views"]);
    }
}
