//! Migration configuration.

use crate::migration::{MigrationPattern, PatternKind, PatternState, ValidMatch, ValidatePattern};
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default schema history table name.
pub const DEFAULT_TABLE: &str = "migratedb_schema_history";

/// Default managed schema.
pub const DEFAULT_SCHEMA: &str = "public";

/// Default description of the baseline marker.
pub const DEFAULT_BASELINE_DESCRIPTION: &str = "<< MigrateDB Baseline >>";

/// Recorded as `installed_by` when none is configured.
pub const DEFAULT_INSTALLED_BY: &str = "migratedb";

/// Default upper bound for the connection retry backoff.
pub const DEFAULT_CONNECT_RETRIES_INTERVAL: Duration = Duration::from_secs(120);

/// Configuration for a MigrateDB instance.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Managed schemas. The first one is the default schema and holds the history table.
    pub schemas: Vec<String>,

    /// Name of the schema history table.
    pub table: String,

    /// Version to migrate up to. `None` migrates everything.
    pub target: Option<Version>,

    /// Fail when a literal target matches no migration.
    pub fail_on_missing_target: bool,

    /// Allow applying pending migrations below the current version.
    pub out_of_order: bool,

    /// Restrict migrate to these migrations.
    pub cherry_pick: Vec<MigrationPattern>,

    /// Conditions validate tolerates.
    pub allowed_matches: BTreeSet<ValidMatch>,

    /// Conditions validate tolerates, per migration kind.
    pub ignore_patterns: Vec<ValidatePattern>,

    /// Apply all pending migrations in one group.
    pub group: bool,

    /// Allow transactional and non-transactional migrations in the same group.
    pub mixed: bool,

    /// Validate before migrating.
    pub validate_on_migrate: bool,

    /// Clean the schemas instead of failing when validation on migrate fails.
    pub clean_on_validation_error: bool,

    /// Baseline a non-empty schema that has no history table when migrating.
    pub baseline_on_migrate: bool,

    /// Version written by baseline.
    pub baseline_version: Version,

    /// Description written by baseline.
    pub baseline_description: String,

    /// Create missing schemas when creating the history table.
    pub create_schemas: bool,

    /// Record migrations as applied without executing them.
    pub skip_executing_migrations: bool,

    /// Value recorded as `installed_by`.
    pub installed_by: Option<String>,

    /// Placeholder values substituted into scripts.
    pub placeholders: BTreeMap<String, String>,

    /// Whether placeholders are substituted at all.
    pub placeholder_replacement: bool,

    /// Fail on script names that do not follow the naming convention.
    pub validate_migration_naming: bool,

    /// How many times to retry obtaining a database connection.
    pub connect_retries: u32,

    /// Upper bound for the connection retry backoff.
    pub connect_retries_interval: Duration,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            schemas: vec![DEFAULT_SCHEMA.to_string()],
            table: DEFAULT_TABLE.to_string(),
            target: None,
            fail_on_missing_target: true,
            out_of_order: false,
            cherry_pick: Vec::new(),
            allowed_matches: BTreeSet::new(),
            ignore_patterns: vec![ValidatePattern::new(PatternKind::Any, PatternState::Future)],
            group: false,
            mixed: false,
            validate_on_migrate: true,
            clean_on_validation_error: false,
            baseline_on_migrate: false,
            baseline_version: Version::parse("1").unwrap_or(Version::EMPTY),
            baseline_description: DEFAULT_BASELINE_DESCRIPTION.to_string(),
            create_schemas: true,
            skip_executing_migrations: false,
            installed_by: None,
            placeholders: BTreeMap::new(),
            placeholder_replacement: true,
            validate_migration_naming: false,
            connect_retries: 0,
            connect_retries_interval: DEFAULT_CONNECT_RETRIES_INTERVAL,
        }
    }
}

impl MigrateConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the managed schemas.
    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Set the schema history table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the target version.
    pub fn with_target(mut self, target: Version) -> Self {
        self.target = Some(target);
        self
    }

    /// Set whether a missing literal target fails.
    pub fn with_fail_on_missing_target(mut self, fail: bool) -> Self {
        self.fail_on_missing_target = fail;
        self
    }

    /// Allow out-of-order migrations.
    pub fn with_out_of_order(mut self, out_of_order: bool) -> Self {
        self.out_of_order = out_of_order;
        self
    }

    /// Restrict migrate to the given migrations.
    pub fn with_cherry_pick<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cherry_pick = patterns.into_iter().map(MigrationPattern::new).collect();
        self
    }

    /// Tolerate a condition during validation.
    pub fn with_allowed_match(mut self, allowed: ValidMatch) -> Self {
        self.allowed_matches.insert(allowed);
        self
    }

    /// Replace the ignore patterns.
    pub fn with_ignore_patterns(mut self, patterns: Vec<ValidatePattern>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Apply all pending migrations in one group.
    pub fn with_group(mut self, group: bool) -> Self {
        self.group = group;
        self
    }

    /// Allow mixed transactional modes in a group.
    pub fn with_mixed(mut self, mixed: bool) -> Self {
        self.mixed = mixed;
        self
    }

    /// Set whether migrate validates first.
    pub fn with_validate_on_migrate(mut self, validate: bool) -> Self {
        self.validate_on_migrate = validate;
        self
    }

    /// Set whether a validation failure on migrate cleans the schemas.
    pub fn with_clean_on_validation_error(mut self, clean: bool) -> Self {
        self.clean_on_validation_error = clean;
        self
    }

    /// Set whether migrate baselines non-empty schemas without history.
    pub fn with_baseline_on_migrate(mut self, baseline: bool) -> Self {
        self.baseline_on_migrate = baseline;
        self
    }

    /// Set the baseline version.
    pub fn with_baseline_version(mut self, version: Version) -> Self {
        self.baseline_version = version;
        self
    }

    /// Set the baseline description.
    pub fn with_baseline_description(mut self, description: impl Into<String>) -> Self {
        self.baseline_description = description.into();
        self
    }

    /// Set whether missing schemas are created.
    pub fn with_create_schemas(mut self, create: bool) -> Self {
        self.create_schemas = create;
        self
    }

    /// Record migrations without executing them.
    pub fn with_skip_executing_migrations(mut self, skip: bool) -> Self {
        self.skip_executing_migrations = skip;
        self
    }

    /// Set the `installed_by` value.
    pub fn with_installed_by(mut self, user: impl Into<String>) -> Self {
        self.installed_by = Some(user.into());
        self
    }

    /// Add a placeholder value.
    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// Set whether placeholders are replaced.
    pub fn with_placeholder_replacement(mut self, enabled: bool) -> Self {
        self.placeholder_replacement = enabled;
        self
    }

    /// Fail on invalid script names.
    pub fn with_validate_migration_naming(mut self, validate: bool) -> Self {
        self.validate_migration_naming = validate;
        self
    }

    /// Set connection retries and their backoff bound.
    pub fn with_connect_retries(mut self, retries: u32, max_interval: Duration) -> Self {
        self.connect_retries = retries;
        self.connect_retries_interval = max_interval;
        self
    }

    /// The default schema.
    pub fn default_schema(&self) -> &str {
        self.schemas
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SCHEMA)
    }

    /// The user recorded in the schema history.
    pub fn installed_by(&self) -> &str {
        self.installed_by.as_deref().unwrap_or(DEFAULT_INSTALLED_BY)
    }

    /// Whether a migration is excluded by the cherry-pick list.
    pub fn is_excluded_by_cherry_pick(&self, version: Option<&Version>, description: &str) -> bool {
        !self.cherry_pick.is_empty()
            && !self
                .cherry_pick
                .iter()
                .any(|pattern| pattern.matches(version, description))
    }
}
