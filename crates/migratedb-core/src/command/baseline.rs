//! The baseline command.

use super::create_history;
use crate::callback::{CallbackExecutor, Event};
use crate::config::MigrateConfig;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::history::SchemaHistory;
use crate::version::Version;
use serde::Serialize;
use tracing::info;

/// Outcome of a baseline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineResult {
    /// The baseline version.
    pub baseline_version: String,
    /// The baseline description.
    pub description: String,
    /// Whether a baseline marker was written. `false` when it already existed.
    pub created: bool,
}

/// Adopts an existing schema by recording a baseline marker.
pub struct Baseline<'a> {
    database: &'a mut dyn Database,
    history: &'a dyn SchemaHistory,
    config: &'a MigrateConfig,
    callbacks: &'a CallbackExecutor,
}

impl<'a> Baseline<'a> {
    /// Create a baseline run.
    pub fn new(
        database: &'a mut dyn Database,
        history: &'a dyn SchemaHistory,
        config: &'a MigrateConfig,
        callbacks: &'a CallbackExecutor,
    ) -> Self {
        Self {
            database,
            history,
            config,
            callbacks,
        }
    }

    /// Write the baseline marker unless the same one exists.
    pub fn run(self) -> Result<BaselineResult> {
        self.callbacks.on_event(Event::BeforeBaseline)?;

        let history = self.history;
        let config = self.config;
        let version = &config.baseline_version;
        let description = &config.baseline_description;
        let refuse = |reason: String| Error::Baseline {
            table: history.table().to_string(),
            reason,
        };

        let database = self.database;
        let created = history.with_lock(|| {
            create_history(database, history, config)?;

            Ok(match history.baseline_marker()? {
                Some(marker)
                    if marker.version.as_ref() == Some(version) && marker.description == *description =>
                {
                    info!(
                        table = history.table(),
                        version = %version,
                        "schema history table already baselined, skipping"
                    );
                    false
                }
                Some(marker) => {
                    return Err(refuse(format!(
                        "cannot baseline with ({}, {}) as it has already been baselined with ({}, {})",
                        version,
                        description,
                        marker.version.map(|v| v.to_string()).unwrap_or_default(),
                        marker.description
                    )))
                }
                None => {
                    if history.has_schemas_marker()? && *version == Version::parse("0")? {
                        return Err(refuse(
                            "version 0 is reserved for schema creation".to_string(),
                        ));
                    }
                    if history.has_applied_migrations()? {
                        return Err(refuse("it already contains applied migrations".to_string()));
                    }
                    history.add_baseline_marker(version, description, config.installed_by())?;
                    info!(
                        table = history.table(),
                        version = %version,
                        "Successfully baselined schema with version {}",
                        version
                    );
                    true
                }
            })
        })?;

        self.callbacks.on_event(Event::AfterBaseline)?;
        Ok(BaselineResult {
            baseline_version: version.to_string(),
            description: description.clone(),
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::RecordingDatabase;
    use crate::history::MemorySchemaHistory;
    use crate::info::test_support::applied;
    use crate::migration::MigrationType;

    fn baseline(history: &MemorySchemaHistory, config: &MigrateConfig) -> Result<BaselineResult> {
        let mut database = RecordingDatabase::new();
        let callbacks = CallbackExecutor::new();
        Baseline::new(&mut database, history, config, &callbacks).run()
    }

    #[test]
    fn test_baseline_creates_history_and_marker() {
        let history = MemorySchemaHistory::new("history");
        let config = MigrateConfig::default().with_baseline_version(Version::parse("3").unwrap());

        let result = baseline(&history, &config).unwrap();
        assert!(result.created);
        assert_eq!(result.baseline_version, "3");

        let rows = history.all_applied_migrations().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].migration_type, MigrationType::Schema);
        assert_eq!(rows[1].migration_type, MigrationType::Baseline);
        assert_eq!(rows[1].version, Some(Version::parse("3").unwrap()));
    }

    #[test]
    fn test_baseline_is_idempotent() {
        let history = MemorySchemaHistory::new("history");
        let config = MigrateConfig::default();
        assert!(baseline(&history, &config).unwrap().created);
        assert!(!baseline(&history, &config).unwrap().created);

        let other = config.with_baseline_version(Version::parse("2").unwrap());
        assert!(matches!(baseline(&history, &other), Err(Error::Baseline { .. })));
    }

    #[test]
    fn test_baseline_refuses_applied_migrations() {
        let history = MemorySchemaHistory::with_rows("history", vec![applied(1, Some("1"), "init", true)]);
        let err = baseline(&history, &MigrateConfig::default()).unwrap_err();
        assert!(err.to_string().contains("already contains applied migrations"));
    }

    #[test]
    fn test_version_zero_reserved_after_schema_creation() {
        for text in ["0", "0.0"] {
            let history = MemorySchemaHistory::new("history");
            let config = MigrateConfig::default().with_baseline_version(Version::parse(text).unwrap());
            let err = baseline(&history, &config).unwrap_err();
            assert!(err.to_string().contains("version 0 is reserved"), "{text}: {err}");
        }
    }
}
