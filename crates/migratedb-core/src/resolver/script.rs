//! SQL script migrations found on the filesystem.

use super::checksum::checksum;
use super::naming::{ScriptKind, ScriptName};
use super::placeholders::replace_placeholders;
use super::{ResolveContext, Resolver};
use crate::error::{BoxError, Error, Result};
use crate::migration::{ExecutionContext, MigrationExecutor, MigrationType, ResolvedMigration};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extension of the per-script configuration file (`V1__init.sql.conf`).
pub const CONFIG_SUFFIX: &str = ".conf";

/// Resolves `V`, `B` and `R` scripts below a set of directories.
#[derive(Debug, Clone, Default)]
pub struct ScriptResolver {
    locations: Vec<PathBuf>,
}

impl ScriptResolver {
    /// Scan the given directories.
    pub fn new<I, P>(locations: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
        }
    }

    fn resolve_location(
        &self,
        location: &Path,
        context: &ResolveContext<'_>,
        resolved: &mut Vec<ResolvedMigration>,
    ) -> Result<()> {
        if !location.is_dir() {
            warn!(location = %location.display(), "skipping missing migration location");
            return Ok(());
        }

        let mut files = Vec::new();
        collect_files(location, &mut files)?;
        files.sort();

        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = match ScriptName::parse(file_name) {
                Ok(Some(name)) => name,
                Ok(None) => continue,
                Err(err) if context.config.validate_migration_naming => return Err(err),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping script with invalid name");
                    continue;
                }
            };
            resolved.push(load_script(location, &path, name, context)?);
        }
        Ok(())
    }
}

impl Resolver for ScriptResolver {
    fn resolve_migrations(&self, context: &ResolveContext<'_>) -> Result<Vec<ResolvedMigration>> {
        let mut resolved = Vec::new();
        for location in &self.locations {
            self.resolve_location(location, context, &mut resolved)?;
        }
        debug!(count = resolved.len(), "resolved script migrations");
        Ok(resolved)
    }
}

/// Files below `dir`. Symlinked directories are not descended into.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file()) {
            files.push(entry.into_path());
        }
    }
    Ok(())
}

fn load_script(
    location: &Path,
    path: &Path,
    name: ScriptName,
    context: &ResolveContext<'_>,
) -> Result<ResolvedMigration> {
    let script = path
        .strip_prefix(location)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let raw = fs::read_to_string(path)?;
    let equivalent_checksum = checksum(&raw);
    let (sql, script_checksum) = if context.config.placeholder_replacement {
        let values = placeholder_values(context, &script);
        let replaced = replace_placeholders(&raw, &values, &script)?;
        let replaced_checksum = checksum(&replaced);
        (replaced, replaced_checksum)
    } else {
        (raw, equivalent_checksum)
    };

    let settings = ScriptSettings::load(path)?;
    let migration_type = match name.kind {
        ScriptKind::Baseline => MigrationType::SqlBaseline,
        ScriptKind::Versioned | ScriptKind::Repeatable => MigrationType::Sql,
    };

    Ok(ResolvedMigration::new(
        name.version,
        name.description,
        script,
        Some(script_checksum),
        migration_type,
        Arc::new(ScriptExecutor {
            sql,
            transactional: settings.execute_in_transaction,
        }),
    )
    .with_equivalent_checksum(Some(equivalent_checksum))
    .with_physical_location(path.display().to_string()))
}

fn placeholder_values(context: &ResolveContext<'_>, script: &str) -> BTreeMap<String, String> {
    let config = context.config;
    let mut values = BTreeMap::new();
    values.insert("migratedb:defaultSchema".to_string(), config.default_schema().to_string());
    values.insert("migratedb:table".to_string(), config.table.clone());
    values.insert("migratedb:user".to_string(), config.installed_by().to_string());
    let file_name = script.rsplit('/').next().unwrap_or(script);
    values.insert("migratedb:filename".to_string(), file_name.to_string());
    for (key, value) in &config.placeholders {
        values.insert(key.clone(), value.clone());
    }
    values
}

/// Settings read from a script's `.conf` sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptSettings {
    execute_in_transaction: bool,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            execute_in_transaction: true,
        }
    }
}

impl ScriptSettings {
    fn load(script: &Path) -> Result<Self> {
        let mut conf = script.as_os_str().to_owned();
        conf.push(CONFIG_SUFFIX);
        let conf = PathBuf::from(conf);
        if !conf.is_file() {
            return Ok(Self::default());
        }
        Self::parse(&fs::read_to_string(&conf)?, &conf)
    }

    fn parse(text: &str, source: &Path) -> Result<Self> {
        let invalid = |message: String| Error::Resolver {
            location: source.display().to_string(),
            message,
        };

        let mut settings = Self::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected key=value, found '{}'", line)))?;
            match key.trim() {
                "executeInTransaction" => {
                    settings.execute_in_transaction = value
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("'{}' is not a boolean", value.trim())))?;
                }
                other => return Err(invalid(format!("unknown script setting '{}'", other))),
            }
        }
        Ok(settings)
    }
}

struct ScriptExecutor {
    sql: String,
    transactional: bool,
}

impl MigrationExecutor for ScriptExecutor {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> std::result::Result<(), BoxError> {
        context.session.execute_script(&self.sql)
    }

    fn can_execute_in_transaction(&self) -> bool {
        self.transactional
    }
}
