//! Integration tests for migrate, validate, repair and baseline.

mod common;

use common::{init_tracing, Handle, TestDatabase};
use migratedb_core::{
    BoxError, Callback, CodeMigration, CodeResolver, Error, ErrorCode, Event, MemorySchemaHistory,
    MigrateConfig, MigrateDb, MigrationInfo, MigrationState, MigrationType, SchemaHistory,
    ScriptResolver, SledSchemaHistory, ValidMatch, Version,
};
use parking_lot::Mutex;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn sql(version: &str, statement: &'static str) -> CodeMigration {
    CodeMigration::versioned(version, statement, move |ctx| ctx.session.execute_script(statement))
        .unwrap()
        .with_checksum(1)
}

fn repeatable(description: &'static str, checksum: i32) -> CodeMigration {
    CodeMigration::repeatable(description, move |ctx| ctx.session.execute_script(description))
        .with_checksum(checksum)
}

fn migratedb(config: MigrateConfig, history: Arc<dyn SchemaHistory>, resolver: CodeResolver) -> (MigrateDb, Handle) {
    init_tracing();
    let (database, handle) = TestDatabase::boxed();
    let db = MigrateDb::new(config, database, history).with_resolver(Arc::new(resolver));
    (db, handle)
}

fn memory_history() -> Arc<MemorySchemaHistory> {
    Arc::new(MemorySchemaHistory::new("migratedb_schema_history"))
}

fn user_rows(history: &dyn SchemaHistory) -> Vec<(Option<String>, bool)> {
    history
        .all_applied_migrations()
        .unwrap()
        .into_iter()
        .filter(|row| row.migration_type != MigrationType::Schema)
        .map(|row| (row.version.map(|v| v.to_string()), row.success))
        .collect()
}

#[test]
fn test_migrate_fresh_database() {
    let resolver = CodeResolver::new()
        .with(sql("1", "create_users"))
        .with(sql("2", "add_email"))
        .with(repeatable("user_view", 1));
    let (mut db, handle) = migratedb(MigrateConfig::default(), memory_history(), resolver);

    let result = db.migrate().unwrap();
    assert!(result.success);
    assert_eq!(result.migrations_executed, 3);
    assert_eq!(result.initial_schema_version, None);
    assert_eq!(result.target_schema_version.as_deref(), Some("2"));
    assert_eq!(handle.lock().committed, vec!["create_users", "add_email", "user_view"]);

    let info = db.info().unwrap();
    assert!(info.pending().is_empty());
    assert_eq!(info.current_version(), Version::parse("2").unwrap());
    assert!(db.validate().unwrap().is_valid());

    let again = db.migrate().unwrap();
    assert_eq!(again.migrations_executed, 0);
}

#[test]
fn test_group_rolls_back_with_transactional_ddl() {
    let resolver = CodeResolver::new()
        .with(sql("1", "create_users"))
        .with(sql("2", "FAIL"));
    let config = MigrateConfig::default().with_group(true);
    let history = memory_history();
    let (mut db, handle) = migratedb(config, history.clone(), resolver);

    let err = db.migrate().unwrap_err();
    assert_eq!(err.migration().and_then(|m| m.version()), Some(&Version::parse("2").unwrap()));
    assert!(handle.lock().committed.is_empty());
    assert!(user_rows(history.as_ref()).is_empty());
}

#[test]
fn test_group_failure_recorded_without_transactional_ddl() {
    let resolver = CodeResolver::new()
        .with(sql("1", "create_users"))
        .with(sql("2", "FAIL"));
    let config = MigrateConfig::default().with_group(true);
    let history = memory_history();
    let (mut db, handle) = migratedb(config, history.clone(), resolver);
    handle.lock().ddl_transactions = false;

    assert!(matches!(db.migrate(), Err(Error::Migrate { .. })));
    assert_eq!(handle.lock().committed, vec!["create_users"]);
    assert_eq!(
        user_rows(history.as_ref()),
        vec![(Some("1".to_string()), true), (Some("2".to_string()), false)]
    );
}

#[test]
fn test_failed_then_repaired() {
    let broken = Arc::new(AtomicBool::new(true));
    let flag = broken.clone();
    let add_column = CodeMigration::versioned("2", "add_column", move |ctx| {
        if flag.load(Ordering::SeqCst) {
            ctx.session.execute_script("FAIL add_column")
        } else {
            ctx.session.execute_script("add_column")
        }
    })
    .unwrap()
    .with_checksum(1)
    .non_transactional();
    let resolver = CodeResolver::new().with(sql("1", "init")).with(add_column);
    let history = memory_history();
    let (mut db, handle) = migratedb(MigrateConfig::default(), history.clone(), resolver);

    assert!(matches!(db.migrate(), Err(Error::Migrate { .. })));
    {
        let info = db.info().unwrap();
        let failed: Vec<String> = info
            .failed()
            .iter()
            .map(|i| i.version().unwrap().to_string())
            .collect();
        assert_eq!(failed, vec!["2"]);
    }

    match db.migrate() {
        Err(Error::Validation(result)) => {
            assert_eq!(result.invalid_migrations[0].details.code, ErrorCode::FailedVersionedMigration);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    let repaired = db.repair().unwrap();
    assert_eq!(repaired.removed.len(), 1);

    broken.store(false, Ordering::SeqCst);
    let result = db.migrate().unwrap();
    assert_eq!(result.migrations_executed, 1);
    assert_eq!(handle.lock().committed, vec!["init", "add_column"]);
    assert_eq!(
        user_rows(history.as_ref()),
        vec![(Some("1".to_string()), true), (Some("2".to_string()), true)]
    );
}

#[test]
fn test_repeatable_outdated_then_superseded() {
    let history = memory_history();
    let (mut first, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new().with(repeatable("seed", 3)),
    );
    first.migrate().unwrap();

    let (mut second, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new().with(repeatable("seed", 5)),
    );
    {
        let info = second.info().unwrap();
        let seed = info.all().iter().find(|i| i.description() == "seed").unwrap();
        assert_eq!(seed.state(), MigrationState::Outdated);
    }

    assert_eq!(second.migrate().unwrap().migrations_executed, 1);

    let info = second.info().unwrap();
    let states: Vec<(Option<i32>, MigrationState)> = info
        .all()
        .iter()
        .filter(|i| i.description() == "seed")
        .map(|i| (i.checksum(), i.state()))
        .collect();
    assert_eq!(
        states,
        vec![(Some(3), MigrationState::Superseded), (Some(5), MigrationState::Success)]
    );
}

#[test]
fn test_target_next_applies_one_migration_per_run() {
    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two"))
        .with(sql("3", "three"));
    let config = MigrateConfig::default().with_target(Version::NEXT);
    let (mut db, handle) = migratedb(config, memory_history(), resolver);

    assert_eq!(db.migrate().unwrap().migrations_executed, 1);
    assert_eq!(db.migrate().unwrap().migrations_executed, 1);
    assert_eq!(handle.lock().committed, vec!["one", "two"]);
}

#[test]
fn test_literal_target_stops_early() {
    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two"))
        .with(sql("3", "three"));
    let config = MigrateConfig::default().with_target(Version::parse("2").unwrap());
    let (mut db, _) = migratedb(config, memory_history(), resolver);

    let result = db.migrate().unwrap();
    assert_eq!(result.migrations_executed, 2);
    let info = db.info().unwrap();
    assert_eq!(info.all().last().unwrap().state(), MigrationState::AboveTarget);

    let config = MigrateConfig::default().with_target(Version::parse("9").unwrap());
    let (mut db, _) = migratedb(config, memory_history(), CodeResolver::new().with(sql("1", "one")));
    assert!(matches!(db.migrate(), Err(Error::TargetVersionNotFound { .. })));
}

#[test]
fn test_mixed_transaction_modes_rejected() {
    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two").non_transactional());
    let config = MigrateConfig::default().with_group(true);
    let (mut db, _) = migratedb(config.clone(), memory_history(), resolver.clone());
    assert!(matches!(db.migrate(), Err(Error::MixedTransactionModes { .. })));

    let (mut db, handle) = migratedb(config.with_mixed(true), memory_history(), resolver);
    assert_eq!(db.migrate().unwrap().migrations_executed, 2);
    assert_eq!(handle.lock().transactions, 0);
}

#[test]
fn test_out_of_order_migration_applied_when_enabled() {
    let history = memory_history();
    let (mut db, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new().with(sql("1", "one")).with(sql("3", "three")),
    );
    db.migrate().unwrap();

    let late = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two"))
        .with(sql("3", "three"));

    let (mut strict, _) = migratedb(MigrateConfig::default(), history.clone(), late.clone());
    match strict.migrate() {
        Err(Error::Validation(result)) => assert_eq!(
            result.invalid_migrations[0].details.code,
            ErrorCode::ResolvedVersionedMigrationNotApplied
        ),
        other => panic!("expected validation failure, got {other:?}"),
    }

    let config = MigrateConfig::default().with_out_of_order(true);
    let (mut relaxed, _) = migratedb(config, history.clone(), late);
    assert_eq!(relaxed.migrate().unwrap().migrations_executed, 1);
    let info = relaxed.info().unwrap();
    assert_eq!(info.out_of_order().len(), 1);
}

#[test]
fn test_cherry_pick_restricts_pending() {
    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two"))
        .with(sql("3", "three"));
    let config = MigrateConfig::default()
        .with_cherry_pick(["1", "3"])
        .with_validate_on_migrate(false);
    let (mut db, handle) = migratedb(config, memory_history(), resolver);

    db.migrate().unwrap();
    assert_eq!(handle.lock().committed, vec!["one", "three"]);
}

#[test]
fn test_baseline_on_migrate_skips_old_migrations() {
    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("2", "two"))
        .with(sql("3", "three"));
    let config = MigrateConfig::default()
        .with_baseline_on_migrate(true)
        .with_baseline_version(Version::parse("2").unwrap());
    let (mut db, handle) = migratedb(config, memory_history(), resolver);
    handle.lock().empty = false;

    let result = db.migrate().unwrap();
    assert_eq!(result.initial_schema_version.as_deref(), Some("2"));
    assert_eq!(handle.lock().committed, vec!["three"]);

    let info = db.info().unwrap();
    let state_of = |v: &str| {
        info.all()
            .iter()
            .find(|i| i.version() == Some(&Version::parse(v).unwrap()))
            .map(|i| i.state())
    };
    assert_eq!(state_of("1"), Some(MigrationState::BelowBaseline));
    assert_eq!(state_of("2"), Some(MigrationState::Baseline));
    assert_eq!(state_of("3"), Some(MigrationState::Success));
}

#[test]
fn test_clean_on_validation_error() {
    let history = memory_history();
    let (mut db, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new().with(sql("1", "one")),
    );
    db.migrate().unwrap();

    let changed = CodeResolver::new().with(sql("1", "one").with_checksum(2));
    let (mut strict, _) = migratedb(MigrateConfig::default(), history.clone(), changed.clone());
    match strict.migrate() {
        Err(Error::Validation(result)) => {
            assert_eq!(result.invalid_migrations[0].details.code, ErrorCode::ChecksumMismatch);
            assert!(result.summary().contains("-> Applied to database : 1"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    let config = MigrateConfig::default().with_clean_on_validation_error(true);
    let (mut cleaning, handle) = migratedb(config, history.clone(), changed);
    assert_eq!(cleaning.migrate().unwrap().migrations_executed, 1);
    assert_eq!(handle.lock().cleaned, 1);
    assert_eq!(user_rows(history.as_ref()), vec![(Some("1".to_string()), true)]);
    assert_eq!(history.all_applied_migrations().unwrap().last().unwrap().checksum, Some(2));
}

#[derive(Default)]
struct EventLog(Mutex<Vec<(Event, Option<String>)>>);

impl Callback for EventLog {
    fn supports(&self, _event: Event) -> bool {
        true
    }

    fn handle(&self, event: Event, migration: Option<&MigrationInfo>) -> Result<(), BoxError> {
        self.0.lock().push((event, migration.map(|m| m.description().to_string())));
        Ok(())
    }

    fn name(&self) -> &str {
        "event-log"
    }
}

#[test]
fn test_callbacks_observe_lifecycle() {
    let log = Arc::new(EventLog::default());
    let resolver = CodeResolver::new().with(sql("1", "one"));
    let (db, _) = migratedb(MigrateConfig::default(), memory_history(), resolver);
    let mut db = db.with_callback(log.clone());

    db.migrate().unwrap();
    let events: Vec<Event> = log.0.lock().iter().map(|(e, _)| *e).collect();
    assert_eq!(
        events,
        vec![
            Event::BeforeValidate,
            Event::AfterValidate,
            Event::BeforeMigrate,
            Event::BeforeEachMigrate,
            Event::AfterEachMigrate,
            Event::AfterVersioned,
            Event::AfterMigrate,
        ]
    );
    assert_eq!(log.0.lock()[3].1.as_deref(), Some("one"));

    log.0.lock().clear();
    db.repair().unwrap();
    let events: Vec<Event> = log.0.lock().iter().map(|(e, _)| *e).collect();
    assert_eq!(events, vec![Event::BeforeRepair, Event::AfterRepair]);
}

#[test]
fn test_sled_history_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = || CodeResolver::new().with(sql("1", "one")).with(sql("2", "two"));

    {
        let history = Arc::new(SledSchemaHistory::open(sled::open(dir.path()).unwrap(), "history"));
        let (mut db, _) = migratedb(MigrateConfig::default(), history.clone(), resolver());
        assert_eq!(db.migrate().unwrap().migrations_executed, 2);
        history.flush().unwrap();
    }

    let history = Arc::new(SledSchemaHistory::open(sled::open(dir.path()).unwrap(), "history"));
    let (mut db, handle) = migratedb(MigrateConfig::default(), history, resolver());
    let info = db.info().unwrap();
    assert!(info.pending().is_empty());
    assert_eq!(info.current_version(), Version::parse("2").unwrap());
    drop(info);

    assert_eq!(db.migrate().unwrap().migrations_executed, 0);
    assert!(handle.lock().committed.is_empty());
}

#[test]
fn test_script_migrations() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("V1__create_users.sql"), "CREATE TABLE ${owner}.users").unwrap();
    fs::write(dir.path().join("V2__load_users.sql"), "INSERT INTO users").unwrap();
    fs::write(dir.path().join("V2__load_users.sql.conf"), "executeInTransaction=false\n").unwrap();
    fs::write(dir.path().join("R__user_view.sql"), "CREATE VIEW user_view").unwrap();
    fs::write(dir.path().join("notes.txt"), "not a migration").unwrap();

    init_tracing();
    let (database, handle) = TestDatabase::boxed();
    let config = MigrateConfig::default().with_placeholder("owner", "app");
    let mut db = MigrateDb::new(config, database, memory_history())
        .with_resolver(Arc::new(ScriptResolver::new([dir.path()])));

    let result = db.migrate().unwrap();
    assert_eq!(result.migrations_executed, 3);
    assert_eq!(result.migrations[0].description, "create users");
    let state = handle.lock();
    assert_eq!(
        state.committed,
        vec!["CREATE TABLE app.users", "INSERT INTO users", "CREATE VIEW user_view"]
    );
    assert_eq!(state.transactions, 2);
}

#[test]
fn test_validate_whitelist() {
    let history = memory_history();
    let (mut db, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new().with(sql("1", "one")),
    );
    db.migrate().unwrap();

    let resolver = CodeResolver::new().with(sql("1", "one")).with(sql("2", "two"));
    let (strict, _) = migratedb(MigrateConfig::default(), history.clone(), resolver.clone());
    let result = strict.validate().unwrap();
    assert_eq!(result.invalid_migrations.len(), 1);
    assert_eq!(
        result.invalid_migrations[0].details.code,
        ErrorCode::ResolvedVersionedMigrationNotApplied
    );

    let config = MigrateConfig::default().with_allowed_match(ValidMatch::Pending);
    let (relaxed, _) = migratedb(config, history, resolver);
    assert!(relaxed.validate().unwrap().is_valid());
}

#[test]
fn test_every_migration_reported_once() {
    let history = memory_history();
    let (mut db, _) = migratedb(
        MigrateConfig::default(),
        history.clone(),
        CodeResolver::new()
            .with(sql("1", "one"))
            .with(sql("2", "two"))
            .with(repeatable("seed", 1)),
    );
    db.migrate().unwrap();

    let resolver = CodeResolver::new()
        .with(sql("1", "one"))
        .with(sql("3", "three"))
        .with(repeatable("seed", 2));
    let (db, _) = migratedb(MigrateConfig::default(), history.clone(), resolver);

    let snapshot = |db: &MigrateDb| -> Vec<(Option<String>, String, MigrationState)> {
        db.info()
            .unwrap()
            .all()
            .iter()
            .filter(|i| i.migration_type() != MigrationType::Schema)
            .map(|i| (i.version().map(ToString::to_string), i.description().to_string(), i.state()))
            .collect()
    };
    let first = snapshot(&db);
    assert_eq!(
        first,
        vec![
            (Some("1".to_string()), "one".to_string(), MigrationState::Success),
            (Some("2".to_string()), "two".to_string(), MigrationState::MissingSuccess),
            (None, "seed".to_string(), MigrationState::Outdated),
            (Some("3".to_string()), "three".to_string(), MigrationState::Pending),
        ]
    );
    assert_eq!(snapshot(&db), first);
}
