//! Create, list, restore and delete through the public API.

#[path = "helpers.rs"]
mod helpers;

use std::io::Read;
use std::sync::Arc;

use db_snapshot::{BackupOptions, EngineConfig, ErrorKind, SnapshotCoordinator, SnapshotFormat};
use flate2::read::GzDecoder;
use helpers::{create_test_coordinator, FakeToolRunner};
use tempfile::TempDir;

#[tokio::test]
async fn test_sql_snapshot_is_listed_first_and_decompresses() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("backup_2001-01-01T00-00-00.000Z.sql.gz"), b"old").unwrap();
    let runner = Arc::new(FakeToolRunner::new());
    let coordinator = create_test_coordinator(dir.path(), runner.clone()).await;

    let outcome = coordinator
        .create_snapshot(&BackupOptions::full_sql())
        .await
        .unwrap();
    let record = &outcome.record;

    assert!(record.file_name.starts_with("backup_"));
    assert!(record.file_name.ends_with(".sql.gz"));
    assert!(!record.file_name.contains(':'));
    assert!(record.size_bytes > 0);
    assert_eq!(record.format, SnapshotFormat::Sql);
    assert!(outcome.warnings.is_empty());

    let listed = coordinator.list_snapshots().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].file_name, record.file_name);
    assert_eq!(listed[0].size_bytes, record.size_bytes);

    let mut sql = String::new();
    GzDecoder::new(std::fs::File::open(dir.path().join(&record.file_name)).unwrap())
        .read_to_string(&mut sql)
        .unwrap();
    assert!(sql.contains("CREATE TABLE patients"));

    // Credentials never reach the argument vector.
    let invocations = runner.invocations.lock().unwrap();
    let dump = &invocations[0];
    assert_eq!(dump.program, "pg_dump");
    assert!(dump.args.iter().all(|a| !a.to_string_lossy().contains("s3cret")));
    assert!(dump.env.iter().any(|(k, v)| k == "PGPASSWORD" && v == "s3cret"));
    assert!(dump.env.iter().any(|(k, v)| k == "PGDATABASE" && v == "clinic"));
}

#[tokio::test]
async fn test_schema_only_dump_with_table_filter_arguments() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeToolRunner::new());
    let coordinator = create_test_coordinator(dir.path(), runner.clone()).await;
    let mut options = BackupOptions {
        include_data: false,
        ..BackupOptions::full_sql()
    };
    options.table_filter.insert("patients".to_string());
    options.table_filter.insert("visits".to_string());

    coordinator.create_snapshot(&options).await.unwrap();

    let invocations = runner.invocations.lock().unwrap();
    let args: Vec<String> = invocations[0]
        .args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert!(args.contains(&"--schema-only".to_string()));
    assert!(args.contains(&"--table=patients".to_string()));
    assert!(args.contains(&"--table=visits".to_string()));
    assert!(!args.iter().any(|a| a == "--data-only"));
}

#[tokio::test]
async fn test_delete_then_list() {
    let dir = TempDir::new().unwrap();
    let coordinator = create_test_coordinator(dir.path(), Arc::new(FakeToolRunner::new())).await;
    let sql = coordinator
        .create_snapshot(&BackupOptions::full_sql())
        .await
        .unwrap();
    let xlsx = coordinator
        .create_snapshot(&BackupOptions::spreadsheet())
        .await
        .unwrap();

    coordinator
        .delete_snapshot(&sql.record.file_name)
        .await
        .unwrap();
    let listed = coordinator.list_snapshots().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, xlsx.record.file_name);

    let err = coordinator
        .delete_snapshot(&sql.record.file_name)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let missing_db = EngineConfig {
        database_url: "postgres://localhost:5432/".to_string(),
        ..Default::default()
    };
    let err = SnapshotCoordinator::connect(&missing_db).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let no_url = EngineConfig::default();
    assert_eq!(
        SnapshotCoordinator::connect(&no_url).err().unwrap().kind(),
        ErrorKind::Configuration
    );
}

// Needs a reachable PostgreSQL with pg_dump/psql on PATH; run with DATABASE_URL
// set and `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn test_real_pg_dump_round_trip() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        database_url: url,
        backup_root: dir.path().join("backups"),
        ..Default::default()
    };
    let coordinator = SnapshotCoordinator::connect(&config).unwrap();

    let dump = coordinator
        .create_snapshot(&BackupOptions::full_sql())
        .await
        .unwrap();
    assert!(dump.record.size_bytes > 0);
    let listed = coordinator.list_snapshots().await.unwrap();
    assert_eq!(listed[0].file_name, dump.record.file_name);

    let export = coordinator
        .create_snapshot(&BackupOptions::spreadsheet())
        .await
        .unwrap();
    assert!(export.record.file_name.ends_with(".xlsx"));
}
