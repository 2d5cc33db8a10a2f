//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `db_snapshot` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All snapshot functionality is implemented in the library crate.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;

use db_snapshot::config::{Cli, Command};
use db_snapshot::initialization::init_logger_with;
use db_snapshot::{
    start_retention_task, CatalogReader, RetentionManager, RetentionPolicy, SnapshotCoordinator,
    SnapshotRecord,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    if let Err(e) = run(cli).await {
        eprintln!("db_snapshot error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.engine_config();

    match &cli.command {
        Command::Create(args) => {
            let coordinator =
                SnapshotCoordinator::connect(&config).context("Invalid configuration")?;
            let cancel = cancel_on_ctrl_c();
            let outcome = coordinator
                .create_snapshot_with_cancel(&args.backup_options(), &cancel)
                .await
                .context("Snapshot failed")?;

            println!(
                "✅ Created {} ({} bytes)",
                outcome.record.file_name, outcome.record.size_bytes
            );
            for table in outcome.tables.iter().filter(|t| t.truncated) {
                println!(
                    "   {} truncated to {} rows",
                    table.table_name, table.row_count
                );
            }
            for warning in &outcome.warnings {
                println!("⚠️  {warning}");
            }
        }
        Command::List { json } => {
            let records = CatalogReader::new(config.backup_root.clone())
                .list()
                .await
                .context("Failed to read backup root")?;
            print_records(&records, *json)?;
        }
        Command::Delete { file } => {
            let coordinator =
                SnapshotCoordinator::connect(&config).context("Invalid configuration")?;
            coordinator
                .delete_snapshot(file)
                .await
                .with_context(|| format!("Failed to delete {file}"))?;
            println!("🗑️  Deleted {file}");
        }
        Command::Restore { file, yes } => {
            if !*yes {
                bail!("restoring {file} overwrites the target database; pass --yes to confirm");
            }
            let coordinator =
                SnapshotCoordinator::connect(&config).context("Invalid configuration")?;
            let cancel = cancel_on_ctrl_c();
            coordinator
                .restore_snapshot_with_cancel(file, &cancel)
                .await
                .with_context(|| format!("Failed to restore {file}"))?;
            println!(
                "✅ Restored {} from {file}",
                coordinator.connection().target_key()
            );
        }
        Command::Sweep { max_age_days } => {
            config
                .validate_retention()
                .context("Invalid configuration")?;
            let policy = RetentionPolicy {
                max_age_days: max_age_days.unwrap_or(config.retention_days),
            };
            let manager = RetentionManager::new(CatalogReader::new(config.backup_root.clone()));
            let report = manager.sweep(policy).await.context("Retention sweep failed")?;
            for file in &report.deleted {
                println!("🗑️  {file}");
            }
            for (file, err) in &report.failed {
                eprintln!("❌ {file}: {err}");
            }
            println!(
                "Sweep finished: {} deleted, {} failed",
                report.deleted.len(),
                report.failed.len()
            );
            if !report.failed.is_empty() {
                bail!("{} expired snapshot(s) could not be deleted", report.failed.len());
            }
        }
        Command::Watch { .. } => {
            config
                .validate_retention()
                .context("Invalid configuration")?;
            let manager = std::sync::Arc::new(RetentionManager::new(CatalogReader::new(
                config.backup_root.clone(),
            )));
            let (shutdown, handle) =
                start_retention_task(manager, config.retention_policy(), config.sweep_interval)
                    .context("Failed to start retention task")?;
            println!(
                "Sweeping {} every {}s (max age {} days); Ctrl-C to stop",
                config.backup_root.display(),
                config.sweep_interval.as_secs(),
                config.retention_days
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            shutdown.cancel();
            handle.await.context("Retention task panicked")?;
        }
    }
    Ok(())
}

fn print_records(records: &[SnapshotRecord], json: bool) -> Result<()> {
    if json {
        for record in records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }
    if records.is_empty() {
        println!("No snapshots");
        return Ok(());
    }
    for record in records {
        println!(
            "{:<44} {:>12} {:<12} {}",
            record.file_name,
            record.size_bytes,
            record.format.to_string(),
            record.created_at.to_rfc3339()
        );
    }
    Ok(())
}

/// Token cancelled on the first Ctrl-C, so subprocesses are killed and temp files removed.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling");
            child.cancel();
        }
    });
    token
}
