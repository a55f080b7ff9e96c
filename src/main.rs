//! Document-management Backup Tool
//!
//! Dumps the database, uploads it and incrementally mirrors the document tree
//! to S3 or a MinIO-style object store.

// docbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod storage;
mod sync;
mod utils;

use anyhow::{Context, Result};
use backup::BackupStamp;
use clap::{Parser, Subcommand};
use config::AppConfig;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;
use sync::SyncReport;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    /// Read the configuration from environment variables (and `.env`) instead.
    #[arg(long)]
    from_env: bool,

    /// Verbosity of the command output.
    #[arg(long)]
    verbose: Option<LevelFilter>,

    #[command(subcommand)]
    operation: Operation,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Operation {
    /// Dump and upload the database, then sync the documents.
    Backup,
    /// Dump and upload the database only.
    Dump,
    /// Sync the documents only.
    Sync,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.verbose {
        logger.filter_level(level);
    }
    logger.init();

    match run_app(cli).await {
        Ok(()) => {
            log::info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("❌ Operation failed: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = if cli.from_env {
        AppConfig::load_from_env().context("Failed to load configuration from environment")?
    } else {
        AppConfig::load_from_json(&cli.config).with_context(|| {
            format!(
                "Failed to load application configuration from {}",
                cli.config.display()
            )
        })?
    };

    let stamp = BackupStamp::now();
    let driver = storage::connect(&app_config.storage).await;
    log::info!(
        "Using {} storage driver, bucket {}, run {}",
        driver.kind(),
        app_config.storage.bucket_name,
        stamp
    );

    match cli.operation {
        Operation::Backup => {
            let summary = backup::run_backup_flow(&app_config, driver.as_ref(), &stamp)
                .await
                .context("Backup process failed")?;
            log::info!("Database backup stored as {}", summary.db_key);
            check_sync_report(&app_config, &summary.media)
        }
        Operation::Dump => {
            backup::run_dump_flow(&app_config, driver.as_ref(), &stamp)
                .await
                .context("Database backup failed")?;
            Ok(())
        }
        Operation::Sync => {
            let report = sync::run_sync_flow(&app_config, driver.as_ref())
                .await
                .context("Document sync failed")?;
            check_sync_report(&app_config, &report)
        }
    }
}

/// Applies the configured policy for runs where some files failed.
fn check_sync_report(app_config: &AppConfig, report: &SyncReport) -> Result<()> {
    for key in &report.failed_keys {
        log::warn!("Not backed up: {}", key);
    }
    if report.has_failures() && app_config.fail_on_sync_errors {
        anyhow::bail!(
            "Document sync incomplete: {} uploads failed, {} files could not be read",
            report.errored,
            report.unreadable
        );
    }
    Ok(())
}
