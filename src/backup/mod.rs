mod logic;
pub(crate) mod compress; // Gzip of the SQL dump
pub(crate) mod db_dump; // pg_dump invocation

use anyhow::Result;
use crate::config::AppConfig;
use crate::storage::{ObjectKey, StorageDriver};
pub use logic::{BackupStamp, BackupSummary};

/// Public entry point for the full backup: database dump plus document sync.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    driver: &dyn StorageDriver,
    stamp: &BackupStamp,
) -> Result<BackupSummary> {
    logic::perform_backup_orchestration(app_config, driver, stamp).await
}

/// Public entry point for the database-only backup.
pub async fn run_dump_flow(
    app_config: &AppConfig,
    driver: &dyn StorageDriver,
    stamp: &BackupStamp,
) -> Result<ObjectKey> {
    logic::perform_dump_orchestration(app_config, driver, stamp).await
}
