// docbackup/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::{compress, db_dump};
use crate::config::AppConfig;
use crate::storage::{ObjectKey, StorageDriver, StorageTarget};
use crate::sync::{MEDIA_PREFIX, SyncReport, derive_key, sync_directory};

/// Key prefix for database artifacts.
pub const DB_PREFIX: &str = "db/";

/// `YYYYMMDDHHMMSS` stamp naming the artifacts of one run. Computed once at
/// startup and passed down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStamp(String);

impl BackupStamp {
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    pub fn at(moment: NaiveDateTime) -> Self {
        BackupStamp(moment.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn dump_file_name(&self) -> String {
        format!("db_backup_{}.sql", self.0)
    }
}

impl fmt::Display for BackupStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct BackupSummary {
    pub db_key: ObjectKey,
    pub media: SyncReport,
}

/// Dumps the database into `backup_dir` and gzips the dump.
///
/// # Returns
/// Path of the `.sql.gz` file.
pub async fn create_database_artifact(app_config: &AppConfig, stamp: &BackupStamp) -> Result<PathBuf> {
    fs::create_dir_all(&app_config.backup_dir).with_context(|| {
        format!(
            "Failed to create backup directory: {}",
            app_config.backup_dir.display()
        )
    })?;

    let sql_path = app_config.backup_dir.join(stamp.dump_file_name());
    db_dump::dump_database(&app_config.database, &sql_path, app_config.dump_timeout).await?;
    compress::gzip_file(&sql_path)
}

/// Uploads a database artifact under `db/<file name>`.
pub async fn upload_database_artifact(
    driver: &dyn StorageDriver,
    target: &StorageTarget,
    artifact: &Path,
) -> Result<ObjectKey> {
    let file_name = artifact
        .file_name()
        .with_context(|| format!("Invalid database artifact path: {}", artifact.display()))?;
    let db_key = derive_key(DB_PREFIX, Path::new(file_name))?;

    driver
        .upload_object(target, &db_key, artifact)
        .await
        .with_context(|| {
            format!(
                "Failed to upload database backup {} to bucket {}",
                artifact.display(),
                target.bucket
            )
        })?;

    log::info!(target: "backup", "Uploaded DB backup: {}", db_key);
    Ok(db_key)
}

/// Dump, compress and upload the database; no document sync.
pub async fn perform_dump_orchestration(
    app_config: &AppConfig,
    driver: &dyn StorageDriver,
    stamp: &BackupStamp,
) -> Result<ObjectKey> {
    log::info!(target: "backup", "Starting DB backup...");
    let artifact = create_database_artifact(app_config, stamp).await?;

    let target = app_config.storage.target();
    driver
        .ensure_bucket(&target)
        .await
        .with_context(|| format!("Failed to ensure bucket {} exists", target.bucket))?;

    upload_database_artifact(driver, &target, &artifact).await
}

/// Full run: database artifact first, then the document tree.
pub async fn perform_backup_orchestration(
    app_config: &AppConfig,
    driver: &dyn StorageDriver,
    stamp: &BackupStamp,
) -> Result<BackupSummary> {
    let db_key = perform_dump_orchestration(app_config, driver, stamp).await?;

    log::info!(target: "backup", "Starting media upload...");
    let target = app_config.storage.target();
    let media = sync_directory(driver, &target, &app_config.docs_dir, MEDIA_PREFIX).await;

    Ok(BackupSummary { db_key, media })
}
