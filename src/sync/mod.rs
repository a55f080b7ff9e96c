// docbackup/src/sync/mod.rs
pub(crate) mod logic;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::storage::StorageDriver;
pub use logic::{MEDIA_PREFIX, SyncReport, derive_key, sync_directory};

/// Public entry point for the document sync.
/// Makes sure the bucket exists, then mirrors `docs_dir` under `media/`.
pub async fn run_sync_flow(app_config: &AppConfig, driver: &dyn StorageDriver) -> Result<SyncReport> {
    let target = app_config.storage.target();
    driver
        .ensure_bucket(&target)
        .await
        .with_context(|| format!("Failed to ensure bucket {} exists", target.bucket))?;

    log::info!(target: "sync", "Starting media upload...");
    Ok(sync_directory(driver, &target, &app_config.docs_dir, MEDIA_PREFIX).await)
}
