// docbackup/src/sync/logic.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

use crate::storage::{ObjectKey, StorageDriver, StorageTarget};

/// Key prefix for the document tree.
pub const MEDIA_PREFIX: &str = "media/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Upload,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    /// No object under the key yet.
    Absent,
    /// Local file modified after the remote copy was written.
    Stale,
    UpToDate,
    /// Metadata lookup failed; uploaded so the file is never silently left out.
    CheckFailed,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SyncReason::Absent => "absent",
            SyncReason::Stale => "stale",
            SyncReason::UpToDate => "up to date",
            SyncReason::CheckFailed => "check failed",
        };
        f.write_str(reason)
    }
}

/// What the store told us about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Absent,
    /// Remote last-modified, whole Unix seconds.
    Present(i64),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDecision {
    pub key: ObjectKey,
    pub action: SyncAction,
    pub reason: SyncReason,
}

impl SyncDecision {
    /// Upload only when the local file is strictly newer than the remote
    /// copy; equal timestamps count as already synced.
    pub fn decide(key: ObjectKey, local_mtime: i64, remote: RemoteState) -> Self {
        let (action, reason) = match remote {
            RemoteState::Absent => (SyncAction::Upload, SyncReason::Absent),
            RemoteState::Present(remote_mtime) if local_mtime > remote_mtime => {
                (SyncAction::Upload, SyncReason::Stale)
            }
            RemoteState::Present(_) => (SyncAction::Skip, SyncReason::UpToDate),
            RemoteState::Unknown => (SyncAction::Upload, SyncReason::CheckFailed),
        };
        SyncDecision { key, action, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub key: ObjectKey,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Per-run counters of a directory sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub skipped: usize,
    /// Upload calls that failed.
    pub errored: usize,
    /// Entries that could not be inspected and never reached an upload call.
    pub unreadable: usize,
    pub failed_keys: Vec<ObjectKey>,
}

impl SyncReport {
    fn record(&mut self, outcome: UploadOutcome) {
        if outcome.succeeded {
            self.uploaded += 1;
        } else {
            log::error!(
                target: "sync",
                "Failed to upload {}: {}",
                outcome.key,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            self.errored += 1;
            self.failed_keys.push(outcome.key);
        }
    }

    pub fn has_failures(&self) -> bool {
        self.errored > 0 || self.unreadable > 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped, {} errored, {} unreadable",
            self.uploaded, self.skipped, self.errored, self.unreadable
        )
    }
}

/// Builds `prefix + relative path` with `/` between components, whatever the
/// host separator is.
pub fn derive_key(prefix: &str, relative: &Path) -> Result<ObjectKey> {
    let mut key = normalize_prefix(prefix);
    let mut components = 0;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().with_context(|| {
                    format!("Path component {:?} of {} is not valid UTF-8", part, relative.display())
                })?;
                if components > 0 {
                    key.push('/');
                }
                key.push_str(part);
                components += 1;
            }
            Component::CurDir => {}
            other => anyhow::bail!(
                "Unexpected component {:?} in relative path {}",
                other,
                relative.display()
            ),
        }
    }

    if components == 0 {
        anyhow::bail!("Cannot derive an object key from an empty path");
    }
    Ok(ObjectKey::from(key))
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_start_matches('/');
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Uploads every regular file under `local_root` whose remote copy is missing
/// or older, under `key_prefix`.
///
/// Symlinks are not followed and, like sockets and other special files, are
/// not uploaded. A failed upload is counted and the walk goes on. A missing
/// `local_root` yields an empty report.
pub async fn sync_directory(
    driver: &dyn StorageDriver,
    target: &StorageTarget,
    local_root: &Path,
    key_prefix: &str,
) -> SyncReport {
    let mut report = SyncReport::default();

    if !local_root.exists() {
        log::info!(target: "sync", "Local directory {} does not exist, nothing to sync", local_root.display());
        return report;
    }
    if !local_root.is_dir() {
        log::warn!(target: "sync", "{} is not a directory, nothing to sync", local_root.display());
        return report;
    }

    log::info!(
        target: "sync",
        "Syncing {} to {} bucket {} under '{}'",
        local_root.display(),
        target.kind,
        target.bucket,
        key_prefix
    );

    for entry in WalkDir::new(local_root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!(target: "sync", "Failed to read directory entry: {}", err);
                report.unreadable += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            log::debug!(target: "sync", "Skipping symlink {}", entry.path().display());
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let (key, local_mtime) = match inspect_entry(local_root, &entry, key_prefix) {
            Ok(state) => state,
            Err(err) => {
                log::warn!(target: "sync", "Skipping {}: {:#}", entry.path().display(), err);
                report.unreadable += 1;
                continue;
            }
        };

        let remote = match driver.stat_object(target, &key).await {
            Ok(Some(remote_mtime)) => RemoteState::Present(remote_mtime),
            Ok(None) => RemoteState::Absent,
            Err(err) => {
                log::warn!(target: "sync", "Error checking {}, uploading anyway: {}", key, err);
                RemoteState::Unknown
            }
        };

        let decision = SyncDecision::decide(key, local_mtime, remote);
        match decision.action {
            SyncAction::Skip => {
                log::debug!(target: "sync", "Skipping {} ({})", decision.key, decision.reason);
                report.skipped += 1;
            }
            SyncAction::Upload => {
                let outcome = upload(driver, target, &decision, entry.path()).await;
                report.record(outcome);
            }
        }
    }

    log::info!(target: "sync", "Sync of {} finished: {}", local_root.display(), report);
    report
}

async fn upload(
    driver: &dyn StorageDriver,
    target: &StorageTarget,
    decision: &SyncDecision,
    path: &Path,
) -> UploadOutcome {
    match driver.upload_object(target, &decision.key, path).await {
        Ok(()) => {
            log::info!(target: "sync", "Uploaded {} ({})", decision.key, decision.reason);
            UploadOutcome {
                key: decision.key.clone(),
                succeeded: true,
                error: None,
            }
        }
        Err(err) => UploadOutcome {
            key: decision.key.clone(),
            succeeded: false,
            error: Some(err.to_string()),
        },
    }
}

fn inspect_entry(local_root: &Path, entry: &DirEntry, key_prefix: &str) -> Result<(ObjectKey, i64)> {
    let relative = entry.path().strip_prefix(local_root).with_context(|| {
        format!(
            "Failed to strip prefix {} from {}",
            local_root.display(),
            entry.path().display()
        )
    })?;
    let key = derive_key(key_prefix, relative)?;

    let modified = entry
        .metadata()
        .context("Failed to read file metadata")?
        .modified()
        .context("File modification time unavailable")?;
    Ok((key, DateTime::<Utc>::from(modified).timestamp()))
}
