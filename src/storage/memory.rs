// In-memory driver used by the engine and orchestration tests.
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use super::{DriverKind, ObjectKey, StorageDriver, StorageTarget};
use crate::errors::{StorageError, StorageResult};

#[derive(Default)]
pub struct MemoryDriver {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<HashMap<String, i64>>,
    uploads: Mutex<Vec<String>>,
    failing_stats: HashSet<String>,
    failing_uploads: HashSet<String>,
    deny_bucket_create: bool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends `key` already exists remotely with the given mtime.
    pub fn with_object(self, key: &str, last_modified: i64) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), last_modified);
        self
    }

    pub fn with_failing_stat(mut self, key: &str) -> Self {
        self.failing_stats.insert(key.to_string());
        self
    }

    pub fn with_failing_upload(mut self, key: &str) -> Self {
        self.failing_uploads.insert(key.to_string());
        self
    }

    pub fn denying_bucket_create(mut self) -> Self {
        self.deny_bucket_create = true;
        self
    }

    /// Keys of every successful upload, in call order.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().unwrap().contains(bucket)
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::PathStyle
    }

    async fn ensure_bucket(&self, target: &StorageTarget) -> StorageResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains(&target.bucket) {
            return Ok(());
        }
        if self.deny_bucket_create {
            return Err(StorageError::Permission(format!(
                "create bucket {}: AccessDenied",
                target.bucket
            )));
        }
        buckets.insert(target.bucket.clone());
        Ok(())
    }

    async fn stat_object(
        &self,
        _target: &StorageTarget,
        key: &ObjectKey,
    ) -> StorageResult<Option<i64>> {
        if self.failing_stats.contains(key.as_str()) {
            return Err(StorageError::Backend(format!(
                "head object {}: service unavailable",
                key
            )));
        }
        Ok(self.objects.lock().unwrap().get(key.as_str()).copied())
    }

    async fn upload_object(
        &self,
        _target: &StorageTarget,
        key: &ObjectKey,
        local_path: &Path,
    ) -> StorageResult<()> {
        std::fs::read(local_path).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        if self.failing_uploads.contains(key.as_str()) {
            return Err(StorageError::Backend(format!(
                "put object {}: connection reset",
                key
            )));
        }
        // Real stores stamp Last-Modified with the upload time.
        let now = chrono::Utc::now().timestamp();
        self.objects
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), now);
        self.uploads.lock().unwrap().push(key.as_str().to_string());
        Ok(())
    }
}
