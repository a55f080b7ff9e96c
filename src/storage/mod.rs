//! Object storage drivers
//!
//! The backup flow talks to object storage through [`StorageDriver`] only.
//! Which backend sits behind it is decided once, in [`connect`].

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::errors::StorageResult;
use s3::S3Driver;

/// Addressing flavour of the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// AWS S3 (virtual-hosted addressing).
    S3,
    /// Path-addressed S3-compatible store such as MinIO.
    PathStyle,
}

impl DriverKind {
    pub fn force_path_style(self) -> bool {
        matches!(self, DriverKind::PathStyle)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown storage driver '{0}', expected 'aws' or 'minio'")]
pub struct UnknownDriverKind(String);

impl FromStr for DriverKind {
    type Err = UnknownDriverKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "s3" => Ok(DriverKind::S3),
            "minio" | "path-style" | "path_style" => Ok(DriverKind::PathStyle),
            _ => Err(UnknownDriverKind(s.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::S3 => f.write_str("aws"),
            DriverKind::PathStyle => f.write_str("minio"),
        }
    }
}

/// Bucket a run writes into. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub kind: DriverKind,
    pub bucket: String,
}

/// Forward-slash separated key of an object inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        ObjectKey(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities the backup flow needs from an object store.
///
/// Implementations perform exactly one remote call per method; retrying is
/// left to the caller.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Makes sure `target.bucket` exists, creating it when the backend reports
    /// it missing.
    async fn ensure_bucket(&self, target: &StorageTarget) -> StorageResult<()>;

    /// Last-modified time of `key` in whole Unix seconds, or `None` if the
    /// object does not exist.
    async fn stat_object(
        &self,
        target: &StorageTarget,
        key: &ObjectKey,
    ) -> StorageResult<Option<i64>>;

    /// Streams `local_path` to `key`, replacing any existing object.
    async fn upload_object(
        &self,
        target: &StorageTarget,
        key: &ObjectKey,
        local_path: &Path,
    ) -> StorageResult<()>;
}

/// Builds the driver selected by the configuration.
pub async fn connect(config: &StorageConfig) -> Box<dyn StorageDriver> {
    match config.driver {
        DriverKind::S3 => Box::new(S3Driver::aws(config).await),
        DriverKind::PathStyle => Box::new(S3Driver::path_style(config).await),
    }
}
