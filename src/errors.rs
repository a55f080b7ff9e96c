use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by a storage driver.
///
/// "Object not found" is not an error at this level: drivers collapse it into
/// an absent result before it reaches the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Permission denied by storage backend: {0}")]
    Permission(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
