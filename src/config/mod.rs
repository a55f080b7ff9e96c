// docbackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::storage::{DriverKind, StorageTarget};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_PATH_STYLE_BUCKET: &str = "paperless-backups";
const DEFAULT_DUMP_TIMEOUT_SECS: u64 = 3600;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDatabaseConfig {
    pub name: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub pgpass_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStorageConfig {
    pub driver: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub secure: Option<bool>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub backup_dir: Option<PathBuf>,
    pub docs_dir: Option<PathBuf>,
    pub dump_timeout_secs: Option<u64>,
    pub fail_on_sync_errors: Option<bool>,
    pub database: Option<RawDatabaseConfig>,
    pub storage: Option<RawStorageConfig>,
}

impl RawConfig {
    /// Collects configuration from environment-style variables.
    ///
    /// Which bucket, endpoint and credential variables are consulted depends on
    /// `STORAGE_DRIVER` (`aws` or `minio`, defaulting to `minio`).
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let driver = match var("STORAGE_DRIVER") {
            Some(name) => name.parse::<DriverKind>()?,
            None => DriverKind::PathStyle,
        };

        let storage = match driver {
            DriverKind::S3 => RawStorageConfig {
                driver: Some(driver.to_string()),
                bucket_name: var("S3_BUCKET"),
                region: var("AWS_REGION"),
                endpoint_url: var("S3_ENDPOINT"),
                secure: None,
                access_key_id: var("AWS_ACCESS_KEY_ID"),
                secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            },
            DriverKind::PathStyle => RawStorageConfig {
                driver: Some(driver.to_string()),
                bucket_name: var("MINIO_BUCKET"),
                region: var("AWS_REGION"),
                endpoint_url: var("MINIO_ENDPOINT"),
                secure: var("MINIO_SECURE")
                    .map(|value| parse_flag("MINIO_SECURE", &value))
                    .transpose()?,
                access_key_id: var("MINIO_ACCESS_KEY"),
                secret_access_key: var("MINIO_SECRET_KEY"),
            },
        };

        let port = var("DB_PORT")
            .map(|value| {
                value
                    .parse::<u16>()
                    .with_context(|| format!("DB_PORT is not a valid port: {}", value))
            })
            .transpose()?;
        let dump_timeout_secs = var("DUMP_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .with_context(|| format!("DUMP_TIMEOUT_SECS is not a number: {}", value))
            })
            .transpose()?;
        let fail_on_sync_errors = var("FAIL_ON_SYNC_ERRORS")
            .map(|value| parse_flag("FAIL_ON_SYNC_ERRORS", &value))
            .transpose()?;

        Ok(RawConfig {
            backup_dir: var("BACKUP_DIR").map(PathBuf::from),
            docs_dir: var("DOCS_DIR").map(PathBuf::from),
            dump_timeout_secs,
            fail_on_sync_errors,
            database: Some(RawDatabaseConfig {
                name: var("DB_NAME"),
                user: var("DB_USER"),
                host: var("DB_HOST"),
                port,
                pgpass_file: var("PGPASS_FILE").map(PathBuf::from),
            }),
            storage: Some(storage),
        })
    }
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub host: String,
    pub port: Option<u16>,
    pub pgpass_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub driver: DriverKind,
    pub bucket_name: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl StorageConfig {
    pub fn target(&self) -> StorageTarget {
        StorageTarget {
            kind: self.driver,
            bucket: self.bucket_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Staging directory for database dumps.
    pub backup_dir: PathBuf,
    /// Root of the document tree mirrored under `media/`.
    pub docs_dir: PathBuf,
    pub dump_timeout: Duration,
    /// Whether any failed file turns the whole run into a failure.
    pub fail_on_sync_errors: bool,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;
        Self::from_raw(raw)
    }

    /// Reads configuration from the process environment, after loading `.env`
    /// from the working directory if present.
    pub fn load_from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        let raw = RawConfig::from_vars(|name| std::env::var(name).ok())?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let backup_dir = raw
            .backup_dir
            .filter(|path| !path.as_os_str().is_empty())
            .context("backup_dir must be set")?;
        let docs_dir = raw
            .docs_dir
            .filter(|path| !path.as_os_str().is_empty())
            .context("docs_dir must be set")?;

        let raw_db = raw.database.unwrap_or_default();
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let database = DatabaseConfig {
            name: required(raw_db.name, "database.name")?,
            user: required(raw_db.user, "database.user")?,
            host: raw_db
                .host
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port: raw_db.port,
            pgpass_file: expand_home(
                &raw_db.pgpass_file.unwrap_or_else(|| PathBuf::from("~/.pgpass")),
                home.as_deref(),
            ),
        };

        let storage = storage_from_raw(raw.storage.unwrap_or_default())?;

        Ok(AppConfig {
            backup_dir,
            docs_dir,
            dump_timeout: Duration::from_secs(
                raw.dump_timeout_secs.unwrap_or(DEFAULT_DUMP_TIMEOUT_SECS),
            ),
            fail_on_sync_errors: raw.fail_on_sync_errors.unwrap_or(true),
            database,
            storage,
        })
    }
}

fn storage_from_raw(raw: RawStorageConfig) -> Result<StorageConfig> {
    let driver = match raw.driver.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(name) => name.parse::<DriverKind>()?,
        None => DriverKind::PathStyle,
    };

    let bucket_name = match (driver, raw.bucket_name.filter(|s| !s.trim().is_empty())) {
        (_, Some(bucket)) => bucket,
        (DriverKind::PathStyle, None) => DEFAULT_PATH_STYLE_BUCKET.to_string(),
        (DriverKind::S3, None) => anyhow::bail!("storage.bucket_name must be set for the aws driver"),
    };

    // Path-style stores are usually reached over plain HTTP on a private network.
    let secure = raw.secure.unwrap_or(driver == DriverKind::S3);
    let endpoint_url = raw
        .endpoint_url
        .filter(|s| !s.trim().is_empty())
        .map(|endpoint| normalize_endpoint(&endpoint, secure))
        .transpose()?;
    if driver == DriverKind::PathStyle && endpoint_url.is_none() {
        anyhow::bail!("storage.endpoint_url must be set for the minio driver");
    }

    let access_key_id = raw.access_key_id.filter(|s| !s.is_empty());
    let secret_access_key = raw.secret_access_key.filter(|s| !s.is_empty());
    if access_key_id.is_some() != secret_access_key.is_some() {
        anyhow::bail!("storage.access_key_id and storage.secret_access_key must be set together");
    }

    Ok(StorageConfig {
        driver,
        bucket_name,
        region: raw
            .region
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint_url,
        access_key_id,
        secret_access_key,
    })
}

/// Turns `host:port` or a full URL into an endpoint URL the SDK accepts.
pub fn normalize_endpoint(endpoint: &str, secure: bool) -> Result<String> {
    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    };

    let parsed = Url::parse(&with_scheme)
        .with_context(|| format!("Invalid storage endpoint: {}", endpoint))?;
    if parsed.host_str().is_none() {
        anyhow::bail!("Storage endpoint has no host: {}", endpoint);
    }
    Ok(with_scheme.trim_end_matches('/').to_string())
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|s| !s.trim().is_empty())
        .with_context(|| format!("{} must be set", field))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!("{} must be a boolean, got '{}'", name, value)),
    }
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
impl AppConfig {
    pub(crate) fn for_tests(docs_dir: &Path, backup_dir: &Path) -> Self {
        AppConfig {
            backup_dir: backup_dir.to_path_buf(),
            docs_dir: docs_dir.to_path_buf(),
            dump_timeout: Duration::from_secs(60),
            fail_on_sync_errors: true,
            database: DatabaseConfig {
                name: "paperless".to_string(),
                user: "paperless".to_string(),
                host: DEFAULT_DB_HOST.to_string(),
                port: None,
                pgpass_file: PathBuf::from("/root/.pgpass"),
            },
            storage: StorageConfig {
                driver: DriverKind::PathStyle,
                bucket_name: DEFAULT_PATH_STYLE_BUCKET.to_string(),
                region: DEFAULT_REGION.to_string(),
                endpoint_url: Some("http://localhost:9000".to_string()),
                access_key_id: None,
                secret_access_key: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_minio_config_from_vars() -> anyhow::Result<()> {
        let env = vars(&[
            ("BACKUP_DIR", "/var/backups/paperless"),
            ("DOCS_DIR", "/srv/paperless/media"),
            ("DB_NAME", "paperless"),
            ("DB_USER", "paperless"),
            ("PGPASS_FILE", "/root/.pgpass"),
            ("MINIO_ENDPOINT", "minio.local:9000"),
            ("MINIO_ACCESS_KEY", "minio"),
            ("MINIO_SECRET_KEY", "minio123"),
        ]);
        let config = AppConfig::from_raw(RawConfig::from_vars(|name| env.get(name).cloned())?)?;

        assert_eq!(config.storage.driver, DriverKind::PathStyle);
        assert_eq!(config.storage.bucket_name, "paperless-backups");
        assert_eq!(config.storage.endpoint_url.as_deref(), Some("http://minio.local:9000"));
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.pgpass_file, PathBuf::from("/root/.pgpass"));
        assert_eq!(config.dump_timeout, Duration::from_secs(3600));
        assert!(config.fail_on_sync_errors);
        Ok(())
    }

    #[test]
    fn test_load_aws_config_from_vars() -> anyhow::Result<()> {
        let env = vars(&[
            ("STORAGE_DRIVER", "aws"),
            ("BACKUP_DIR", "/var/backups"),
            ("DOCS_DIR", "/srv/docs"),
            ("DB_NAME", "paperless"),
            ("DB_USER", "paperless"),
            ("DB_PORT", "5433"),
            ("S3_BUCKET", "company-docs"),
            ("AWS_REGION", "eu-central-1"),
            ("MINIO_BUCKET", "ignored"),
        ]);
        let config = AppConfig::from_raw(RawConfig::from_vars(|name| env.get(name).cloned())?)?;

        assert_eq!(config.storage.driver, DriverKind::S3);
        assert_eq!(config.storage.bucket_name, "company-docs");
        assert_eq!(config.storage.region, "eu-central-1");
        assert_eq!(config.storage.endpoint_url, None);
        assert_eq!(config.storage.access_key_id, None);
        assert_eq!(config.database.port, Some(5433));
        assert_eq!(
            config.storage.target(),
            StorageTarget {
                kind: DriverKind::S3,
                bucket: "company-docs".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        let env = vars(&[("STORAGE_DRIVER", "ftp")]);
        assert!(RawConfig::from_vars(|name| env.get(name).cloned()).is_err());
    }

    #[test]
    fn test_load_from_json_content() -> anyhow::Result<()> {
        let raw: RawConfig = serde_json::from_value(serde_json::json!({
            "backup_dir": "/var/backups/paperless",
            "docs_dir": "/srv/paperless/media/documents",
            "dump_timeout_secs": 120,
            "fail_on_sync_errors": false,
            "database": { "name": "paperless", "user": "backup", "host": "db", "port": 5432 },
            "storage": {
                "driver": "minio",
                "bucket_name": "nightly",
                "endpoint_url": "https://minio.example.com/",
                "access_key_id": "key",
                "secret_access_key": "secret"
            }
        }))?;
        let config = AppConfig::from_raw(raw)?;

        assert_eq!(config.docs_dir, PathBuf::from("/srv/paperless/media/documents"));
        assert_eq!(config.dump_timeout, Duration::from_secs(120));
        assert!(!config.fail_on_sync_errors);
        assert_eq!(config.database.host, "db");
        assert_eq!(config.storage.bucket_name, "nightly");
        assert_eq!(config.storage.endpoint_url.as_deref(), Some("https://minio.example.com"));
        Ok(())
    }

    #[test]
    fn test_missing_required_fields() {
        let raw: RawConfig = serde_json::from_value(serde_json::json!({
            "backup_dir": "/var/backups",
            "database": { "name": "paperless", "user": "backup" },
            "storage": { "driver": "minio", "endpoint_url": "localhost:9000" }
        }))
        .unwrap();
        let err = AppConfig::from_raw(raw).unwrap_err();
        assert!(err.to_string().contains("docs_dir"));
    }

    #[test]
    fn test_path_style_driver_requires_endpoint() {
        let raw = RawStorageConfig {
            driver: Some("minio".to_string()),
            ..Default::default()
        };
        assert!(storage_from_raw(raw).is_err());
    }

    #[test]
    fn test_half_configured_credentials_are_rejected() {
        let raw = RawStorageConfig {
            driver: Some("aws".to_string()),
            bucket_name: Some("docs".to_string()),
            access_key_id: Some("key".to_string()),
            ..Default::default()
        };
        assert!(storage_from_raw(raw).is_err());
    }

    #[test]
    fn test_normalize_endpoint() -> anyhow::Result<()> {
        assert_eq!(normalize_endpoint("localhost:9000", false)?, "http://localhost:9000");
        assert_eq!(normalize_endpoint("s3.example.com", true)?, "https://s3.example.com");
        assert_eq!(
            normalize_endpoint("http://10.0.0.5:9000/", true)?,
            "http://10.0.0.5:9000"
        );
        assert!(normalize_endpoint("http://", false).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "Yes").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/backup");
        assert_eq!(
            expand_home(Path::new("~/.pgpass"), Some(home)),
            PathBuf::from("/home/backup/.pgpass")
        );
        assert_eq!(
            expand_home(Path::new("/etc/pgpass"), Some(home)),
            PathBuf::from("/etc/pgpass")
        );
        assert_eq!(expand_home(Path::new("~/.pgpass"), None), PathBuf::from("~/.pgpass"));
    }
}
