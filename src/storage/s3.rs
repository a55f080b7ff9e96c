// docbackup/src/storage/s3.rs
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_sdk_s3 as s3;
use s3::config::http::HttpResponse;
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::error::{DisplayErrorContext, SdkError};
use s3::operation::create_bucket::CreateBucketError;
use s3::operation::head_bucket::HeadBucketError;
use s3::operation::head_object::HeadObjectError;
use s3::primitives::ByteStream;
use s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::path::Path;

use super::{DriverKind, ObjectKey, StorageDriver, StorageTarget};
use crate::config::StorageConfig;
use crate::errors::{StorageError, StorageResult};

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Driver for AWS S3 and path-style S3-compatible stores.
///
/// Both variants speak the same protocol; they differ in addressing and in
/// how the endpoint and credentials are usually supplied.
pub struct S3Driver {
    client: s3::Client,
    kind: DriverKind,
    region: String,
}

impl S3Driver {
    /// AWS S3 with virtual-hosted addressing. Falls back to the default AWS
    /// credential chain when no static keys are configured.
    pub async fn aws(config: &StorageConfig) -> Self {
        Self::build(config, DriverKind::S3).await
    }

    /// Path-addressed store (MinIO and friends) reached through `endpoint_url`.
    pub async fn path_style(config: &StorageConfig) -> Self {
        Self::build(config, DriverKind::PathStyle).await
    }

    async fn build(config: &StorageConfig, kind: DriverKind) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled());

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(kind.force_path_style())
            .build();

        log::debug!(
            target: "storage::s3",
            "Configured {} driver (region: {}, endpoint: {})",
            kind,
            config.region,
            config.endpoint_url.as_deref().unwrap_or("default")
        );

        S3Driver {
            client: s3::Client::from_conf(s3_config),
            kind,
            region: config.region.clone(),
        }
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn ensure_bucket(&self, target: &StorageTarget) -> StorageResult<()> {
        match self.client.head_bucket().bucket(&target.bucket).send().await {
            Ok(_) => {
                log::debug!(target: "storage::s3", "Bucket {} exists", target.bucket);
                return Ok(());
            }
            Err(err) if is_missing_bucket(&err) => {}
            Err(err) => return Err(classify(err, &format!("head bucket {}", target.bucket))),
        }

        log::info!(target: "storage::s3", "Bucket {} not found, creating it", target.bucket);
        let mut request = self.client.create_bucket().bucket(&target.bucket);
        if let Some(constraint) = location_constraint(&self.region) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                log::info!(target: "storage::s3", "Created bucket {}", target.bucket);
                Ok(())
            }
            Err(err)
                if matches!(
                    err.as_service_error(),
                    Some(CreateBucketError::BucketAlreadyOwnedByYou(_))
                ) =>
            {
                log::debug!(target: "storage::s3", "Bucket {} was created concurrently", target.bucket);
                Ok(())
            }
            Err(err) => Err(classify(err, &format!("create bucket {}", target.bucket))),
        }
    }

    async fn stat_object(
        &self,
        target: &StorageTarget,
        key: &ObjectKey,
    ) -> StorageResult<Option<i64>> {
        let response = self
            .client
            .head_object()
            .bucket(&target.bucket)
            .key(key.as_str())
            .send()
            .await;

        match response {
            Ok(head) => head
                .last_modified()
                .map(|modified| Some(modified.secs()))
                .ok_or_else(|| {
                    StorageError::Backend(format!("head object {}: no Last-Modified in response", key))
                }),
            Err(err) if is_missing_object(&err) => Ok(None),
            Err(err) => Err(classify(err, &format!("head object {}", key))),
        }
    }

    async fn upload_object(
        &self,
        target: &StorageTarget,
        key: &ObjectKey,
        local_path: &Path,
    ) -> StorageResult<()> {
        // Opened here so an unreadable file fails before the request is built.
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|source| StorageError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        let body = ByteStream::read_from()
            .file(file)
            .build()
            .await
            .map_err(|source| StorageError::Io {
                path: local_path.to_path_buf(),
                source: std::io::Error::other(source),
            })?;

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(key.as_str())
            .body(body)
            .send()
            .await
            .map_err(|err| classify(err, &format!("put object {}", key)))?;

        Ok(())
    }
}

/// Location constraint to send with CreateBucket, if the region needs one.
fn location_constraint(region: &str) -> Option<BucketLocationConstraint> {
    let region = region.trim();
    if region.is_empty() || region == DEFAULT_REGION {
        None
    } else {
        Some(BucketLocationConstraint::from(region))
    }
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|raw| raw.status().as_u16())
}

fn is_missing_bucket(err: &SdkError<HeadBucketError, HttpResponse>) -> bool {
    matches!(err.as_service_error(), Some(HeadBucketError::NotFound(_)))
        || http_status(err) == Some(404)
}

fn is_missing_object(err: &SdkError<HeadObjectError, HttpResponse>) -> bool {
    matches!(err.as_service_error(), Some(HeadObjectError::NotFound(_)))
        || http_status(err) == Some(404)
}

/// Maps an SDK failure onto the driver error kinds.
fn classify<E>(err: SdkError<E, HttpResponse>, action: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = http_status(&err);
    let message = format!("{}: {}", action, DisplayErrorContext(&err));
    match status {
        Some(401) | Some(403) => StorageError::Permission(message),
        _ => StorageError::Backend(message),
    }
}
