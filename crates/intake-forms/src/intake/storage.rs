use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

use crate::config::{ConfigError, StorageConfig};

/// Failure talking to the object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write object '{key}': {message}")]
    Write { key: String, message: String },
    #[error("failed to delete object '{key}': {message}")]
    Delete { key: String, message: String },
}

/// Bucket abstraction so the upload path can be exercised without a network.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `body` under `key` with public-read visibility. Existing objects are overwritten.
    async fn put_public(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deterministic public URL for `key`; does not touch the network.
    fn public_url(&self, key: &str) -> String;
}

/// `https://<bucket>.<region>.<domain>/<key>`
pub fn public_object_url(bucket: &str, region: &str, domain: &str, key: &str) -> String {
    format!("https://{bucket}.{region}.{domain}/{key}")
}

/// S3-compatible bucket (DigitalOcean Spaces by default) addressed by region endpoint.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    domain: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, region: String, domain: String) -> Self {
        Self {
            client,
            bucket,
            region,
            domain,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        let bucket = config.require_bucket()?.to_string();
        let (access_key_id, secret_access_key) = config.require_credentials()?;

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "intake-forms-config",
        );
        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(format!("https://{}.{}", config.region, config.domain))
            .credentials_provider(credentials)
            .build();

        Ok(Self::new(
            aws_sdk_s3::Client::from_conf(sdk_config),
            bucket,
            config.region.clone(),
            config.domain.clone(),
        ))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_public(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::Write {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::Delete {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
            })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        public_object_url(&self.bucket, &self.region, &self.domain, key)
    }
}
