//! S3-compatible object storage backend.
//!
//! Uses the `object_store` crate for S3, MinIO, and other S3-compatible services.
//! Credentials not given in the config are picked up from the standard
//! `AWS_*` environment variables.
//!
//! # Configuration
//!
//! ```toml
//! backend = "s3"
//! bucket = "my-wikis"
//! region = "us-east-1"
//! prefix = "wikis/main"
//!
//! # Optional: For MinIO or other S3-compatible services
//! endpoint = "http://localhost:9000"
//! force_path_style = true
//! ```

use serde::{Deserialize, Serialize};

#[cfg(feature = "s3")]
use crate::error::Result;
#[cfg(feature = "s3")]
use crate::object::ObjectBackend;

/// Configuration for S3 storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region, falls back to `AWS_REGION`
    #[serde(default)]
    pub region: Option<String>,
    /// Optional prefix for all locations
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional custom endpoint (for MinIO, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Use path-style requests (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Optional access key (if not using IAM/env credentials)
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Optional secret key
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow HTTP (non-HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

impl S3Config {
    /// Create a new S3 configuration for AWS.
    pub fn aws(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Self::bucket(bucket)
        }
    }

    /// Configuration for a bucket, with region and credentials from the
    /// environment.
    pub fn bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            prefix: None,
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }

    /// Create configuration for MinIO or other S3-compatible services.
    pub fn minio(bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            region: Some("us-east-1".to_string()),
            endpoint: Some(endpoint.into()),
            force_path_style: true,
            allow_http: true,
            ..Self::bucket(bucket)
        }
    }

    /// Set optional prefix for all locations.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

/// S3-compatible tiddler backend.
#[cfg(feature = "s3")]
pub type S3Backend = ObjectBackend;

/// Create an S3 backend from configuration.
#[cfg(feature = "s3")]
pub fn s3_backend(config: &S3Config) -> Result<S3Backend> {
    use object_store::aws::AmazonS3Builder;
    use std::sync::Arc;
    use tracing::info;

    use crate::error::StoreError;

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&config.bucket)
        .with_allow_http(config.allow_http);

    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }

    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    if config.force_path_style {
        builder = builder.with_virtual_hosted_style_request(false);
    }

    if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        builder = builder
            .with_access_key_id(key_id)
            .with_secret_access_key(secret);
    }

    let store = builder
        .build()
        .map_err(|e| StoreError::Config(e.to_string()))?;

    info!(bucket = %config.bucket, prefix = ?config.prefix, "Opened S3 backend");

    Ok(ObjectBackend::new(
        Arc::new(store),
        config.prefix.clone().unwrap_or_default(),
        "s3",
    ))
}
