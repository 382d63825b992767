//! Google Cloud Storage backend.
//!
//! Credentials come from `service_account_path` when set, otherwise from the
//! standard `GOOGLE_*` environment variables.

use serde::{Deserialize, Serialize};

#[cfg(feature = "gcs")]
use crate::error::Result;
#[cfg(feature = "gcs")]
use crate::object::ObjectBackend;

/// Configuration for GCS storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket: String,
    /// Optional prefix for all locations
    #[serde(default)]
    pub prefix: Option<String>,
    /// Path to a service account JSON key
    #[serde(default)]
    pub service_account_path: Option<String>,
}

impl GcsConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            service_account_path: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_service_account(mut self, path: impl Into<String>) -> Self {
        self.service_account_path = Some(path.into());
        self
    }
}

/// GCS tiddler backend.
#[cfg(feature = "gcs")]
pub type GcsBackend = ObjectBackend;

/// Create a GCS backend from configuration.
#[cfg(feature = "gcs")]
pub fn gcs_backend(config: &GcsConfig) -> Result<GcsBackend> {
    use object_store::gcp::GoogleCloudStorageBuilder;
    use std::sync::Arc;
    use tracing::info;

    use crate::error::StoreError;

    let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);

    if let Some(path) = &config.service_account_path {
        builder = builder.with_service_account_path(path);
    }

    let store = builder
        .build()
        .map_err(|e| StoreError::Config(e.to_string()))?;

    info!(bucket = %config.bucket, prefix = ?config.prefix, "Opened GCS backend");

    Ok(ObjectBackend::new(
        Arc::new(store),
        config.prefix.clone().unwrap_or_default(),
        "gcs",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcs_config() {
        let config = GcsConfig::new("wikis")
            .with_prefix("main")
            .with_service_account("/etc/gcs.json");
        assert_eq!(config.bucket, "wikis");
        assert_eq!(config.prefix.as_deref(), Some("main"));
        assert_eq!(config.service_account_path.as_deref(), Some("/etc/gcs.json"));
    }

    #[test]
    fn test_gcs_config_serde_defaults() {
        let config: GcsConfig = serde_json::from_str(r#"{"bucket": "wikis"}"#).unwrap();
        assert_eq!(config, GcsConfig::new("wikis"));
    }
}
