//! Backend and store configuration.
//!
//! A backend is selected either from a TOML table:
//!
//! ```toml
//! [backend]
//! backend = "s3"
//! bucket = "my-wikis"
//! prefix = "wikis/main"
//!
//! [store]
//! workers = 8
//! ```
//!
//! or from a wiki location string such as `s3://my-wikis/wikis/main`,
//! `gs://my-wikis`, `file:///srv/wikis/main` or a bare directory path.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::gcs::GcsConfig;
use crate::index::DEFAULT_WORKERS;
use crate::local::LocalBackend;
use crate::s3::S3Config;
use crate::traits::TiddlerBackend;

/// Which storage medium a store lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Local filesystem storage
    Local {
        /// Root directory
        path: PathBuf,
    },
    /// S3-compatible object storage
    S3(S3Config),
    /// Google Cloud Storage
    Gcs(GcsConfig),
}

impl BackendConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        BackendConfig::Local { path: path.into() }
    }

    /// Short name of the configured medium.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Local { .. } => "local",
            BackendConfig::S3(_) => "s3",
            BackendConfig::Gcs(_) => "gcs",
        }
    }
}

fn split_bucket(rest: &str) -> Result<(String, Option<String>)> {
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(StoreError::Config("Missing bucket name".to_string()));
    }
    let prefix = prefix.trim_matches('/');
    Ok((
        bucket.to_string(),
        (!prefix.is_empty()).then(|| prefix.to_string()),
    ))
}

impl FromStr for BackendConfig {
    type Err = StoreError;

    fn from_str(location: &str) -> Result<Self> {
        if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, prefix) = split_bucket(rest)?;
            return Ok(BackendConfig::S3(S3Config {
                prefix,
                ..S3Config::bucket(bucket)
            }));
        }
        if let Some(rest) = location.strip_prefix("gs://") {
            let (bucket, prefix) = split_bucket(rest)?;
            return Ok(BackendConfig::Gcs(GcsConfig {
                prefix,
                ..GcsConfig::new(bucket)
            }));
        }
        if let Some(path) = location.strip_prefix("file://") {
            return Ok(BackendConfig::local(path));
        }
        if let Some((scheme, _)) = location.split_once("://") {
            return Err(StoreError::Config(format!(
                "Unsupported storage scheme: {}. Use 'file', 's3' or 'gs'",
                scheme
            )));
        }
        if location.is_empty() {
            return Err(StoreError::Config("Empty wiki location".to_string()));
        }
        Ok(BackendConfig::local(location))
    }
}

/// Options for opening a [`crate::TiddlerStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Directory, relative to the backend root, holding tiddler files
    pub tiddlers_dir: String,
    /// Walk and cache every tiddler on open
    pub build_index: bool,
    /// Decode workers for index builds and uncached listings
    pub workers: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            tiddlers_dir: "tiddlers".to_string(),
            build_index: true,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl StoreOptions {
    pub fn with_tiddlers_dir(mut self, dir: impl Into<String>) -> Self {
        self.tiddlers_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Skip the index build. Used for folder management, where no tiddlers
    /// are read.
    pub fn without_index(mut self) -> Self {
        self.build_index = false;
        self
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreOptions,
}

/// Create a backend from configuration.
pub fn open_backend(config: &BackendConfig) -> Result<Arc<dyn TiddlerBackend>> {
    match config {
        BackendConfig::Local { path } => Ok(Arc::new(LocalBackend::new(path))),
        #[cfg(feature = "s3")]
        BackendConfig::S3(s3_config) => Ok(Arc::new(crate::s3::s3_backend(s3_config)?)),
        #[cfg(not(feature = "s3"))]
        BackendConfig::S3(_) => Err(StoreError::Config(
            "S3 storage requires 's3' feature".to_string(),
        )),
        #[cfg(feature = "gcs")]
        BackendConfig::Gcs(gcs_config) => Ok(Arc::new(crate::gcs::gcs_backend(gcs_config)?)),
        #[cfg(not(feature = "gcs"))]
        BackendConfig::Gcs(_) => Err(StoreError::Config(
            "GCS storage requires 'gcs' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_locations() {
        assert_eq!(
            "file:///srv/wikis/main".parse::<BackendConfig>().unwrap(),
            BackendConfig::local("/srv/wikis/main")
        );
        assert_eq!(
            "./wikis/main".parse::<BackendConfig>().unwrap(),
            BackendConfig::local("./wikis/main")
        );
    }

    #[test]
    fn test_parse_s3_location() {
        let config: BackendConfig = "s3://my-wikis/wikis/main/".parse().unwrap();
        assert_eq!(
            config,
            BackendConfig::S3(S3Config::bucket("my-wikis").with_prefix("wikis/main"))
        );
        assert_eq!(config.kind(), "s3");

        let bare: BackendConfig = "s3://my-wikis".parse().unwrap();
        assert_eq!(bare, BackendConfig::S3(S3Config::bucket("my-wikis")));
    }

    #[test]
    fn test_parse_gcs_location() {
        let config: BackendConfig = "gs://my-wikis/main".parse().unwrap();
        assert_eq!(
            config,
            BackendConfig::Gcs(GcsConfig::new("my-wikis").with_prefix("main"))
        );
    }

    #[test]
    fn test_parse_invalid_locations() {
        assert!(matches!(
            "ftp://host/dir".parse::<BackendConfig>(),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            "s3:///prefix".parse::<BackendConfig>(),
            Err(StoreError::Config(_))
        ));
        assert!("".parse::<BackendConfig>().is_err());
    }

    #[test]
    fn test_backend_config_serde_tag() {
        let json = r#"{"backend": "s3", "bucket": "wikis", "region": "eu-west-1"}"#;
        let config: BackendConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, BackendConfig::S3(S3Config::aws("wikis", "eu-west-1")));

        let local: BackendConfig =
            serde_json::from_str(r#"{"backend": "local", "path": "/srv/wiki"}"#).unwrap();
        assert_eq!(local, BackendConfig::local("/srv/wiki"));
    }

    #[test]
    fn test_store_options_defaults() {
        let options: StoreOptions = serde_json::from_str(r#"{"workers": 4}"#).unwrap();
        assert_eq!(options.workers, 4);
        assert_eq!(options.tiddlers_dir, "tiddlers");
        assert!(options.build_index);

        let light = StoreOptions::default().without_index().with_workers(2);
        assert!(!light.build_index);
        assert_eq!(light.workers, 2);
    }

    #[test]
    fn test_open_local_backend() {
        let backend = open_backend(&BackendConfig::local("/tmp/wiki")).unwrap();
        assert_eq!(backend.backend_name(), "local");
    }
}
