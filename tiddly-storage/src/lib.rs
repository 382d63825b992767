//! Tiddler storage for TiddlyWiki servers.
//!
//! This crate stores wikis as folders of `.tid` files on a pluggable backend
//! (local filesystem, S3, GCS) and serves them by title through an in-memory
//! index and cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  WikiRegistry   name → Arc<TiddlerStore>        │
//! │                      │                          │
//! │                      ▼                          │
//! │  TiddlerStore   index + cache, get/put/delete   │
//! │        │                      │                 │
//! │        ▼                      ▼                 │
//! │  codec (.tid / .meta)   index builder (workers) │
//! │        │                      │                 │
//! │        └──────────┬───────────┘                 │
//! │                   ▼                             │
//! │          ┌─────────────────┐                    │
//! │          │ TiddlerBackend  │  ← Unified trait   │
//! │          └────────┬────────┘                    │
//! │        ┌──────────┼──────────┐                  │
//! │        ▼          ▼          ▼                  │
//! │  ┌──────────┐ ┌────────┐ ┌────────┐             │
//! │  │  Local   │ │   S3   │ │  GCS   │             │
//! │  └──────────┘ └────────┘ └────────┘             │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiddly_storage::{LocalBackend, StoreOptions, Tiddler, TiddlerStore};
//!
//! # async fn example() -> tiddly_storage::Result<()> {
//! let backend = Arc::new(LocalBackend::new("./wikis/main"));
//! let store = TiddlerStore::open(backend, StoreOptions::default()).await?;
//!
//! let revision = store
//!     .put_revision(Tiddler::with_title("HelloThere").with_field("text", "Hi!"))
//!     .await?;
//! let tiddler = store.get("HelloThere").await?;
//! assert_eq!(tiddler.revision(), revision);
//! # Ok(())
//! # }
//! ```
//!
//! # Object storage
//!
//! ```ignore
//! use tiddly_storage::{open_backend, BackendConfig};
//!
//! let config: BackendConfig = "s3://my-wikis/wikis/main".parse()?;
//! let backend = open_backend(&config)?;
//! ```
//!
//! # Features
//!
//! - `s3` - S3 and S3-compatible backends (default)
//! - `gcs` - Google Cloud Storage backend (default)

pub mod codec;
mod config;
mod error;
mod gcs;
pub mod index;
mod local;
mod object;
pub mod path;
mod registry;
mod s3;
mod store;
mod tiddler;
mod traits;

pub use config::{open_backend, BackendConfig, StoreOptions, WikiConfig};
pub use error::{Result, StoreError};
pub use gcs::GcsConfig;
pub use index::{TiddlerIndex, WalkSummary, DEFAULT_WORKERS};
pub use local::{LocalBackend, TEMPLATES_DIR, TRASH_DIR, WIKIS_DIR, WIKI_INDEX_FILE};
pub use object::ObjectBackend;
pub use registry::{WikiRegistry, WikiSummary, SITE_DESCRIPTION};
pub use s3::S3Config;
pub use store::TiddlerStore;
pub use tiddler::{
    is_binary_type, parse_list, stringify_list, timestamp_now, FieldValue, Tiddler, CREATED,
    MACRO_TAG, MODIFIED, REVISION, TAGS, TEXT, TITLE, TYPE,
};
pub use traits::{LocationStream, TiddlerBackend, WikiTemplate};

#[cfg(feature = "gcs")]
pub use gcs::{gcs_backend, GcsBackend};
#[cfg(feature = "s3")]
pub use s3::{s3_backend, S3Backend};

// Re-export bytes for convenience
pub use bytes::Bytes;
