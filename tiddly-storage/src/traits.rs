//! Core backend trait definitions.
//!
//! A `TiddlerBackend` is the small set of primitives each storage medium
//! supplies: read, write and delete bytes at a location, and walk the
//! tiddler files under a directory. Everything else (encoding, indexing,
//! caching) is shared and lives in [`crate::store`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::{Result, StoreError};

/// Stream of tiddler locations produced by [`TiddlerBackend::walk`].
pub type LocationStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// A wiki template available for new wikis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiTemplate {
    /// Template name (file stem)
    pub name: String,
    /// Template file name, e.g. `empty.html`
    pub file: String,
    /// Contents of the matching `.txt` description file
    pub description: String,
}

/// Storage primitives for tiddler stores.
///
/// All locations are `/`-separated and relative to the backend's root.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the index builder reads from many
/// tasks at once.
///
/// # Folder lifecycle
///
/// The wiki management operations have default bodies that fail with
/// [`StoreError::NotImplemented`]. Only the local filesystem overrides them.
#[async_trait]
pub trait TiddlerBackend: Send + Sync {
    /// Read the full contents of a location.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the location does not exist.
    async fn read(&self, location: &str) -> Result<Bytes>;

    /// Create or overwrite a location.
    async fn write(&self, location: &str, data: Bytes) -> Result<()>;

    /// Remove a location.
    async fn delete(&self, location: &str) -> Result<()>;

    /// Check if a location exists.
    async fn exists(&self, location: &str) -> Result<bool>;

    /// Enumerate every tiddler file below `dir`.
    ///
    /// Only locations passing [`crate::path::is_tiddler_file`] are yielded.
    /// An error item means the enumeration itself failed.
    fn walk<'a>(&'a self, dir: &'a str) -> LocationStream<'a>;

    /// Get a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Create the `wikis`, `templates` and `trash` folders under `path`.
    async fn create_required_folders(&self, _path: &str) -> Result<()> {
        Err(StoreError::not_implemented(
            self.backend_name(),
            "create_required_folders",
        ))
    }

    /// List the wiki folder names under `path`.
    async fn wiki_list(&self, _path: &str) -> Result<Vec<String>> {
        Err(StoreError::not_implemented(self.backend_name(), "wiki_list"))
    }

    /// List the templates under `path`, sorted by name.
    async fn wiki_template_list(&self, _path: &str) -> Result<Vec<WikiTemplate>> {
        Err(StoreError::not_implemented(
            self.backend_name(),
            "wiki_template_list",
        ))
    }

    /// Create a wiki folder with an `index.html` copied from a template and
    /// an empty `tiddlers` folder.
    async fn create_wiki_folder(&self, _wiki_path: &str, _template_file: &str) -> Result<()> {
        Err(StoreError::not_implemented(
            self.backend_name(),
            "create_wiki_folder",
        ))
    }

    /// Recursively copy a folder.
    async fn copy_folder(&self, _from: &str, _to: &str) -> Result<()> {
        Err(StoreError::not_implemented(self.backend_name(), "copy_folder"))
    }

    /// Recursively delete a folder.
    async fn delete_folder(&self, _path: &str) -> Result<()> {
        Err(StoreError::not_implemented(self.backend_name(), "delete_folder"))
    }
}
