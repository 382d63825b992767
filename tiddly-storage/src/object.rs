//! Shared glue for object storage backends.
//!
//! S3 and GCS both come down to an `object_store::ObjectStore` plus a key
//! prefix. [`ObjectBackend`] implements the tiddler primitives once on top of
//! that; the provider modules only differ in how they build the store.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::path as location;
use crate::traits::{LocationStream, TiddlerBackend};

/// Tiddler backend over any `object_store` implementation.
#[derive(Clone)]
pub struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
    root: String,
    name: &'static str,
}

impl ObjectBackend {
    /// Wrap an existing store. Every location is placed under `root`.
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<String>, name: &'static str) -> Self {
        let root = root.into().trim_matches('/').to_string();
        Self { store, root, name }
    }

    /// Key prefix applied to every location.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn to_object_path(&self, loc: &str) -> ObjectPath {
        let key = location::join(&self.root, loc);
        ObjectPath::parse(&key).unwrap_or_else(|_| ObjectPath::from(key))
    }

    fn to_location(&self, path: &ObjectPath) -> Option<String> {
        let key = path.as_ref();
        if self.root.is_empty() {
            return Some(key.to_string());
        }
        key.strip_prefix(&self.root)?
            .strip_prefix('/')
            .map(str::to_string)
    }

    fn map_not_found(loc: &str, e: object_store::Error) -> StoreError {
        match e {
            object_store::Error::NotFound { .. } => StoreError::NotFound(loc.to_string()),
            e => StoreError::from(e),
        }
    }
}

impl std::fmt::Debug for ObjectBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBackend")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl TiddlerBackend for ObjectBackend {
    #[instrument(skip(self), fields(backend = self.name, location = %loc))]
    async fn read(&self, loc: &str) -> Result<Bytes> {
        let path = self.to_object_path(loc);
        debug!("Reading {}", path);

        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| Self::map_not_found(loc, e))?;
        Ok(result.bytes().await?)
    }

    #[instrument(skip(self, data), fields(backend = self.name, location = %loc, size = data.len()))]
    async fn write(&self, loc: &str, data: Bytes) -> Result<()> {
        let path = self.to_object_path(loc);
        debug!("Writing {} bytes to {}", data.len(), path);

        self.store.put(&path, data.into()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = self.name, location = %loc))]
    async fn delete(&self, loc: &str) -> Result<()> {
        let path = self.to_object_path(loc);

        // Some stores treat deleting a missing key as success.
        self.store
            .head(&path)
            .await
            .map_err(|e| Self::map_not_found(loc, e))?;

        debug!("Deleting {}", path);
        self.store
            .delete(&path)
            .await
            .map_err(|e| Self::map_not_found(loc, e))
    }

    async fn exists(&self, loc: &str) -> Result<bool> {
        match self.store.head(&self.to_object_path(loc)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn walk<'a>(&'a self, dir: &'a str) -> LocationStream<'a> {
        Box::pin(async_stream::try_stream! {
            let prefix = self.to_object_path(dir);
            debug!("Listing {}", prefix);

            let mut listing = self.store.list(Some(&prefix));
            while let Some(meta) = listing.try_next().await? {
                let Some(found) = self.to_location(&meta.location) else {
                    continue;
                };
                if location::is_tiddler_file(&found) {
                    yield found;
                }
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn create_test_backend(root: &str) -> (ObjectBackend, Arc<InMemory>) {
        let memory = Arc::new(InMemory::new());
        let backend = ObjectBackend::new(memory.clone(), root, "memory");
        (backend, memory)
    }

    #[test]
    fn test_to_object_path() {
        let (backend, _) = create_test_backend("wikis/main/");
        assert_eq!(backend.root(), "wikis/main");
        assert_eq!(
            backend.to_object_path("tiddlers/A.tid").as_ref(),
            "wikis/main/tiddlers/A.tid"
        );

        let (bare, _) = create_test_backend("");
        assert_eq!(bare.to_object_path("tiddlers/A.tid").as_ref(), "tiddlers/A.tid");
    }

    #[test]
    fn test_to_location() {
        let (backend, _) = create_test_backend("data");
        assert_eq!(
            backend.to_location(&ObjectPath::from("data/tiddlers/A.tid")),
            Some("tiddlers/A.tid".to_string())
        );
        assert_eq!(backend.to_location(&ObjectPath::from("database/x.tid")), None);
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let (backend, memory) = create_test_backend("data");

        let data = Bytes::from("title: A\n\nbody");
        backend.write("tiddlers/A.tid", data.clone()).await.unwrap();

        let raw = memory
            .get(&ObjectPath::from("data/tiddlers/A.tid"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(raw, data);

        assert_eq!(backend.read("tiddlers/A.tid").await.unwrap(), data);
        assert!(backend.exists("tiddlers/A.tid").await.unwrap());

        backend.delete("tiddlers/A.tid").await.unwrap();
        assert!(!backend.exists("tiddlers/A.tid").await.unwrap());
        assert!(backend.read("tiddlers/A.tid").await.unwrap_err().is_not_found());
        assert!(backend.delete("tiddlers/A.tid").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_special_characters_in_location() {
        let (backend, _) = create_test_backend("");

        let loc = "tiddlers/$__config_tiddlyweb_host.tid";
        backend.write(loc, Bytes::from("title: $:/config/tiddlyweb/host\n\n")).await.unwrap();

        let found: Vec<String> = backend.walk("tiddlers").try_collect().await.unwrap();
        assert_eq!(found, vec![loc.to_string()]);
        assert!(backend.read(loc).await.is_ok());
    }

    #[tokio::test]
    async fn test_walk_filters_and_strips_root() {
        let (backend, _) = create_test_backend("bucket-prefix");

        for loc in [
            "tiddlers/A.tid",
            "tiddlers/sub/B.tid",
            "tiddlers/logo.png",
            "tiddlers/logo.png.meta",
            "tiddlers/.hidden.tid",
            "elsewhere/C.tid",
        ] {
            backend.write(loc, Bytes::from("title: x\n\n")).await.unwrap();
        }

        let mut found: Vec<String> = backend.walk("tiddlers").try_collect().await.unwrap();
        found.sort();
        assert_eq!(
            found,
            vec!["tiddlers/A.tid", "tiddlers/logo.png.meta", "tiddlers/sub/B.tid"]
        );
    }

    #[tokio::test]
    async fn test_walk_empty_prefix_is_empty() {
        let (backend, _) = create_test_backend("nothing-here");
        let found: Vec<String> = backend.walk("tiddlers").try_collect().await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_folder_lifecycle_not_implemented() {
        let (backend, _) = create_test_backend("");
        let err = backend.wiki_list("wikis").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotImplemented {
                backend: "memory",
                operation: "wiki_list"
            }
        ));
    }
}
