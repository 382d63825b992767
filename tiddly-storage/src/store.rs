//! Tiddler store: title-addressed reads and writes over a backend, with an
//! in-memory index and cache.
//!
//! The index (title → location) and cache (title → tiddler) sit behind one
//! lock and are only changed together. The lock is never held across I/O.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::codec;
use crate::config::StoreOptions;
use crate::error::{Result, StoreError};
use crate::index::{self, TiddlerIndex};
use crate::path::{self, canonical_location};
use crate::tiddler::{FieldValue, Tiddler, REVISION, TEXT};
use crate::traits::{TiddlerBackend, WikiTemplate};

/// A wiki's tiddlers on one backend.
pub struct TiddlerStore {
    backend: Arc<dyn TiddlerBackend>,
    options: StoreOptions,
    indexed: bool,
    index: RwLock<TiddlerIndex>,
}

impl std::fmt::Debug for TiddlerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiddlerStore")
            .field("backend", &self.backend.backend_name())
            .field("options", &self.options)
            .field("tiddlers", &self.index.read().len())
            .finish()
    }
}

fn required_title(tiddler: &Tiddler) -> Result<String> {
    match tiddler.title() {
        Some(title) if !title.is_empty() => Ok(title.to_string()),
        _ => Err(StoreError::Invalid("tiddler has no title".to_string())),
    }
}

impl TiddlerStore {
    /// Open a store, building the index and cache unless
    /// `options.build_index` is off.
    ///
    /// # Errors
    ///
    /// Fails if the tiddlers directory cannot be enumerated. Individual
    /// unreadable files are skipped.
    #[instrument(skip(backend), fields(backend = backend.backend_name()))]
    pub async fn open(backend: Arc<dyn TiddlerBackend>, options: StoreOptions) -> Result<Self> {
        let index = if options.build_index {
            index::build_index(backend.clone(), &options.tiddlers_dir, options.workers).await?
        } else {
            debug!("Opening without an index");
            TiddlerIndex::new()
        };

        Ok(Self {
            backend,
            indexed: options.build_index,
            options,
            index: RwLock::new(index),
        })
    }

    pub fn backend(&self) -> &Arc<dyn TiddlerBackend> {
        &self.backend
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether the index was built on open.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Number of indexed titles.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.index.read().location(title).is_some()
    }

    pub fn location_of(&self, title: &str) -> Option<String> {
        self.index.read().location(title).map(str::to_string)
    }

    /// Sorted titles in the index.
    pub fn titles(&self) -> Vec<String> {
        self.index.read().titles()
    }

    /// Read any file under the backend root, bypassing the cache.
    pub async fn read_raw(&self, location: &str) -> Result<Bytes> {
        self.backend.read(location).await
    }

    /// Get a tiddler by title.
    ///
    /// Cached tiddlers are returned without touching the backend. Indexed
    /// titles are decoded from their recorded location. Anything else is
    /// looked up at its canonical `.tid` location, then as a `.meta` pair.
    #[instrument(skip(self))]
    pub async fn get(&self, title: &str) -> Result<Tiddler> {
        let location = {
            let index = self.index.read();
            if let Some(tiddler) = index.cached(title) {
                return Ok(tiddler.clone());
            }
            index.location(title).map(str::to_string)
        };

        match location {
            Some(location) => codec::decode_location(self.backend.as_ref(), &location).await,
            None => {
                if self.indexed {
                    warn!(title, "Title not indexed, trying canonical locations");
                }
                let location = self
                    .find_location(title)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(title.to_string()))?;

                let tiddler = codec::decode_location(self.backend.as_ref(), &location).await?;
                if tiddler.title() != Some(title) {
                    return Err(StoreError::NotFound(title.to_string()));
                }
                Ok(tiddler)
            }
        }
    }

    /// Every tiddler in the store.
    ///
    /// Served from the cache when it holds anything, otherwise decoded from
    /// the backend with the configured worker count.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<Tiddler>> {
        let cached: Vec<Tiddler> = {
            let index = self.index.read();
            index.tiddlers().cloned().collect()
        };
        if !cached.is_empty() {
            return Ok(cached);
        }

        index::collect_all(
            self.backend.clone(),
            &self.options.tiddlers_dir,
            self.options.workers,
        )
        .await
    }

    /// Listing for sync clients: no system tiddlers, and no bodies except
    /// for macros.
    pub async fn skinny_list(&self) -> Result<Vec<Tiddler>> {
        Ok(self
            .get_all()
            .await?
            .iter()
            .filter(|t| !t.is_system())
            .map(Tiddler::skinny)
            .collect())
    }

    /// Store a tiddler.
    ///
    /// Tiddlers already stored as a `.meta` pair are written back to that
    /// pair, as are new tiddlers with a raw-bytes body. Everything else goes
    /// to the canonical `.tid` location. Once the write succeeds, the files
    /// the title previously lived in are removed.
    ///
    /// A missing `revision` is stored as `"0"`. The index and cache are only
    /// updated once the backend write succeeds, and the cache holds what a
    /// later read of the written files decodes to.
    #[instrument(skip(self, tiddler), fields(title = ?tiddler.title()))]
    pub async fn put(&self, mut tiddler: Tiddler) -> Result<()> {
        let title = required_title(&tiddler)?;
        if !tiddler.contains(REVISION) {
            tiddler.set(REVISION, "0");
        }

        let previous = match self.location_of(&title) {
            Some(location) => Some(location),
            None if !self.indexed => self.find_location(&title).await?,
            None => None,
        };
        let dir = &self.options.tiddlers_dir;
        let location = match previous.as_deref() {
            Some(previous) if path::body_location(previous).is_some() => previous.to_string(),
            _ if matches!(tiddler.get(TEXT), Some(FieldValue::Bytes(_))) => {
                path::meta_location(dir, &title)
            }
            _ => canonical_location(dir, &title),
        };

        let (data, body) = match path::body_location(&location) {
            Some(body_location) => {
                let (header, body) = codec::encode_pair(&tiddler)?;
                (header, Some((body_location.to_string(), body)))
            }
            None => (codec::encode(&tiddler)?, None),
        };
        let stored = match &body {
            Some((_, body)) => codec::decode_pair(&data, body.clone())?,
            None => codec::decode(&data)?,
        };

        {
            let index = self.index.read();
            if let Some(other) = index.title_at(&location, &title) {
                warn!(location = %location, other = %other, "Title collides with another file");
            }
        }

        if let Some((body_location, body)) = body {
            self.backend.write(&body_location, body).await?;
        }
        self.backend.write(&location, data).await?;

        {
            let mut index = self.index.write();
            let cached = self.indexed.then_some(stored);
            index.insert(title, location.clone(), cached);
        }

        if let Some(previous) = previous.filter(|p| *p != location) {
            debug!(previous = %previous, location = %location, "Removing previous files");
            self.delete_if_present(&previous).await?;
            if let Some(body) = path::body_location(&previous) {
                self.delete_if_present(body).await?;
            }
        }
        Ok(())
    }

    /// Store a tiddler one revision past the stored one, and return the new
    /// revision.
    #[instrument(skip(self, tiddler), fields(title = ?tiddler.title()))]
    pub async fn put_revision(&self, mut tiddler: Tiddler) -> Result<u64> {
        let title = required_title(&tiddler)?;

        let current = if self.indexed && !self.contains(&title) {
            0
        } else {
            match self.get(&title).await {
                Ok(stored) => stored.revision(),
                Err(e) if !e.is_backend_failure() => 0,
                Err(e) => return Err(e),
            }
        };

        let revision = current + 1;
        tiddler.set_revision(revision);
        self.put(tiddler).await?;
        Ok(revision)
    }

    /// Delete a tiddler, including the body file of a `.meta` pair.
    #[instrument(skip(self))]
    pub async fn delete(&self, title: &str) -> Result<()> {
        let location = match self.location_of(title) {
            Some(location) => location,
            None => self
                .find_location(title)
                .await?
                .ok_or_else(|| StoreError::NotFound(title.to_string()))?,
        };

        self.backend.delete(&location).await?;
        self.index.write().remove(title);

        if let Some(body) = path::body_location(&location) {
            self.delete_if_present(body).await?;
        }

        info!(location = %location, "Deleted tiddler");
        Ok(())
    }

    /// Probe the canonical `.tid` location, then the canonical `.meta` pair.
    async fn find_location(&self, title: &str) -> Result<Option<String>> {
        let dir = &self.options.tiddlers_dir;
        for location in [canonical_location(dir, title), path::meta_location(dir, title)] {
            if self.backend.exists(&location).await? {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    async fn delete_if_present(&self, location: &str) -> Result<()> {
        match self.backend.delete(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(location, "Nothing to delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_required_folders(&self, path: &str) -> Result<()> {
        self.backend.create_required_folders(path).await
    }

    pub async fn wiki_list(&self, path: &str) -> Result<Vec<String>> {
        self.backend.wiki_list(path).await
    }

    pub async fn wiki_template_list(&self, path: &str) -> Result<Vec<WikiTemplate>> {
        self.backend.wiki_template_list(path).await
    }

    pub async fn create_wiki_folder(&self, wiki_path: &str, template_file: &str) -> Result<()> {
        self.backend.create_wiki_folder(wiki_path, template_file).await
    }

    pub async fn copy_folder(&self, from: &str, to: &str) -> Result<()> {
        self.backend.copy_folder(from, to).await
    }

    pub async fn delete_folder(&self, path: &str) -> Result<()> {
        self.backend.delete_folder(path).await
    }
}
