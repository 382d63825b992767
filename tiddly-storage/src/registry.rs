//! Named wiki stores.
//!
//! A registry is owned by whoever serves the wikis and passed around
//! explicitly. Stores are shared as `Arc<TiddlerStore>`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StoreOptions;
use crate::error::Result;
use crate::local::{LocalBackend, WIKIS_DIR};
use crate::store::TiddlerStore;
use crate::tiddler::TEXT;
use crate::traits::TiddlerBackend;

/// Title of the tiddler holding a wiki's one-line description.
pub const SITE_DESCRIPTION: &str = "$:/SiteDescription";

/// A wiki name with its site description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct WikiRegistry {
    wikis: RwLock<BTreeMap<String, Arc<TiddlerStore>>>,
}

impl WikiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every wiki under `root/wikis`.
    ///
    /// A wiki that fails to open is logged and left out.
    pub async fn open_local(root: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let root = root.into();
        let names = LocalBackend::new(&root).wiki_list(WIKIS_DIR).await?;
        let registry = Self::new();

        for name in names {
            let backend = Arc::new(LocalBackend::new(root.join(WIKIS_DIR).join(&name)));
            match TiddlerStore::open(backend, options.clone()).await {
                Ok(store) => {
                    info!(wiki = %name, tiddlers = store.len(), "Opened wiki");
                    registry.insert(name, Arc::new(store));
                }
                Err(e) => warn!(wiki = %name, error = %e, "Skipping wiki"),
            }
        }

        Ok(registry)
    }

    /// Add or replace a wiki. Returns the store it replaced.
    pub fn insert(
        &self,
        name: impl Into<String>,
        store: Arc<TiddlerStore>,
    ) -> Option<Arc<TiddlerStore>> {
        self.wikis.write().insert(name.into(), store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TiddlerStore>> {
        self.wikis.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<TiddlerStore>> {
        self.wikis.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.wikis.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.wikis.read().is_empty()
    }

    /// Sorted wiki names.
    pub fn names(&self) -> Vec<String> {
        self.wikis.read().keys().cloned().collect()
    }

    /// Name and `$:/SiteDescription` text of every wiki, sorted by name.
    ///
    /// Wikis without a description get an empty one.
    pub async fn descriptions(&self) -> Vec<WikiSummary> {
        let stores: Vec<(String, Arc<TiddlerStore>)> = {
            let wikis = self.wikis.read();
            wikis.iter().map(|(n, s)| (n.clone(), s.clone())).collect()
        };

        let mut summaries = Vec::with_capacity(stores.len());
        for (name, store) in stores {
            if store.is_indexed() && !store.contains(SITE_DESCRIPTION) {
                summaries.push(WikiSummary {
                    name,
                    description: String::new(),
                });
                continue;
            }

            let description = match store.get(SITE_DESCRIPTION).await {
                Ok(tiddler) => tiddler.field(TEXT).unwrap_or_default(),
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(wiki = %name, error = %e, "Could not read site description");
                    }
                    String::new()
                }
            };
            summaries.push(WikiSummary { name, description });
        }
        summaries
    }
}
