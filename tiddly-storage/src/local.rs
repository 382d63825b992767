//! Local filesystem backend.
//!
//! This is the default backend and the only one that implements the wiki
//! folder lifecycle. The storage root is laid out as:
//!
//! ```text
//! root/
//! ├── wikis/<name>/index.html
//! ├── wikis/<name>/tiddlers/*.tid (+ *.meta sidecars)
//! ├── templates/<template>.html + <template>.txt
//! └── trash/<name>/...
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::path as location;
use crate::traits::{LocationStream, TiddlerBackend, WikiTemplate};

pub const WIKIS_DIR: &str = "wikis";
pub const TEMPLATES_DIR: &str = "templates";
pub const TRASH_DIR: &str = "trash";
pub const WIKI_INDEX_FILE: &str = "index.html";

/// Local filesystem backend.
///
/// Locations map onto `base_path/<location>`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get the root path for this backend.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a location to a filesystem path.
    ///
    /// `.` and `..` segments are rejected so a location can never name a
    /// file outside the storage root.
    fn to_fs_path(&self, location: &str) -> Result<PathBuf> {
        let mut path = self.base_path.clone();
        for part in location.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return Err(StoreError::Invalid(format!(
                    "relative segment in location: {}",
                    location
                )));
            }
            path.push(part);
        }
        Ok(path)
    }

    /// Convert a filesystem path back to a location.
    fn to_location(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.base_path)
            .map_err(|_| StoreError::Invalid(format!("outside storage root: {}", path.display())))?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// Ensure parent directories exist for a path.
    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn not_found(location: &str, e: std::io::Error) -> StoreError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(location.to_string())
        } else {
            e.into()
        }
    }

    /// Recursively copy a directory tree.
    #[async_recursion::async_recursion]
    async fn copy_recursive(&self, from: &Path, to: &Path) -> Result<()> {
        fs::create_dir_all(to).await?;
        let mut entries = fs::read_dir(from).await?;

        while let Some(entry) = entries.next_entry().await? {
            let source = entry.path();
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                self.copy_recursive(&source, &target).await?;
            } else {
                fs::copy(&source, &target).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TiddlerBackend for LocalBackend {
    #[instrument(skip(self), fields(location = %location))]
    async fn read(&self, location: &str) -> Result<Bytes> {
        let fs_path = self.to_fs_path(location)?;
        debug!("Reading from {:?}", fs_path);

        fs::read(&fs_path)
            .await
            .map(Bytes::from)
            .map_err(|e| Self::not_found(location, e))
    }

    #[instrument(skip(self, data), fields(location = %location, size = data.len()))]
    async fn write(&self, location: &str, data: Bytes) -> Result<()> {
        let fs_path = self.to_fs_path(location)?;
        self.ensure_parent(&fs_path).await?;

        debug!("Writing {} bytes to {:?}", data.len(), fs_path);
        fs::write(&fs_path, &data).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn delete(&self, location: &str) -> Result<()> {
        let fs_path = self.to_fs_path(location)?;
        debug!("Deleting {:?}", fs_path);

        fs::remove_file(&fs_path)
            .await
            .map_err(|e| Self::not_found(location, e))
    }

    async fn exists(&self, location: &str) -> Result<bool> {
        Ok(fs::try_exists(self.to_fs_path(location)?).await?)
    }

    fn walk<'a>(&'a self, dir: &'a str) -> LocationStream<'a> {
        Box::pin(async_stream::try_stream! {
            let root = self.to_fs_path(dir)?;
            let mut pending = vec![root];

            while let Some(current) = pending.pop() {
                let mut entries = fs::read_dir(&current).await?;

                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if entry.file_type().await?.is_dir() {
                        if !entry.file_name().to_string_lossy().starts_with('.') {
                            pending.push(path);
                        }
                        continue;
                    }

                    let found = self.to_location(&path)?;
                    if location::is_tiddler_file(&found) {
                        yield found;
                    }
                }
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self))]
    async fn create_required_folders(&self, path: &str) -> Result<()> {
        let root = self.to_fs_path(path)?;
        for dir in [WIKIS_DIR, TEMPLATES_DIR, TRASH_DIR] {
            let target = root.join(dir);
            if !fs::try_exists(&target).await? {
                debug!("Creating {:?}", target);
                fs::create_dir_all(&target).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn wiki_list(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.to_fs_path(path)?)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        let mut wikis = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() && !name.starts_with('.') {
                wikis.push(name);
            }
        }

        wikis.sort();
        Ok(wikis)
    }

    #[instrument(skip(self))]
    async fn wiki_template_list(&self, path: &str) -> Result<Vec<WikiTemplate>> {
        let dir = self.to_fs_path(path)?;
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        let mut templates: BTreeMap<String, WikiTemplate> = BTreeMap::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let file = entry.file_name().to_string_lossy().into_owned();
            let Some((name, extension)) = file.split_once('.') else {
                continue;
            };

            let template = templates
                .entry(name.to_string())
                .or_insert_with(|| WikiTemplate {
                    name: name.to_string(),
                    file: String::new(),
                    description: String::new(),
                });

            match extension {
                "txt" => template.description = fs::read_to_string(entry.path()).await?,
                "html" => template.file = file.clone(),
                _ => {}
            }
        }

        Ok(templates
            .into_values()
            .filter(|t| !t.file.is_empty())
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_wiki_folder(&self, wiki_path: &str, template_file: &str) -> Result<()> {
        let wiki_dir = self.to_fs_path(wiki_path)?;
        let template = self.to_fs_path(template_file)?;

        if fs::try_exists(&wiki_dir).await? {
            return Err(StoreError::Invalid(format!("wiki already exists: {}", wiki_path)));
        }
        let html = fs::read(&template)
            .await
            .map_err(|e| Self::not_found(template_file, e))?;

        fs::create_dir_all(&wiki_dir).await?;
        fs::write(wiki_dir.join(WIKI_INDEX_FILE), html).await?;
        fs::create_dir_all(wiki_dir.join("tiddlers")).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_folder(&self, from: &str, to: &str) -> Result<()> {
        let source = self.to_fs_path(from)?;
        if !fs::try_exists(&source).await? {
            return Err(StoreError::NotFound(from.to_string()));
        }
        let target = self.to_fs_path(to)?;
        self.copy_recursive(&source, &target).await
    }

    #[instrument(skip(self))]
    async fn delete_folder(&self, path: &str) -> Result<()> {
        fs::remove_dir_all(self.to_fs_path(path)?)
            .await
            .map_err(|e| Self::not_found(path, e))
    }
}
