use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tiddly_storage::{codec, parse_list, Tiddler, TiddlerStore, CREATED, TAGS, TEXT, TYPE};

/// Print titles, or the skinny JSON listing.
pub async fn run_list(store: &TiddlerStore, skinny: bool) -> Result<()> {
    if skinny {
        let listing = store.skinny_list().await.context("Failed to list tiddlers")?;
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let titles = if store.is_indexed() {
        store.titles()
    } else {
        let mut titles: Vec<String> = store
            .get_all()
            .await
            .context("Failed to list tiddlers")?
            .iter()
            .filter_map(|t| t.title().map(str::to_string))
            .collect();
        titles.sort();
        titles
    };

    for title in &titles {
        println!("{}", title);
    }
    tracing::info!("{} tiddlers", titles.len());
    Ok(())
}

pub async fn run_get(store: &TiddlerStore, title: &str, json: bool) -> Result<()> {
    let tiddler = store
        .get(title)
        .await
        .with_context(|| format!("Failed to get '{}'", title))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tiddler)?);
    } else {
        let encoded = codec::encode(&tiddler)?;
        print!("{}", String::from_utf8_lossy(&encoded));
    }
    Ok(())
}

/// Assemble a tiddler from `put` arguments.
///
/// File contents are kept as raw bytes when the content type is binary.
pub async fn build_tiddler(
    title: &str,
    text: Option<String>,
    file: Option<PathBuf>,
    content_type: Option<String>,
    tags: Option<String>,
) -> Result<Tiddler> {
    let mut tiddler = Tiddler::with_title(title);
    if let Some(content_type) = content_type {
        tiddler.set(TYPE, content_type);
    }
    if let Some(tags) = tags {
        tiddler.set(TAGS, parse_list(&tags));
    }

    match (text, file) {
        (Some(text), _) => tiddler.set(TEXT, text),
        (None, Some(path)) => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            if tiddler.is_binary() {
                tiddler.set(TEXT, data);
            } else {
                let text = String::from_utf8(data)
                    .with_context(|| format!("{:?} is not UTF-8; pass a binary --type", path))?;
                tiddler.set(TEXT, text);
            }
        }
        (None, None) => {}
    }

    Ok(tiddler)
}

/// Store a tiddler, keeping the stored `created` stamp.
pub async fn run_put(store: &TiddlerStore, mut tiddler: Tiddler) -> Result<()> {
    let title = tiddler.title().unwrap_or_default().to_string();

    if store.contains(&title) || !store.is_indexed() {
        match store.get(&title).await {
            Ok(existing) => {
                if let Some(created) = existing.get(CREATED) {
                    tiddler.set(CREATED, created.clone());
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Could not read existing tiddler"),
        }
    }
    tiddler.touch();

    let revision = store
        .put_revision(tiddler)
        .await
        .with_context(|| format!("Failed to put '{}'", title))?;
    println!("{} (revision {})", title, revision);
    Ok(())
}

pub async fn run_delete(store: &TiddlerStore, title: &str) -> Result<()> {
    store
        .delete(title)
        .await
        .with_context(|| format!("Failed to delete '{}'", title))?;
    println!("Deleted {}", title);
    Ok(())
}

/// Print a .tid file's title.
pub async fn run_peek(file: &Path) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let title = codec::peek_title(&data).with_context(|| format!("No title in {:?}", file))?;
    println!("{}", title);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tiddly_storage::{FieldValue, LocalBackend, StoreOptions};

    #[tokio::test]
    async fn test_build_tiddler_binary_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dot.png");
        tokio::fs::write(&path, [0x89u8, 0x50, 0xFF]).await.unwrap();

        let tiddler = build_tiddler(
            "dot.png",
            None,
            Some(path),
            Some("image/png".to_string()),
            Some("images [[site assets]]".to_string()),
        )
        .await
        .unwrap();

        assert!(matches!(tiddler.get(TEXT), Some(FieldValue::Bytes(_))));
        assert_eq!(tiddler.tags(), vec!["images", "site assets"]);
    }

    #[tokio::test]
    async fn test_build_tiddler_rejects_binary_text_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob");
        tokio::fs::write(&path, [0xFFu8, 0xFE]).await.unwrap();

        assert!(build_tiddler("blob", None, Some(path), None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_put_keeps_created() {
        let temp = TempDir::new().unwrap();
        tokio::fs::create_dir_all(temp.path().join("tiddlers")).await.unwrap();
        let backend = Arc::new(LocalBackend::new(temp.path()));
        let store = TiddlerStore::open(backend, StoreOptions::default()).await.unwrap();

        store
            .put(Tiddler::with_title("Note").with_field(CREATED, "20200101000000000"))
            .await
            .unwrap();

        let update = build_tiddler("Note", Some("new text".to_string()), None, None, None)
            .await
            .unwrap();
        run_put(&store, update).await.unwrap();

        let note = store.get("Note").await.unwrap();
        assert_eq!(note.field(CREATED).as_deref(), Some("20200101000000000"));
        assert_eq!(note.field(TEXT).as_deref(), Some("new text"));
        assert_eq!(note.revision(), 1);
    }
}
