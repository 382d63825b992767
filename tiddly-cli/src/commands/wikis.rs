use anyhow::{bail, Context, Result};
use tiddly_storage::path::join;
use tiddly_storage::{
    BackendConfig, TiddlerStore, WikiConfig, WikiRegistry, TEMPLATES_DIR, TRASH_DIR, WIKIS_DIR,
};

fn check_wiki_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        bail!("Invalid wiki name '{}'", name);
    }
    Ok(())
}

fn template_file(template: &str) -> String {
    if template.ends_with(".html") {
        template.to_string()
    } else {
        format!("{}.html", template)
    }
}

pub async fn run_init(store: &TiddlerStore) -> Result<()> {
    store
        .create_required_folders("")
        .await
        .context("Failed to create storage folders")?;
    println!("Created {}/, {}/ and {}/", WIKIS_DIR, TEMPLATES_DIR, TRASH_DIR);
    Ok(())
}

pub async fn run_wikis(store: &TiddlerStore, config: &WikiConfig, describe: bool) -> Result<()> {
    if !describe {
        for name in store.wiki_list(WIKIS_DIR).await.context("Failed to list wikis")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let BackendConfig::Local { path } = &config.backend else {
        bail!("--describe needs local storage, not {}", config.backend.kind());
    };
    let registry = WikiRegistry::open_local(path, config.store.clone())
        .await
        .context("Failed to open wikis")?;
    for summary in registry.descriptions().await {
        println!("{}\t{}", summary.name, summary.description);
    }
    Ok(())
}

pub async fn run_templates(store: &TiddlerStore) -> Result<()> {
    let templates = store
        .wiki_template_list(TEMPLATES_DIR)
        .await
        .context("Failed to list templates")?;
    for template in templates {
        println!("{}\t{}\t{}", template.name, template.file, template.description.trim());
    }
    Ok(())
}

pub async fn run_new_wiki(store: &TiddlerStore, name: &str, template: &str) -> Result<()> {
    check_wiki_name(name)?;
    let wiki_path = join(WIKIS_DIR, name);
    let template_path = join(TEMPLATES_DIR, &template_file(template));

    store
        .create_wiki_folder(&wiki_path, &template_path)
        .await
        .with_context(|| format!("Failed to create wiki '{}' from {}", name, template_path))?;
    println!("Created {}", wiki_path);
    Ok(())
}

/// Copy a wiki into the trash folder, then remove it.
pub async fn run_trash_wiki(store: &TiddlerStore, name: &str) -> Result<()> {
    check_wiki_name(name)?;
    let wiki_path = join(WIKIS_DIR, name);
    let trash_path = join(TRASH_DIR, name);

    store
        .copy_folder(&wiki_path, &trash_path)
        .await
        .with_context(|| format!("Failed to copy '{}' to the trash", name))?;
    store
        .delete_folder(&wiki_path)
        .await
        .with_context(|| format!("Failed to remove '{}'", wiki_path))?;
    println!("Moved {} to {}", wiki_path, trash_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tiddly_storage::{LocalBackend, StoreOptions};

    async fn root_store(temp: &TempDir) -> TiddlerStore {
        let backend = Arc::new(LocalBackend::new(temp.path()));
        TiddlerStore::open(backend, StoreOptions::default().without_index())
            .await
            .unwrap()
    }

    #[test]
    fn test_check_wiki_name() {
        assert!(check_wiki_name("journal").is_ok());
        assert!(check_wiki_name("").is_err());
        assert!(check_wiki_name("../etc").is_err());
        assert!(check_wiki_name(".hidden").is_err());
    }

    #[test]
    fn test_template_file() {
        assert_eq!(template_file("empty"), "empty.html");
        assert_eq!(template_file("empty.html"), "empty.html");
    }

    #[tokio::test]
    async fn test_new_and_trash_wiki() {
        let temp = TempDir::new().unwrap();
        let store = root_store(&temp).await;
        run_init(&store).await.unwrap();
        tokio::fs::write(temp.path().join("templates/empty.html"), "<html>")
            .await
            .unwrap();

        run_new_wiki(&store, "journal", "empty").await.unwrap();
        assert!(temp.path().join("wikis/journal/index.html").is_file());
        assert!(run_new_wiki(&store, "journal", "empty").await.is_err());

        run_trash_wiki(&store, "journal").await.unwrap();
        assert!(!temp.path().join("wikis/journal").exists());
        assert!(temp.path().join("trash/journal/tiddlers").is_dir());
    }
}
