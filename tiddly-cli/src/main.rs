use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tiddly_storage::{
    open_backend, BackendConfig, StoreOptions, TiddlerBackend, TiddlerStore, WikiConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "tiddly")]
#[command(about = "Tiddly CLI - inspect and manage tiddler stores")]
#[command(version)]
struct Cli {
    /// Wiki location: a directory, file://<dir>, s3://<bucket>/<prefix> or gs://<bucket>/<prefix>
    #[arg(short, long, env = "WIKI_LOCATION", global = true)]
    location: Option<String>,

    /// TOML file with [backend] and [store] tables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Decode workers for index builds
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List tiddler titles
    List {
        /// Print the sync listing (no system tiddlers, bodies only for macros) as JSON
        #[arg(long)]
        skinny: bool,
    },

    /// Print a tiddler
    Get {
        title: String,

        /// Print as JSON instead of the .tid format
        #[arg(long)]
        json: bool,
    },

    /// Create or replace a tiddler, bumping its revision
    Put {
        title: String,

        /// Tiddler text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Content type, e.g. text/vnd.tiddlywiki or image/png
        #[arg(long = "type")]
        content_type: Option<String>,

        /// Tags, in TiddlyWiki list syntax
        #[arg(long)]
        tags: Option<String>,
    },

    /// Delete a tiddler
    Delete { title: String },

    /// Print the title of a .tid file without loading a store
    Peek { file: PathBuf },

    /// Walk the store and report what it holds
    Stats,

    /// Create the wikis, templates and trash folders
    Init,

    /// List wikis
    Wikis {
        /// Also print each wiki's site description (local storage only)
        #[arg(long)]
        describe: bool,
    },

    /// List wiki templates
    Templates,

    /// Create a wiki from a template
    NewWiki {
        name: String,

        /// Template name or file, e.g. empty or empty.html
        template: String,
    },

    /// Move a wiki to the trash folder
    TrashWiki { name: String },
}

/// Backend and store options from `--config`, `--location` and `--workers`.
fn resolve_config(cli: &Cli) -> Result<WikiConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            toml::from_str::<WikiConfig>(&raw)
                .with_context(|| format!("Failed to parse config {:?}", path))?
        }
        None => WikiConfig {
            backend: BackendConfig::local("."),
            store: StoreOptions::default(),
        },
    };

    if let Some(location) = &cli.location {
        config.backend = location
            .parse()
            .with_context(|| format!("Invalid wiki location '{}'", location))?;
    }
    if let Some(workers) = cli.workers {
        config.store.workers = workers;
    }

    Ok(config)
}

fn backend(config: &WikiConfig) -> Result<Arc<dyn TiddlerBackend>> {
    open_backend(&config.backend)
        .with_context(|| format!("Failed to open {} storage", config.backend.kind()))
}

async fn open_store(config: &WikiConfig, options: StoreOptions) -> Result<TiddlerStore> {
    let store = TiddlerStore::open(backend(config)?, options)
        .await
        .context("Failed to open tiddler store")?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = resolve_config(&cli)?;
    tracing::debug!(backend = config.backend.kind(), "Resolved configuration");

    match cli.command {
        Commands::List { skinny } => {
            let store = open_store(&config, config.store.clone()).await?;
            commands::run_list(&store, skinny).await?;
        }
        Commands::Get { title, json } => {
            let store = open_store(&config, config.store.clone()).await?;
            commands::run_get(&store, &title, json).await?;
        }
        Commands::Put {
            title,
            text,
            file,
            content_type,
            tags,
        } => {
            let store = open_store(&config, config.store.clone()).await?;
            let tiddler = commands::build_tiddler(&title, text, file, content_type, tags).await?;
            commands::run_put(&store, tiddler).await?;
        }
        Commands::Delete { title } => {
            let store = open_store(&config, config.store.clone()).await?;
            commands::run_delete(&store, &title).await?;
        }
        Commands::Peek { file } => {
            commands::run_peek(&file).await?;
        }
        Commands::Stats => {
            commands::run_stats(backend(&config)?, &config.store).await?;
        }
        Commands::Init => {
            let store = open_store(&config, config.store.clone().without_index()).await?;
            commands::run_init(&store).await?;
        }
        Commands::Wikis { describe } => {
            let store = open_store(&config, config.store.clone().without_index()).await?;
            commands::run_wikis(&store, &config, describe).await?;
        }
        Commands::Templates => {
            let store = open_store(&config, config.store.clone().without_index()).await?;
            commands::run_templates(&store).await?;
        }
        Commands::NewWiki { name, template } => {
            let store = open_store(&config, config.store.clone().without_index()).await?;
            commands::run_new_wiki(&store, &name, &template).await?;
        }
        Commands::TrashWiki { name } => {
            let store = open_store(&config, config.store.clone().without_index()).await?;
            commands::run_trash_wiki(&store, &name).await?;
        }
    }

    Ok(())
}
