use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tiddly_storage::index::walk_and_decode;
use tiddly_storage::{StoreOptions, TiddlerBackend};

#[derive(Debug, Default)]
struct Counts {
    system: AtomicUsize,
    binary: AtomicUsize,
    sidecars: AtomicUsize,
}

/// Walk the tiddlers folder once and print what was found.
pub async fn run_stats(backend: Arc<dyn TiddlerBackend>, options: &StoreOptions) -> Result<()> {
    let name = backend.backend_name();
    let counts = Arc::new(Counts::default());
    let sink_counts = counts.clone();

    let summary = walk_and_decode(
        backend,
        &options.tiddlers_dir,
        options.workers,
        move |_, location, tiddler| {
            if tiddler.is_system() {
                sink_counts.system.fetch_add(1, Ordering::Relaxed);
            }
            if tiddler.is_binary() {
                sink_counts.binary.fetch_add(1, Ordering::Relaxed);
            }
            if location.ends_with(".meta") {
                sink_counts.sidecars.fetch_add(1, Ordering::Relaxed);
            }
        },
    )
    .await
    .with_context(|| format!("Failed to walk '{}'", options.tiddlers_dir))?;

    println!();
    println!("Backend:          {}", name);
    println!("Tiddlers folder:  {}", options.tiddlers_dir);
    println!("Workers:          {}", options.workers.max(1));
    println!("--------------------------------------------------------------------------------");
    println!("  Files found:    {}", summary.seen);
    println!("  Decoded:        {}", summary.decoded);
    println!("  Skipped:        {}", summary.failed);
    println!("  System:         {}", counts.system.load(Ordering::Relaxed));
    println!("  Binary:         {}", counts.binary.load(Ordering::Relaxed));
    println!("  .meta pairs:    {}", counts.sidecars.load(Ordering::Relaxed));
    println!("  Elapsed:        {:.2?}", summary.elapsed);
    println!();

    Ok(())
}
