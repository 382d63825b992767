//! Title index and concurrent index builder.
//!
//! The builder walks a backend directory on the calling task and fans the
//! locations out to a fixed pool of decode workers over a bounded channel:
//!
//! ```text
//!   walk ──► mpsc(workers) ──► worker 1 ─┐
//!                          ├─► worker 2 ─┼─► sink(title, location, tiddler)
//!                          └─► worker N ─┘
//! ```
//!
//! A file that fails to read or decode, or has no title, is logged and
//! skipped. A failure of the walk itself aborts the build.

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::tiddler::Tiddler;
use crate::traits::TiddlerBackend;

/// Number of decode workers used when none is configured.
pub const DEFAULT_WORKERS: usize = 15;

/// Title → location map and title → tiddler cache.
///
/// Every cached title is also indexed. A title can be indexed without being
/// cached, in which case reads go to the backend.
#[derive(Debug, Default, Clone)]
pub struct TiddlerIndex {
    locations: HashMap<String, String>,
    tiddlers: HashMap<String, Tiddler>,
}

impl TiddlerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed titles.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of cached tiddlers.
    pub fn cached_len(&self) -> usize {
        self.tiddlers.len()
    }

    pub fn location(&self, title: &str) -> Option<&str> {
        self.locations.get(title).map(String::as_str)
    }

    pub fn cached(&self, title: &str) -> Option<&Tiddler> {
        self.tiddlers.get(title)
    }

    /// Title already mapped to `location`, other than `title` itself.
    pub fn title_at(&self, location: &str, title: &str) -> Option<&str> {
        self.locations
            .iter()
            .find(|(t, l)| l.as_str() == location && t.as_str() != title)
            .map(|(t, _)| t.as_str())
    }

    /// Record a title's location, replacing or dropping its cached tiddler.
    ///
    /// Returns the previous location, if any.
    pub fn insert(
        &mut self,
        title: impl Into<String>,
        location: impl Into<String>,
        tiddler: Option<Tiddler>,
    ) -> Option<String> {
        let title = title.into();
        match tiddler {
            Some(tiddler) => {
                self.tiddlers.insert(title.clone(), tiddler);
            }
            None => {
                self.tiddlers.remove(&title);
            }
        }
        self.locations.insert(title, location.into())
    }

    /// Forget a title. Returns its location.
    pub fn remove(&mut self, title: &str) -> Option<String> {
        self.tiddlers.remove(title);
        self.locations.remove(title)
    }

    /// Iterate over cached tiddlers.
    pub fn tiddlers(&self) -> impl Iterator<Item = &Tiddler> {
        self.tiddlers.values()
    }

    /// Sorted list of indexed titles.
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.locations.keys().cloned().collect();
        titles.sort();
        titles
    }
}

/// Counters for one walk over a backend directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Locations yielded by the walk
    pub seen: usize,
    /// Locations decoded into a titled tiddler
    pub decoded: usize,
    /// Locations skipped after a read or decode failure
    pub failed: usize,
    pub elapsed: Duration,
}

type Sink = dyn Fn(String, String, Tiddler) + Send + Sync;

/// Walk `dir` and decode every tiddler file on `workers` concurrent tasks.
///
/// `sink` receives `(title, location, tiddler)` for each decoded file, from
/// whichever worker decoded it.
///
/// # Errors
///
/// Returns the walk's error if enumeration fails. Already-dispatched
/// locations are still decoded before the error is returned.
pub async fn walk_and_decode<F>(
    backend: Arc<dyn TiddlerBackend>,
    dir: &str,
    workers: usize,
    sink: F,
) -> Result<WalkSummary>
where
    F: Fn(String, String, Tiddler) + Send + Sync + 'static,
{
    let started = Instant::now();
    let workers = workers.max(1);
    let sink: Arc<Sink> = Arc::new(sink);
    let decoded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let (tx, rx) = mpsc::channel::<String>(workers);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let backend = backend.clone();
        let rx = rx.clone();
        let sink = sink.clone();
        let decoded = decoded.clone();
        let failed = failed.clone();

        handles.push(tokio::spawn(async move {
            loop {
                // Receiver guard is dropped at the end of this statement. Only
                // the dequeue is serialized across workers, not the decode.
                let next = rx.lock().await.recv().await;
                let Some(location) = next else {
                    break;
                };

                match codec::decode_location(backend.as_ref(), &location).await {
                    Ok(tiddler) => match tiddler.title() {
                        Some(title) if !title.is_empty() => {
                            let title = title.to_string();
                            sink(title, location, tiddler);
                            decoded.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            warn!(worker, location = %location, "Skipping tiddler without a title");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    Err(e) => {
                        warn!(
                            worker,
                            location = %location,
                            error = %e,
                            "Skipping unreadable tiddler"
                        );
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            debug!(worker, "Index worker finished");
        }));
    }

    let mut seen = 0;
    let mut walk_error = None;
    {
        let mut walk = backend.walk(dir);
        while let Some(item) = walk.next().await {
            match item {
                Ok(location) => {
                    seen += 1;
                    if tx.send(location).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    walk_error = Some(e);
                    break;
                }
            }
        }
    }
    drop(tx);

    for handle in handles {
        handle
            .await
            .map_err(|e| StoreError::Backend(format!("index worker failed: {}", e)))?;
    }

    if let Some(e) = walk_error {
        warn!(dir, error = %e, "Walk failed");
        return Err(e);
    }

    Ok(WalkSummary {
        seen,
        decoded: decoded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    })
}

/// Build a fully cached index of every tiddler under `dir`.
///
/// When two files carry the same title the last one decoded wins.
pub async fn build_index(
    backend: Arc<dyn TiddlerBackend>,
    dir: &str,
    workers: usize,
) -> Result<TiddlerIndex> {
    let shared = Arc::new(Mutex::new(TiddlerIndex::new()));
    let sink_index = shared.clone();

    let summary = walk_and_decode(backend, dir, workers, move |title, location, tiddler| {
        let mut index = sink_index.lock();
        if let Some(previous) = index.insert(title.clone(), location.clone(), Some(tiddler)) {
            warn!(title = %title, previous = %previous, location = %location, "Duplicate title");
        }
    })
    .await?;

    info!(
        dir,
        workers,
        tiddlers = summary.decoded,
        skipped = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Built tiddler index"
    );

    let index = match Arc::try_unwrap(shared) {
        Ok(index) => index.into_inner(),
        Err(shared) => shared.lock().clone(),
    };
    Ok(index)
}

/// Decode every tiddler under `dir` without keeping an index.
pub async fn collect_all(
    backend: Arc<dyn TiddlerBackend>,
    dir: &str,
    workers: usize,
) -> Result<Vec<Tiddler>> {
    let shared = Arc::new(Mutex::new(Vec::new()));
    let sink_list = shared.clone();

    let summary = walk_and_decode(backend, dir, workers, move |_, _, tiddler| {
        sink_list.lock().push(tiddler);
    })
    .await?;
    debug!(dir, tiddlers = summary.decoded, skipped = summary.failed, "Collected tiddlers");

    let tiddlers = match Arc::try_unwrap(shared) {
        Ok(list) => list.into_inner(),
        Err(shared) => std::mem::take(&mut *shared.lock()),
    };
    Ok(tiddlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectBackend;
    use crate::path::canonical_location;
    use crate::traits::LocationStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use object_store::memory::InMemory;

    async fn seeded_backend(count: usize) -> Arc<dyn TiddlerBackend> {
        let backend = ObjectBackend::new(Arc::new(InMemory::new()), "", "memory");
        for i in 0..count {
            let title = format!("Tiddler {}", i);
            let data = format!("title: {}\n\nbody {}", title, i);
            backend
                .write(&canonical_location("tiddlers", &title), Bytes::from(data))
                .await
                .unwrap();
        }
        Arc::new(backend)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_build_index_worker_counts() {
        let backend = seeded_backend(60).await;

        for workers in [1, 4, DEFAULT_WORKERS, 100] {
            let index = build_index(backend.clone(), "tiddlers", workers).await.unwrap();
            assert_eq!(index.len(), 60, "workers = {}", workers);
            assert_eq!(index.cached_len(), 60, "workers = {}", workers);
            assert_eq!(index.location("Tiddler 7"), Some("tiddlers/Tiddler 7.tid"));
            assert_eq!(
                index.cached("Tiddler 7").and_then(|t| t.field("text")).as_deref(),
                Some("body 7")
            );
        }
    }

    #[tokio::test]
    async fn test_build_index_zero_workers() {
        let backend = seeded_backend(3).await;
        let index = build_index(backend, "tiddlers", 0).await.unwrap();
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_build_index_empty_dir() {
        let backend = seeded_backend(0).await;
        let index = build_index(backend, "tiddlers", 4).await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_failed_files_are_skipped() {
        let backend = seeded_backend(5).await;
        backend
            .write("tiddlers/broken.tid", Bytes::from("no colon here\n\nbody"))
            .await
            .unwrap();
        backend
            .write("tiddlers/untitled.tid", Bytes::from("type: text/plain\n\nbody"))
            .await
            .unwrap();
        backend
            .write(
                "tiddlers/orphan.png.meta",
                Bytes::from("title: orphan.png\ntype: image/png\n\n"),
            )
            .await
            .unwrap();

        let index = Arc::new(Mutex::new(TiddlerIndex::new()));
        let sink_index = index.clone();
        let summary = walk_and_decode(backend, "tiddlers", 3, move |title, location, tiddler| {
            sink_index.lock().insert(title, location, Some(tiddler));
        })
        .await
        .unwrap();

        assert_eq!(summary.seen, 8);
        assert_eq!(summary.decoded, 5);
        assert_eq!(summary.failed, 3);
        assert_eq!(index.lock().len(), 5);
    }

    struct BrokenWalk {
        inner: ObjectBackend,
    }

    #[async_trait]
    impl TiddlerBackend for BrokenWalk {
        async fn read(&self, location: &str) -> Result<Bytes> {
            self.inner.read(location).await
        }

        async fn write(&self, location: &str, data: Bytes) -> Result<()> {
            self.inner.write(location, data).await
        }

        async fn delete(&self, location: &str) -> Result<()> {
            self.inner.delete(location).await
        }

        async fn exists(&self, location: &str) -> Result<bool> {
            self.inner.exists(location).await
        }

        fn walk<'a>(&'a self, _dir: &'a str) -> LocationStream<'a> {
            Box::pin(async_stream::try_stream! {
                yield "tiddlers/A.tid".to_string();
                Err::<(), _>(StoreError::Backend("listing interrupted".to_string()))?;
            })
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_walk_error_aborts_build() {
        let inner = ObjectBackend::new(Arc::new(InMemory::new()), "", "memory");
        inner
            .write("tiddlers/A.tid", Bytes::from("title: A\n\n"))
            .await
            .unwrap();

        let backend: Arc<dyn TiddlerBackend> = Arc::new(BrokenWalk { inner });
        let err = build_index(backend, "tiddlers", 2).await.unwrap_err();
        assert!(err.is_backend_failure());
    }

    #[tokio::test]
    async fn test_collect_all() {
        let backend = seeded_backend(12).await;
        let mut titles: Vec<String> = collect_all(backend, "tiddlers", 4)
            .await
            .unwrap()
            .iter()
            .filter_map(|t| t.title().map(str::to_string))
            .collect();
        titles.sort();
        assert_eq!(titles.len(), 12);
        assert_eq!(titles[0], "Tiddler 0");
    }

    #[test]
    fn test_index_insert_and_remove() {
        let mut index = TiddlerIndex::new();
        assert_eq!(index.insert("A", "tiddlers/A.tid", Some(Tiddler::with_title("A"))), None);
        assert_eq!(index.cached_len(), 1);

        let previous = index.insert("A", "tiddlers/A.tid", None);
        assert_eq!(previous.as_deref(), Some("tiddlers/A.tid"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.cached_len(), 0);

        assert_eq!(index.title_at("tiddlers/A.tid", "B"), Some("A"));
        assert_eq!(index.title_at("tiddlers/A.tid", "A"), None);

        assert_eq!(index.remove("A").as_deref(), Some("tiddlers/A.tid"));
        assert!(index.is_empty());
        assert_eq!(index.titles(), Vec::<String>::new());
    }
}
