use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::db::CacheDb;
use crate::errors::ConversionError;
use crate::temp_file::TempFile;
use crate::video::{AudioMode, SourceFetcher, Transcoder, Uploader, output_path};

/// Short ID used to follow one request through the logs (8 chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string()[..8].to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to convert: cache key plus enough to fetch and name it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMedia {
    pub content_hash: String,
    pub url: String,
    pub display_name: String,
}

impl SourceMedia {
    fn upload_name(&self) -> String {
        format!("{}.mp4", self.display_name)
    }
}

/// One caller's need for a converted artifact.
/// Dropping `reply` without sending tells the caller the conversion failed.
pub struct ConversionRequest {
    pub id: RequestId,
    pub source: SourceMedia,
    /// Queued by a background warm-up rather than a waiting caller
    pub warm_up: bool,
    reply: oneshot::Sender<String>,
}

/// Worker settings
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Where temporary mp4 files are written
    pub output_dir: PathBuf,
    pub mode: AudioMode,
    /// Bounded wait for `obtain`; `None` waits until the worker answers
    pub obtain_timeout: Option<Duration>,
}

/// Entry point for obtaining converted media.
///
/// Every request is handled by a single worker in arrival order, so cache
/// reads and writes for the same hash never overlap.
pub struct ConversionQueue {
    /// Channel sender for submitting requests; `None` after shutdown
    sender: Mutex<Option<mpsc::UnboundedSender<ConversionRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Number of requests waiting (not yet picked up by the worker)
    pending_count: Arc<AtomicUsize>,
    /// Hashes with a warm-up request queued or in progress
    warming: Arc<Mutex<HashSet<String>>>,
    db: CacheDb,
    obtain_timeout: Option<Duration>,
}

impl ConversionQueue {
    /// Create the queue and start its worker
    pub fn start(
        db: CacheDb,
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        uploader: Arc<dyn Uploader>,
        settings: QueueSettings,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending_count = Arc::new(AtomicUsize::new(0));
        let warming = Arc::new(Mutex::new(HashSet::new()));

        let worker = ConversionWorker {
            db: db.clone(),
            fetcher,
            transcoder,
            uploader,
            output_dir: settings.output_dir,
            mode: settings.mode,
            pending_count: pending_count.clone(),
            warming: warming.clone(),
        };

        let handle = tokio::spawn(async move {
            worker.run(receiver).await;
        });

        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            pending_count,
            warming,
            db,
            obtain_timeout: settings.obtain_timeout,
        })
    }

    /// Enqueue a request and return its reply slot
    pub async fn submit(&self, source: SourceMedia) -> oneshot::Receiver<String> {
        self.enqueue(source, false).await
    }

    async fn enqueue(&self, source: SourceMedia, warm_up: bool) -> oneshot::Receiver<String> {
        let (reply, receiver) = oneshot::channel();
        let request = ConversionRequest {
            id: RequestId::new(),
            source,
            warm_up,
            reply,
        };

        log::debug!(
            "Queued conversion {} for {}",
            request.id,
            request.source.content_hash
        );

        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            log::error!(
                "Conversion queue is shut down, dropping request {}: {}",
                request.id,
                request.source.content_hash
            );
            return receiver;
        };

        self.pending_count.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = sender.send(request) {
            self.pending_count.fetch_sub(1, Ordering::SeqCst);
            log::error!(
                "Conversion worker is gone, dropping request {}: {}",
                e.0.id,
                e.0.source.content_hash
            );
        }

        receiver
    }

    /// Queue a background conversion unless one for the same hash is
    /// already waiting. Returns whether a request was queued.
    pub async fn warm_up(&self, source: SourceMedia) -> bool {
        if !self.warming.lock().await.insert(source.content_hash.clone()) {
            log::debug!("Warm-up for {} already queued", source.content_hash);
            return false;
        }
        // Nobody waits on the reply
        drop(self.enqueue(source, true).await);
        true
    }

    /// Wait for the remote handle of `source`, converting it if necessary.
    /// Returns `None` when conversion failed or the wait timed out.
    pub async fn obtain(&self, source: SourceMedia) -> Option<String> {
        let content_hash = source.content_hash.clone();
        let reply = self.submit(source).await;

        match self.obtain_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome.ok(),
                Err(_) => {
                    log::warn!(
                        "Gave up waiting for {} after {}s",
                        content_hash,
                        limit.as_secs()
                    );
                    None
                }
            },
            None => reply.await.ok(),
        }
    }

    /// Cache lookup that never triggers conversion
    pub async fn check_cached(&self, content_hash: &str) -> Option<String> {
        match self.db.check_cached(content_hash).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Cache lookup for {} failed: {}", content_hash, e);
                None
            }
        }
    }

    /// Get number of requests waiting in queue
    pub fn pending_count(&self) -> usize {
        self.pending_count.load(Ordering::SeqCst)
    }

    /// Stop accepting requests and wait for the worker to finish the ones
    /// already queued.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().await.take());

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Conversion worker panicked: {}", e);
            }
        }
    }
}

struct ConversionWorker {
    db: CacheDb,
    fetcher: Arc<dyn SourceFetcher>,
    transcoder: Arc<dyn Transcoder>,
    uploader: Arc<dyn Uploader>,
    output_dir: PathBuf,
    mode: AudioMode,
    pending_count: Arc<AtomicUsize>,
    warming: Arc<Mutex<HashSet<String>>>,
}

impl ConversionWorker {
    /// Main worker loop
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<ConversionRequest>) {
        log::info!("Conversion worker started ({} mode)", self.mode);

        while let Some(request) = receiver.recv().await {
            self.pending_count.fetch_sub(1, Ordering::SeqCst);
            let warm_up = request.warm_up.then(|| request.source.content_hash.clone());
            self.handle(request).await;
            if let Some(hash) = warm_up {
                self.warming.lock().await.remove(&hash);
            }
        }

        log::info!("Conversion worker stopped");
    }

    /// Process one request inside its own cache scope
    async fn handle(&self, request: ConversionRequest) {
        let ConversionRequest {
            id,
            source,
            warm_up,
            reply,
        } = request;
        let hash = source.content_hash.as_str();
        log::info!("Processing conversion {} for {}", id, hash);

        let mut scope = match self.db.begin().await {
            Ok(scope) => scope,
            Err(e) => return log_failure(&id, hash, &e),
        };

        match scope.get_by_hash(hash).await {
            Ok(Some(handle)) => {
                log::info!("Conversion {}: cache hit for {}", id, hash);
                let _ = reply.send(handle);
                if let Err(e) = scope.commit().await {
                    log_failure(&id, hash, &e);
                }
                return;
            }
            Ok(None) => {}
            Err(e) => return log_failure(&id, hash, &e),
        }

        let handle = match self.convert(&id, &source).await {
            Ok(handle) => handle,
            Err(e) => return log_failure(&id, hash, &e),
        };

        // The caller gets the handle before the cache write lands
        if reply.send(handle.clone()).is_err() && !warm_up {
            log::warn!("Conversion {}: caller stopped waiting, caching anyway", id);
        }

        match scope.put_by_hash(hash, &handle).await {
            Ok(inserted) => {
                if !inserted {
                    log::warn!("Conversion {}: {} was already cached", id, hash);
                }
                match scope.commit().await {
                    Ok(()) => log::info!("Conversion {} completed, cached {}", id, hash),
                    Err(e) => log_failure(&id, hash, &e),
                }
            }
            Err(e) => {
                log_failure(&id, hash, &e);
                if let Err(e) = scope.rollback().await {
                    log::error!("Conversion {}: rollback failed: {}", id, e);
                }
            }
        }
    }

    /// Fetch, transcode and upload; the temporary file is gone when this returns
    async fn convert(&self, id: &RequestId, source: &SourceMedia) -> Result<String, ConversionError> {
        let bytes = self.fetcher.fetch(&source.url).await?;
        log::debug!("Conversion {}: fetched {} bytes", id, bytes.len());

        fs::create_dir_all(&self.output_dir).await?;
        let temp = TempFile::new(output_path(&self.output_dir, &source.content_hash, self.mode));

        let result = self.transcode_and_upload(bytes, &temp, source).await;

        if let Err(e) = temp.remove().await {
            log::warn!("Conversion {}: {}", id, e);
        }

        result
    }

    async fn transcode_and_upload(
        &self,
        bytes: Vec<u8>,
        temp: &TempFile,
        source: &SourceMedia,
    ) -> Result<String, ConversionError> {
        self.transcoder.transcode(bytes, temp.path(), self.mode).await?;
        self.uploader.upload(&source.upload_name(), temp.path()).await
    }
}

fn log_failure(id: &RequestId, content_hash: &str, err: &ConversionError) {
    log::error!(
        "Conversion {} for {} failed at {}: {}",
        id,
        content_hash,
        err.stage(),
        err
    );
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::memory_pool;

    #[derive(Default)]
    struct FakeFetcher {
        missing: Vec<String>,
        slow: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow.iter().any(|u| u == url) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            if self.missing.iter().any(|u| u == url) {
                return Err(ConversionError::fetch_failed(format!("GET {} returned 404", url)));
            }
            Ok(b"webm bytes".to_vec())
        }
    }

    #[derive(Default)]
    struct FakeTranscoder {
        fail: bool,
        calls: AtomicUsize,
        outputs: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            input: Vec<u8>,
            output: &Path,
            _mode: AudioMode,
        ) -> Result<(), ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outputs.lock().unwrap().push(output.to_path_buf());
            // Leave a partial file behind on failure too
            fs::write(output, &input).await?;
            if self.fail {
                return Err(ConversionError::transcode_failed("exit status: 1"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeUploader {
        fail: bool,
        handle: Option<String>,
        calls: AtomicUsize,
        uploaded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn upload(&self, file_name: &str, path: &Path) -> Result<String, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(path.exists(), "upload must see the transcoded file");
            self.uploaded.lock().unwrap().push(file_name.to_string());
            if self.fail {
                return Err(ConversionError::upload_failed("upload response carried no video"));
            }
            Ok(self
                .handle
                .clone()
                .unwrap_or_else(|| format!("handle-{}", file_name)))
        }
    }

    struct Harness {
        queue: Arc<ConversionQueue>,
        db: CacheDb,
        fetcher: Arc<FakeFetcher>,
        transcoder: Arc<FakeTranscoder>,
        uploader: Arc<FakeUploader>,
        dir: tempfile::TempDir,
    }

    async fn harness(
        fetcher: FakeFetcher,
        transcoder: FakeTranscoder,
        uploader: FakeUploader,
        obtain_timeout: Option<Duration>,
    ) -> Harness {
        harness_with_pool(memory_pool().await, fetcher, transcoder, uploader, obtain_timeout).await
    }

    async fn harness_with_pool(
        pool: Arc<sqlx::SqlitePool>,
        fetcher: FakeFetcher,
        transcoder: FakeTranscoder,
        uploader: FakeUploader,
        obtain_timeout: Option<Duration>,
    ) -> Harness {
        let db = CacheDb::new(pool);
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);
        let transcoder = Arc::new(transcoder);
        let uploader = Arc::new(uploader);

        let queue = ConversionQueue::start(
            db.clone(),
            fetcher.clone(),
            transcoder.clone(),
            uploader.clone(),
            QueueSettings {
                output_dir: dir.path().join("converted"),
                mode: AudioMode::Audio,
                obtain_timeout,
            },
        );

        Harness {
            queue,
            db,
            fetcher,
            transcoder,
            uploader,
            dir,
        }
    }

    fn source(hash: &str) -> SourceMedia {
        SourceMedia {
            content_hash: hash.to_string(),
            url: format!("https://static.example/{}.webm", hash),
            display_name: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_fetch_transcode_and_upload() {
        let h = harness(Default::default(), Default::default(), Default::default(), None).await;
        let mut scope = h.db.begin().await.unwrap();
        scope.put_by_hash("h", "cached-handle").await.unwrap();
        scope.commit().await.unwrap();

        let handle = h.queue.obtain(source("h")).await;

        assert_eq!(handle.as_deref(), Some("cached-handle"));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_conversion_is_delivered_cached_and_cleaned_up() {
        let uploader = FakeUploader {
            handle: Some("BAAC...xyz".to_string()),
            ..Default::default()
        };
        let h = harness(Default::default(), Default::default(), uploader, None).await;

        let handle = h.queue.obtain(source("abc123")).await;

        assert_eq!(handle.as_deref(), Some("BAAC...xyz"));
        assert_eq!(
            h.queue.check_cached("abc123").await.as_deref(),
            Some("BAAC...xyz")
        );
        let temp_path = h.dir.path().join("converted").join("abc123.mp4");
        assert_eq!(h.transcoder.outputs.lock().unwrap().as_slice(), &[temp_path.clone()]);
        assert!(!temp_path.exists());
        assert_eq!(h.uploader.uploaded.lock().unwrap().as_slice(), &["abc123.mp4".to_string()]);
    }

    #[tokio::test]
    async fn second_request_reuses_cached_handle() {
        let h = harness(Default::default(), Default::default(), Default::default(), None).await;

        let first = h.queue.obtain(source("abc")).await;
        let second = h.queue.obtain(source("abc")).await;

        assert_eq!(first, second);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_not_found_returns_none_and_writes_nothing() {
        let fetcher = FakeFetcher {
            missing: vec!["https://static.example/deadbeef.webm".to_string()],
            ..Default::default()
        };
        let h = harness(fetcher, Default::default(), Default::default(), None).await;

        let handle = h.queue.obtain(source("deadbeef")).await;

        assert_eq!(handle, None);
        assert_eq!(h.queue.check_cached("deadbeef").await, None);
        assert_eq!(h.db.count().await.unwrap(), 0);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        assert!(!h.dir.path().join("converted").join("deadbeef.mp4").exists());
    }

    #[tokio::test]
    async fn transcode_failure_removes_partial_file_and_allows_retry() {
        let transcoder = FakeTranscoder {
            fail: true,
            ..Default::default()
        };
        let h = harness(Default::default(), transcoder, Default::default(), None).await;

        assert_eq!(h.queue.obtain(source("bad")).await, None);
        assert!(!h.dir.path().join("converted").join("bad.mp4").exists());
        assert_eq!(h.db.count().await.unwrap(), 0);
        assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);

        assert_eq!(h.queue.obtain(source("bad")).await, None);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upload_failure_returns_none_and_cleans_up() {
        let uploader = FakeUploader {
            fail: true,
            ..Default::default()
        };
        let h = harness(Default::default(), Default::default(), uploader, None).await;

        assert_eq!(h.queue.obtain(source("up")).await, None);
        assert!(!h.dir.path().join("converted").join("up.mp4").exists());
        assert_eq!(h.queue.check_cached("up").await, None);
        assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requests_complete_in_arrival_order() {
        let fetcher = FakeFetcher {
            slow: vec!["https://static.example/first.webm".to_string()],
            ..Default::default()
        };
        let h = harness(fetcher, Default::default(), Default::default(), None).await;

        let mut first = h.queue.submit(source("first")).await;
        let second = h.queue.submit(source("second")).await;

        assert_eq!(second.await.unwrap(), "handle-second.mp4");
        assert_eq!(first.try_recv().unwrap(), "handle-first.mp4");
        assert_eq!(
            h.uploader.uploaded.lock().unwrap().as_slice(),
            &["first.mp4".to_string(), "second.mp4".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_requests_convert_once() {
        let h = harness(Default::default(), Default::default(), Default::default(), None).await;

        let a = h.queue.submit(source("same")).await;
        let b = h.queue.submit(source("same")).await;

        assert_eq!(a.await.unwrap(), b.await.unwrap());
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn timed_out_caller_gets_none_but_result_is_cached() {
        let fetcher = FakeFetcher {
            slow: vec!["https://static.example/slow.webm".to_string()],
            ..Default::default()
        };
        let h = harness(
            fetcher,
            Default::default(),
            Default::default(),
            Some(Duration::from_millis(50)),
        )
        .await;

        assert_eq!(h.queue.obtain(source("slow")).await, None);

        let later = h.queue.submit(source("slow")).await;
        let later = later.await.unwrap();
        assert_eq!(later, "handle-slow.mp4");
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn check_cached_never_triggers_work() {
        let h = harness(Default::default(), Default::default(), Default::default(), None).await;

        assert_eq!(h.queue.check_cached("unknown").await, None);
        assert_eq!(h.queue.pending_count(), 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_still_delivers_handle() {
        let pool = memory_pool().await;
        sqlx::query(
            "CREATE TRIGGER reject_insert BEFORE INSERT ON converted_media \
             BEGIN SELECT RAISE(ABORT, 'cache is read-only'); END;",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();
        let uploader = FakeUploader {
            handle: Some("BAACnew".to_string()),
            ..Default::default()
        };
        let h = harness_with_pool(pool, Default::default(), Default::default(), uploader, None).await;

        let handle = h.queue.obtain(source("abc123")).await;

        assert_eq!(handle.as_deref(), Some("BAACnew"));
        assert_eq!(h.db.count().await.unwrap(), 0);
        assert!(!h.dir.path().join("converted").join("abc123.mp4").exists());

        // The worker survives and keeps serving requests
        assert_eq!(h.queue.obtain(source("abc123")).await.as_deref(), Some("BAACnew"));
        assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_warm_ups_queue_one_conversion() {
        let gone = "https://static.example/gone.webm".to_string();
        let fetcher = FakeFetcher {
            missing: vec![gone.clone()],
            slow: vec![gone],
            ..Default::default()
        };
        let h = harness(fetcher, Default::default(), Default::default(), None).await;

        let mut queued = Vec::new();
        for _ in 0..20 {
            queued.push(h.queue.warm_up(source("gone")).await);
        }
        assert_eq!(queued.iter().filter(|q| **q).count(), 1);
        assert!(queued[0]);

        // Arrival order means the warm-up has finished once this returns
        let other = h.queue.submit(source("other")).await;
        assert_eq!(other.await.unwrap(), "handle-other.mp4");
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(h.queue.warming.lock().await.is_empty());

        // A finished warm-up may be retried
        assert!(h.queue.warm_up(source("gone")).await);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_requests_then_refuses_new_ones() {
        let fetcher = FakeFetcher {
            slow: vec!["https://static.example/last.webm".to_string()],
            ..Default::default()
        };
        let h = harness(fetcher, Default::default(), Default::default(), None).await;

        let mut last = h.queue.submit(source("last")).await;
        h.queue.shutdown().await;

        assert_eq!(last.try_recv().unwrap(), "handle-last.mp4");
        assert_eq!(h.db.count().await.unwrap(), 1);
        assert!(!h.dir.path().join("converted").join("last.mp4").exists());

        assert_eq!(h.queue.obtain(source("late")).await, None);
        assert_eq!(h.queue.pending_count(), 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);

        // A second call is a no-op
        h.queue.shutdown().await;
    }
}
