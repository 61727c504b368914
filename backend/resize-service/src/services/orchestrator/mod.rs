//! Resize orchestrator
//!
//! Owns everything that coordinates work on image keys:
//! - the synchronous admission pool (`admission`)
//! - the deduplicating job queue and background worker (`worker`)
//! - the per-key status table with completion signalling (`status`)
//! - the ordered shutdown sequence
//!
//! Collaborators (cache, fetcher, resizer) are injected at construction.

mod admission;
pub mod status;
pub mod worker;

use crate::cache::ImageCache;
use crate::config::OrchestratorConfig;
use crate::error::{AppError, ProcessingError, ResizeError, Result};
use crate::models::{ImageKey, ResizeRequest, ResizeResult, ResizeStatus};
use crate::services::fetch::Fetcher;
use crate::services::resize::Resizer;
use bytes::Bytes;
use parking_lot::Mutex;
use status::{StatusTracker, WaitOutcome};
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use worker::{JobQueue, Task};

/// Outcome of an image retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    Found(Bytes),
    NotFound,
    /// The image was still processing when the wait deadline elapsed
    TimedOut,
}

/// State shared between request handlers, the worker and its units
struct Inner {
    base_url: String,
    config: OrchestratorConfig,
    cache: Arc<dyn ImageCache>,
    fetcher: Arc<dyn Fetcher>,
    resizer: Arc<dyn Resizer>,
    sync_pool: Arc<Semaphore>,
    async_pool: Arc<Semaphore>,
    status: StatusTracker,
    queue: JobQueue,
}

impl Inner {
    fn image_url(&self, key: &ImageKey) -> String {
        format!("{}/v1/image/{}.jpg", self.base_url, key)
    }

    /// Miss path shared by both modes: fetch, resize, store.
    ///
    /// `permit` is the pool slot of the calling unit. It is moved into the blocking
    /// resize and only released once that finishes, even if the unit timed out.
    async fn compute(
        &self,
        key: &ImageKey,
        url: &str,
        width: u32,
        height: u32,
        permit: OwnedSemaphorePermit,
    ) -> ResizeStatus {
        let deadline = self.config.task_timeout;
        let result = match tokio::time::timeout(
            deadline,
            self.fetch_and_resize(url, width, height, permit),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::TimedOut(deadline)),
        };

        match result {
            Ok(data) => {
                let size = data.len();
                if self.cache.add(key.as_str(), data) {
                    debug!(image_key = %key, "Cache evicted an older image");
                }
                debug!(image_key = %key, url = %url, size, "Image stored");
                ResizeStatus::Success
            }
            Err(e) => {
                warn!(image_key = %key, url = %url, error = %e, "Failed to fetch and resize image");
                ResizeStatus::Failure
            }
        }
    }

    async fn fetch_and_resize(
        &self,
        url: &str,
        width: u32,
        height: u32,
        permit: OwnedSemaphorePermit,
    ) -> std::result::Result<Bytes, ProcessingError> {
        let original = self.fetcher.fetch(url).await?;

        let resizer = self.resizer.clone();
        let resized = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            resizer.resize(&original, width, height)
        })
        .await
        .map_err(|e| ResizeError::Aborted(e.to_string()))??;
        Ok(resized)
    }
}

/// Coordinates resize requests, retrieval and lifecycle
pub struct Orchestrator {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build the orchestrator and start its background worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        base_url: impl Into<String>,
        config: OrchestratorConfig,
        cache: Arc<dyn ImageCache>,
        fetcher: Arc<dyn Fetcher>,
        resizer: Arc<dyn Resizer>,
    ) -> Self {
        let inner = Arc::new(Inner {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sync_pool: Arc::new(Semaphore::new(config.sync_max_concurrency)),
            async_pool: Arc::new(Semaphore::new(config.async_max_concurrency)),
            config,
            cache,
            fetcher,
            resizer,
            status: StatusTracker::new(),
            queue: JobQueue::default(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(worker::run(inner.clone(), shutdown_rx));

        info!(
            sync_max_concurrency = inner.config.sync_max_concurrency,
            async_max_concurrency = inner.config.async_max_concurrency,
            "Resize orchestrator initialized"
        );

        Self {
            inner,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Process a resize request synchronously, or queue it when `async_mode` is set
    pub async fn process_resizes(
        &self,
        request: ResizeRequest,
        async_mode: bool,
    ) -> Result<Vec<ResizeResult>> {
        if *self.shutdown_tx.borrow() {
            return Err(AppError::Internal("resize orchestrator is shut down".into()));
        }

        if async_mode {
            Ok(self.process_async(request))
        } else {
            Ok(self.inner.process_sync(request).await)
        }
    }

    /// Queue every URL and answer immediately with placeholders
    fn process_async(&self, request: ResizeRequest) -> Vec<ResizeResult> {
        let ResizeRequest { urls, width, height } = request;
        info!(urls = urls.len(), width, height, "Queueing asynchronous resizes");

        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let key = ImageKey::derive(&url, width, height);
            results.push(ResizeResult::processing(self.inner.image_url(&key)));
            crate::metrics::record_image_result("async", ResizeStatus::Processing.as_str());

            let task = Task {
                url,
                key: key.clone(),
                width,
                height,
            };
            if self.enqueue(task) {
                debug!(image_key = %key, "New job added to queue");
            } else {
                debug!(image_key = %key, "Image already in progress");
            }
        }
        results
    }

    /// Create the status entry and push the task in one critical section.
    /// Lock order: status table, then queue.
    fn enqueue(&self, task: Task) -> bool {
        let key = task.key.clone();
        let queued = self
            .inner
            .status
            .claim_with(&key, || self.inner.queue.push(task));
        if queued {
            self.inner.queue.wake_worker();
        }
        queued
    }

    /// Serve an image from the cache, waiting for it if it is still processing
    pub async fn get_image(&self, key: &ImageKey) -> Retrieval {
        let cache = &self.inner.cache;
        if let Some(data) = cache.get(key.as_str()) {
            return Retrieval::Found(data);
        }

        let Some(entry) = self.inner.status.entry(key) else {
            // the unit may have completed between the cache read and the lookup
            return match cache.get(key.as_str()) {
                Some(data) => Retrieval::Found(data),
                None => {
                    debug!(image_key = %key, "Image not found in cache or processing queue");
                    Retrieval::NotFound
                }
            };
        };

        if entry.state() == ResizeStatus::Failure {
            debug!(image_key = %key, "Image processing failed");
            return Retrieval::NotFound;
        }

        debug!(image_key = %key, "Image is processing, waiting to finish");
        match entry.wait(self.inner.config.wait_timeout).await {
            WaitOutcome::TimedOut => Retrieval::TimedOut,
            WaitOutcome::Completed(state) => match cache.get(key.as_str()) {
                Some(data) => Retrieval::Found(data),
                None => {
                    debug!(image_key = %key, state = state.as_str(), "Image not in cache after processing");
                    Retrieval::NotFound
                }
            },
        }
    }

    /// Public URL under which an image key is served
    pub fn image_url(&self, key: &ImageKey) -> String {
        self.inner.image_url(key)
    }

    /// Tasks waiting for the background worker
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Keys currently claimed by a sync unit or the async queue
    pub fn in_flight(&self) -> usize {
        self.inner.status.len()
    }

    /// Graceful shutdown, in order:
    /// 1. stop the worker from dequeuing new tasks
    /// 2. wait for every dispatched task to finish
    /// 3. dump what is left in the queue (queued tasks are abandoned)
    /// 4. return to the caller
    ///
    /// The caller must stop accepting requests before, and close the cache after.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        info!("Stopping background worker");
        // the worker may already be gone if it was aborted; nothing left to signal
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = worker.await {
            error!(error = %e, "Background worker terminated abnormally");
            return Err(AppError::Internal(format!("background worker failed: {e}")));
        }

        self.dump_queue();
        info!("Resize orchestrator shut down");
        Ok(())
    }

    fn dump_queue(&self) {
        let pending = self.inner.queue.pending();
        info!(pending = pending.len(), "Dumping queue");
        for task in &pending {
            debug!(image_key = %task.key, url = %task.url, "Abandoned queued task");
        }
        info!("Dumping queue done");
    }
}
