//! Async job queue and its background drain loop
//!
//! The worker is a single dispatcher: it takes a token from the async pool,
//! pops the head task and spawns one unit for it. With no token or no task it
//! parks until an enqueue wakes it, the backoff elapses, or shutdown is signalled.
//! On shutdown it stops dequeuing and waits for every dispatched unit by
//! reclaiming the whole pool.

use super::status::Completion;
use super::Inner;
use crate::metrics;
use crate::models::{ImageKey, ResizeStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit};
use tracing::{debug, error, info};

/// Queued unit of async work
#[derive(Debug, Clone)]
pub struct Task {
    pub url: String,
    pub key: ImageKey,
    pub width: u32,
    pub height: u32,
}

/// FIFO of pending tasks plus the worker's wake-up signal
#[derive(Debug, Default)]
pub struct JobQueue {
    tasks: Mutex<VecDeque<Task>>,
    wake: Notify,
}

impl JobQueue {
    pub fn push(&self, task: Task) {
        let mut tasks = self.tasks.lock();
        tasks.push_back(task);
        metrics::set_queue_depth(tasks.len());
    }

    pub fn pop(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        let task = tasks.pop_front();
        metrics::set_queue_depth(tasks.len());
        task
    }

    /// Remove the queued task for `key`, if it has not been dispatched yet
    pub fn take(&self, key: &ImageKey) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        let position = tasks.iter().position(|task| &task.key == key)?;
        let task = tasks.remove(position);
        metrics::set_queue_depth(tasks.len());
        task
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of queued tasks, head first
    pub fn pending(&self) -> Vec<Task> {
        self.tasks.lock().iter().cloned().collect()
    }

    pub fn wake_worker(&self) {
        self.wake.notify_one();
    }
}

/// Drain loop; runs until `shutdown_rx` flips to true or its sender is dropped
pub(super) async fn run(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        max_concurrency = inner.config.async_max_concurrency,
        "Background worker started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // only dequeue once a token is held; an unused token goes straight back
        let task = inner
            .async_pool
            .clone()
            .try_acquire_owned()
            .ok()
            .and_then(|permit| inner.queue.pop().map(|task| (task, permit)));

        let Some((task, permit)) = task else {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = inner.queue.wake.notified() => {}
                _ = tokio::time::sleep(inner.config.worker_backoff) => {}
            }
            continue;
        };

        debug!(image_key = %task.key, url = %task.url, "Dispatching background task");
        let unit = inner.clone();
        tokio::spawn(async move { unit.run_task(task, permit).await });
    }

    info!("Background worker stopped dequeuing, waiting for in-flight tasks");
    let capacity = u32::try_from(inner.config.async_max_concurrency).unwrap_or(u32::MAX);
    if let Err(e) = inner.async_pool.acquire_many(capacity).await {
        error!(error = %e, "Async pool closed while draining in-flight tasks");
    }
    info!("Background worker finished");
}

impl Inner {
    /// The permit travels with the unit into any blocking resize it starts
    async fn run_task(&self, task: Task, permit: OwnedSemaphorePermit) {
        metrics::inc_background_in_flight();
        let completion = Completion::new(&self.status, task.key.clone());

        let outcome = if self.cache.contains(task.key.as_str()) {
            debug!(image_key = %task.key, "Image already in cache");
            ResizeStatus::Success
        } else {
            self.compute(&task.key, &task.url, task.width, task.height, permit)
                .await
        };

        completion.finish(outcome);
        metrics::dec_background_in_flight();
        metrics::record_image_result("async", outcome.as_str());
        info!(
            image_key = %task.key,
            url = %task.url,
            width = task.width,
            height = task.height,
            result = outcome.as_str(),
            "Background task done"
        );
    }
}
