//! Synchronous path: one unit per URL, all units of all requests sharing a
//! single admission pool.

use super::status::{Completion, WaitOutcome};
use super::Inner;
use crate::metrics;
use crate::models::{ImageKey, ResizeRequest, ResizeResult, ResizeStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Inner {
    /// Results come back in input order; each URL fails or succeeds on its own.
    pub(super) async fn process_sync(self: &Arc<Self>, request: ResizeRequest) -> Vec<ResizeResult> {
        let ResizeRequest { urls, width, height } = request;
        info!(urls = urls.len(), width, height, "Processing synchronous resizes");

        // units are spawned so a dropped client connection cannot strand a claim
        let handles: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let inner = self.clone();
                tokio::spawn(async move { inner.process_url(url, width, height).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Resize unit panicked");
                    ResizeResult::failure()
                }
            };
            metrics::record_image_result("sync", result.result.as_str());
            results.push(result);
        }
        results
    }

    async fn process_url(&self, url: String, width: u32, height: u32) -> ResizeResult {
        let key = ImageKey::derive(&url, width, height);
        let image_url = self.image_url(&key);

        if self.cache.contains(key.as_str()) {
            debug!(image_key = %key, url = %url, "Image already in cache");
            return ResizeResult::success(image_url, true);
        }

        let completion = match self.status.claim(&key) {
            Some(completion) => completion,
            // an owner still sitting in the async queue has not started; run it here
            None => match self.queue.take(&key) {
                Some(_) => {
                    debug!(image_key = %key, url = %url, "Taking over queued task");
                    Completion::new(&self.status, key.clone())
                }
                None => return self.await_in_flight(&key, image_url).await,
            },
        };

        // another unit may have stored the image and released the key in between
        if self.cache.contains(key.as_str()) {
            completion.finish(ResizeStatus::Success);
            return ResizeResult::success(image_url, true);
        }

        let permit = match self.sync_pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "Sync admission pool closed");
                return ResizeResult::failure();
            }
        };

        debug!(image_key = %key, url = %url, "Image not in cache, fetching and resizing");
        let outcome = self.compute(&key, &url, width, height, permit).await;
        completion.finish(outcome);

        match outcome {
            ResizeStatus::Success => ResizeResult::success(image_url, false),
            _ => ResizeResult::failure(),
        }
    }

    /// Another unit owns the computation; reuse its result instead of repeating it
    async fn await_in_flight(&self, key: &ImageKey, image_url: String) -> ResizeResult {
        debug!(image_key = %key, "Image already being processed, waiting");

        if let Some(entry) = self.status.entry(key) {
            if entry.wait(self.config.wait_timeout).await == WaitOutcome::TimedOut {
                warn!(
                    image_key = %key,
                    timeout_ms = self.config.wait_timeout.as_millis() as u64,
                    "Timed out waiting for in-flight image"
                );
                return ResizeResult::failure();
            }
        }

        if self.cache.contains(key.as_str()) {
            ResizeResult::success(image_url, true)
        } else {
            ResizeResult::failure()
        }
    }
}
