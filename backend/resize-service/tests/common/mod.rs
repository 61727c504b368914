#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use parking_lot::Mutex;
use resize_service::cache::LruImageCache;
use resize_service::config::OrchestratorConfig;
use resize_service::error::{FetchError, ResizeError};
use resize_service::services::{Fetcher, Orchestrator, Resizer};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const BASE_URL: &str = "http://localhost:8080";

/// Fetcher double that records calls and peak concurrency.
///
/// Optionally holds fetches behind a gate (all URLs, or only those passed to
/// `gating`), sleeps, or fails a URL a given number of times before succeeding.
#[derive(Default)]
pub struct FakeFetcher {
    calls: AtomicUsize,
    calls_by_url: Mutex<HashMap<String, usize>>,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    gate: Option<watch::Receiver<bool>>,
    gated_urls: Vec<String>,
    failures: Mutex<HashMap<String, usize>>,
    payload: Option<Bytes>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gate(mut self, gate: watch::Receiver<bool>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Restrict the gate to `url`; may be called repeatedly
    pub fn gating(mut self, url: &str) -> Self {
        self.gated_urls.push(url.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn failing(self, url: &str, times: usize) -> Self {
        self.failures.lock().insert(url.to_string(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls_by_url.lock().get(url).copied().unwrap_or(0)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn is_gated(&self, url: &str) -> bool {
        self.gated_urls.is_empty() || self.gated_urls.iter().any(|gated| gated == url)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_url.lock().entry(url.to_string()).or_default() += 1;
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = self.gate.as_ref().filter(|_| self.is_gated(url)) {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        let should_fail = match self.failures.lock().get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if should_fail {
            return Err(FetchError::Status(502));
        }

        Ok(self
            .payload
            .clone()
            .unwrap_or_else(|| Bytes::from(format!("image:{url}"))))
    }
}

/// Resizer double that returns its input unchanged, optionally after blocking
/// the calling thread for a while
#[derive(Default)]
pub struct EchoResizer {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl EchoResizer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Resizer for EchoResizer {
    fn resize(&self, data: &[u8], _width: u32, _height: u32) -> Result<Bytes, ResizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Bytes::copy_from_slice(data))
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub cache: Arc<LruImageCache>,
    pub fetcher: Arc<FakeFetcher>,
    pub resizer: Arc<EchoResizer>,
}

pub fn harness(config: OrchestratorConfig, fetcher: FakeFetcher) -> Harness {
    harness_with_resizer(config, fetcher, EchoResizer::default())
}

pub fn harness_with_resizer(
    config: OrchestratorConfig,
    fetcher: FakeFetcher,
    resizer: EchoResizer,
) -> Harness {
    let cache = Arc::new(LruImageCache::new(64));
    let fetcher = Arc::new(fetcher);
    let resizer = Arc::new(resizer);
    let orchestrator = Arc::new(Orchestrator::new(
        BASE_URL,
        config,
        cache.clone(),
        fetcher.clone(),
        resizer.clone(),
    ));

    Harness {
        orchestrator,
        cache,
        fetcher,
        resizer,
    }
}

/// Closed gate; open it with `send_replace(true)`
pub fn gate() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn jpeg_fixture(width: u32, height: u32) -> Bytes {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 255) as u8, (y % 255) as u8, 64])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90))
        .expect("encode fixture");
    Bytes::from(buf)
}
