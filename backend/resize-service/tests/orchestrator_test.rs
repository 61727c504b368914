mod common;

use bytes::Bytes;
use common::{gate, harness, harness_with_resizer, wait_until, EchoResizer, FakeFetcher, BASE_URL};
use futures::future::join_all;
use resize_service::cache::ImageCache;
use resize_service::config::OrchestratorConfig;
use resize_service::models::{ImageKey, ResizeRequest, ResizeResult, ResizeStatus};
use resize_service::services::Retrieval;
use std::time::Duration;

fn request(urls: &[&str], width: u32, height: u32) -> ResizeRequest {
    ResizeRequest {
        urls: urls.iter().map(|u| u.to_string()).collect(),
        width,
        height,
    }
}

fn image_url(url: &str, width: u32, height: u32) -> String {
    format!("{BASE_URL}/v1/image/{}.jpg", ImageKey::derive(url, width, height))
}

#[tokio::test]
async fn test_sync_miss_then_hit() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());
    let req = request(&["http://img.test/a.jpg"], 100, 100);

    let first = h.orchestrator.process_resizes(req.clone(), false).await.unwrap();
    assert_eq!(
        first,
        vec![ResizeResult::success(image_url("http://img.test/a.jpg", 100, 100), false)]
    );

    let second = h.orchestrator.process_resizes(req, false).await.unwrap();
    assert_eq!(
        second,
        vec![ResizeResult::success(image_url("http://img.test/a.jpg", 100, 100), true)]
    );

    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.resizer.calls(), 1);
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test]
async fn test_cached_image_skips_fetch_and_resize() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());
    let key = ImageKey::derive("http://img.test/a.jpg", 10, 10);
    h.cache.add(key.as_str(), Bytes::from_static(b"resized"));

    let results = h
        .orchestrator
        .process_resizes(request(&["http://img.test/a.jpg"], 10, 10), false)
        .await
        .unwrap();

    assert_eq!(results[0].result, ResizeStatus::Success);
    assert!(results[0].cached);
    assert_eq!(h.fetcher.calls(), 0);
    assert_eq!(h.resizer.calls(), 0);
}

#[tokio::test]
async fn test_sync_results_keep_input_order_and_isolate_failures() {
    let fetcher = FakeFetcher::new().failing("http://img.test/broken.jpg", usize::MAX);
    let h = harness(OrchestratorConfig::default(), fetcher);

    let urls = [
        "http://img.test/a.jpg",
        "http://img.test/broken.jpg",
        "http://img.test/c.jpg",
    ];
    let results = h
        .orchestrator
        .process_resizes(request(&urls, 50, 0), false)
        .await
        .unwrap();

    assert_eq!(
        results,
        vec![
            ResizeResult::success(image_url(urls[0], 50, 0), false),
            ResizeResult::failure(),
            ResizeResult::success(image_url(urls[2], 50, 0), false),
        ]
    );
    assert_eq!(h.cache.len(), 2);
}

#[tokio::test]
async fn test_empty_request_returns_empty_results() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());

    let sync = h.orchestrator.process_resizes(request(&[], 1, 1), false).await.unwrap();
    let queued = h.orchestrator.process_resizes(request(&[], 1, 1), true).await.unwrap();

    assert!(sync.is_empty());
    assert!(queued.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_pool_bounds_concurrency() {
    let config = OrchestratorConfig {
        sync_max_concurrency: 3,
        ..Default::default()
    };
    let fetcher = FakeFetcher::new().with_delay(Duration::from_millis(30));
    let h = harness(config, fetcher);

    let urls: Vec<String> = (0..10).map(|i| format!("http://img.test/{i}.jpg")).collect();
    let results = h
        .orchestrator
        .process_resizes(
            ResizeRequest {
                urls: urls.clone(),
                width: 20,
                height: 20,
            },
            false,
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 10);
    for (url, result) in urls.iter().zip(&results) {
        assert_eq!(result, &ResizeResult::success(image_url(url, 20, 20), false));
    }
    assert_eq!(h.fetcher.calls(), 10);
    assert!(h.fetcher.peak() <= 3, "peak was {}", h.fetcher.peak());
    assert!(h.fetcher.peak() >= 2, "peak was {}", h.fetcher.peak());
}

#[tokio::test]
async fn test_async_returns_placeholders() {
    let (_open, closed) = gate();
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new().with_gate(closed));

    let results = h
        .orchestrator
        .process_resizes(request(&["http://img.test/a.jpg", "http://img.test/b.jpg"], 5, 5), true)
        .await
        .unwrap();

    assert_eq!(
        results,
        vec![
            ResizeResult::processing(image_url("http://img.test/a.jpg", 5, 5)),
            ResizeResult::processing(image_url("http://img.test/b.jpg", 5, 5)),
        ]
    );
    assert_eq!(h.orchestrator.in_flight(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_deduplicates_concurrent_requests() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());
    let req = request(&["http://img.test/same.jpg"], 64, 64);

    let requests = (0..20).map(|_| {
        let orchestrator = h.orchestrator.clone();
        let req = req.clone();
        tokio::spawn(async move { orchestrator.process_resizes(req, true).await })
    });
    for response in join_all(requests).await {
        let results = response.unwrap().unwrap();
        assert_eq!(results[0].result, ResizeStatus::Processing);
    }

    let key = ImageKey::derive("http://img.test/same.jpg", 64, 64);
    let retrieved = h.orchestrator.get_image(&key).await;

    assert!(matches!(retrieved, Retrieval::Found(_)));
    assert!(wait_until(|| h.orchestrator.in_flight() == 0, Duration::from_secs(2)).await);
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_get_image_unknown_key_is_not_found() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());
    let key = ImageKey::derive("http://img.test/never.jpg", 1, 1);

    assert_eq!(h.orchestrator.get_image(&key).await, Retrieval::NotFound);
}

#[tokio::test]
async fn test_get_image_waits_for_processing_image() {
    let (open, closed) = gate();
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new().with_gate(closed));
    h.orchestrator
        .process_resizes(request(&["http://img.test/slow.jpg"], 8, 8), true)
        .await
        .unwrap();
    assert!(wait_until(|| h.fetcher.calls() == 1, Duration::from_secs(2)).await);

    let key = ImageKey::derive("http://img.test/slow.jpg", 8, 8);
    let orchestrator = h.orchestrator.clone();
    let waiter = tokio::spawn(async move { orchestrator.get_image(&key).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    open.send_replace(true);
    let retrieved = waiter.await.unwrap();
    assert_eq!(
        retrieved,
        Retrieval::Found(Bytes::from("image:http://img.test/slow.jpg"))
    );
}

#[tokio::test]
async fn test_get_image_times_out_while_processing() {
    let config = OrchestratorConfig {
        wait_timeout: Duration::from_millis(50),
        task_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let (_open, closed) = gate();
    let h = harness(config, FakeFetcher::new().with_gate(closed));
    h.orchestrator
        .process_resizes(request(&["http://img.test/stuck.jpg"], 8, 8), true)
        .await
        .unwrap();

    let key = ImageKey::derive("http://img.test/stuck.jpg", 8, 8);
    assert_eq!(h.orchestrator.get_image(&key).await, Retrieval::TimedOut);

    // the unit gives up at the task timeout and the key is released
    assert!(wait_until(|| h.orchestrator.in_flight() == 0, Duration::from_secs(2)).await);
    assert_eq!(h.orchestrator.get_image(&key).await, Retrieval::NotFound);
}

#[tokio::test]
async fn test_failed_key_can_be_retried() {
    let fetcher = FakeFetcher::new().failing("http://img.test/flaky.jpg", 1);
    let h = harness(OrchestratorConfig::default(), fetcher);
    let req = request(&["http://img.test/flaky.jpg"], 30, 30);
    let key = ImageKey::derive("http://img.test/flaky.jpg", 30, 30);

    h.orchestrator.process_resizes(req.clone(), true).await.unwrap();
    assert!(wait_until(|| h.orchestrator.in_flight() == 0, Duration::from_secs(2)).await);
    assert_eq!(h.orchestrator.get_image(&key).await, Retrieval::NotFound);

    h.orchestrator.process_resizes(req, true).await.unwrap();
    assert!(matches!(h.orchestrator.get_image(&key).await, Retrieval::Found(_)));
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_sync_request_reuses_in_flight_async_work() {
    let (open, closed) = gate();
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new().with_gate(closed));
    let req = request(&["http://img.test/shared.jpg"], 12, 12);

    h.orchestrator.process_resizes(req.clone(), true).await.unwrap();
    assert!(wait_until(|| h.fetcher.calls() == 1, Duration::from_secs(2)).await);

    let orchestrator = h.orchestrator.clone();
    let sync = tokio::spawn(async move { orchestrator.process_resizes(req, false).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    open.send_replace(true);

    let results = sync.await.unwrap().unwrap();
    assert_eq!(
        results,
        vec![ResizeResult::success(image_url("http://img.test/shared.jpg", 12, 12), true)]
    );
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_sync_request_takes_over_undispatched_async_task() {
    let config = OrchestratorConfig {
        async_max_concurrency: 1,
        wait_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let blocker = "http://img.test/blocker.jpg";
    let target = "http://img.test/t.jpg";
    let (open, closed) = gate();
    let h = harness(config, FakeFetcher::new().with_gate(closed).gating(blocker));

    // the only async slot is held by the blocker, so the target stays queued
    h.orchestrator.process_resizes(request(&[blocker], 9, 9), true).await.unwrap();
    assert!(wait_until(|| h.fetcher.calls_for(blocker) == 1, Duration::from_secs(2)).await);
    h.orchestrator.process_resizes(request(&[target], 9, 9), true).await.unwrap();
    assert_eq!(h.orchestrator.queue_len(), 1);

    let results = h
        .orchestrator
        .process_resizes(request(&[target], 9, 9), false)
        .await
        .unwrap();

    assert_eq!(results, vec![ResizeResult::success(image_url(target, 9, 9), false)]);
    assert_eq!(h.fetcher.calls_for(target), 1);
    assert_eq!(h.orchestrator.queue_len(), 0);
    let key = ImageKey::derive(target, 9, 9);
    assert!(matches!(h.orchestrator.get_image(&key).await, Retrieval::Found(_)));

    open.send_replace(true);
    h.orchestrator.shutdown().await.unwrap();
    assert_eq!(h.fetcher.calls_for(target), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timed_out_resize_keeps_its_pool_slot() {
    let config = OrchestratorConfig {
        async_max_concurrency: 1,
        task_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let h = harness_with_resizer(
        config,
        FakeFetcher::new(),
        EchoResizer::with_delay(Duration::from_millis(400)),
    );

    let urls = ["http://img.test/1.jpg", "http://img.test/2.jpg", "http://img.test/3.jpg"];
    let results = h
        .orchestrator
        .process_resizes(request(&urls, 4, 4), true)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let all_timed_out = wait_until(
        || h.resizer.calls() == 3 && h.orchestrator.in_flight() == 0,
        Duration::from_secs(5),
    )
    .await;
    assert!(all_timed_out);
    assert_eq!(h.resizer.peak(), 1);
    assert!(h.cache.is_empty());

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_tasks() {
    let config = OrchestratorConfig {
        async_max_concurrency: 3,
        ..Default::default()
    };
    let (open, closed) = gate();
    let h = harness(config, FakeFetcher::new().with_gate(closed));

    let urls: Vec<String> = (0..8).map(|i| format!("http://img.test/{i}.jpg")).collect();
    h.orchestrator
        .process_resizes(
            ResizeRequest {
                urls,
                width: 16,
                height: 16,
            },
            true,
        )
        .await
        .unwrap();
    assert!(wait_until(|| h.fetcher.calls() == 3, Duration::from_secs(2)).await);

    let orchestrator = h.orchestrator.clone();
    let shutdown = tokio::spawn(async move { orchestrator.shutdown().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished());

    open.send_replace(true);
    let outcome = tokio::time::timeout(Duration::from_secs(2), shutdown)
        .await
        .expect("shutdown finished")
        .unwrap();

    assert!(outcome.is_ok());
    assert_eq!(h.cache.len(), 3);
    assert_eq!(h.fetcher.calls(), 3);
    assert_eq!(h.orchestrator.queue_len(), 5);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_rejects_new_work() {
    let h = harness(OrchestratorConfig::default(), FakeFetcher::new());

    h.orchestrator.shutdown().await.unwrap();
    h.orchestrator.shutdown().await.unwrap();

    let rejected = h
        .orchestrator
        .process_resizes(request(&["http://img.test/late.jpg"], 1, 1), false)
        .await;
    assert!(rejected.is_err());
    assert_eq!(h.fetcher.calls(), 0);
}
