use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "resize_service_http_requests_total",
            "Total HTTP requests handled by resize-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create resize_service_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register resize_service_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "resize_service_http_request_duration_seconds",
            "HTTP request latency for resize-service",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "path", "status"],
    )
    .expect("failed to create resize_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register resize_service_http_request_duration_seconds");
    histogram
});

static IMAGE_RESULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "resize_service_image_results_total",
            "Per-image results by processing mode and outcome",
        ),
        &["mode", "result"],
    )
    .expect("failed to create resize_service_image_results_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register resize_service_image_results_total");
    counter
});

static CACHE_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "resize_service_cache_lookups_total",
            "Image cache reads by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create resize_service_cache_lookups_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register resize_service_cache_lookups_total");
    counter
});

static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "resize_service_queue_depth",
        "Async tasks waiting for the background worker",
    )
    .expect("failed to create resize_service_queue_depth");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register resize_service_queue_depth");
    gauge
});

static BACKGROUND_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "resize_service_background_in_flight",
        "Background units currently fetching or resizing",
    )
    .expect("failed to create resize_service_background_in_flight");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register resize_service_background_in_flight");
    gauge
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn record_image_result(mode: &str, result: &str) {
    IMAGE_RESULTS_TOTAL.with_label_values(&[mode, result]).inc();
}

pub fn record_cache_hit() {
    CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_LOOKUPS_TOTAL.with_label_values(&["miss"]).inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as i64);
}

pub fn inc_background_in_flight() {
    BACKGROUND_IN_FLIGHT.inc();
}

pub fn dec_background_in_flight() {
    BACKGROUND_IN_FLIGHT.dec();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
