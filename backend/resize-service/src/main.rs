/// Resize Service - HTTP Server
///
/// Serves synchronous and asynchronous image resizing and retrieval of results.
///
/// Shutdown order matters:
/// 1. stop the HTTP server so no new requests arrive
/// 2. stop the orchestrator and wait for in-flight background work
/// 3. close the cache, which in-flight work may still have been writing to
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use resize_service::cache::{ImageCache, LruImageCache};
use resize_service::handlers;
use resize_service::middleware::MetricsMiddleware;
use resize_service::services::{HttpFetcher, JpegResizer, Orchestrator};
use resize_service::Config;
use std::sync::Arc;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(env = %config.app.env, base_url = %config.app.base_url, "Configuration loaded");

    let cache = Arc::new(LruImageCache::new(config.cache.capacity));
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch).context("Failed to create HTTP fetcher")?);
    let resizer = Arc::new(JpegResizer::new(config.resize.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        config.app.base_url.clone(),
        config.orchestrator.clone(),
        cache.clone(),
        fetcher,
        resizer,
    ));

    let http_bind_address = format!("{}:{}", config.app.host, config.app.port);
    let orchestrator_data = web::Data::from(orchestrator.clone());
    let max_body_bytes = config.app.max_body_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(orchestrator_data.clone())
            .app_data(handlers::json_config(max_body_bytes))
            .app_data(handlers::query_config())
            .wrap(MetricsMiddleware)
            .wrap(actix_middleware::Logger::default())
            .configure(handlers::routes)
    })
    .disable_signals()
    .bind(&http_bind_address)
    .with_context(|| format!("Failed to bind {http_bind_address}"))?
    .run();

    info!(address = %http_bind_address, "HTTP server is running");
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    shutdown_signal().await;
    info!("Shutdown signal received");

    info!(service = "router", "Shutting down service");
    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    info!(service = "resizer", "Shutting down service");
    orchestrator
        .shutdown()
        .await
        .context("Failed to shut down orchestrator")?;

    info!(service = "cache", "Shutting down service");
    cache.shutdown().context("Failed to shut down cache")?;

    info!("Resize service shut down");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "resize_service=info,actix_web=info".into());

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
