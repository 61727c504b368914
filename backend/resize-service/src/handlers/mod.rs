/// HTTP handlers for resize-service
///
/// - Health: liveness ping
/// - Images: resize requests and retrieval of resized images
pub mod health;
pub mod images;

use actix_web::web;

use crate::error::AppError;

pub use health::ping;
pub use images::{get_image, resize};

/// Register every public route
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(ping))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(
            web::scope("/v1")
                .route("/resize", web::post().to(resize))
                .route("/image/{id}.jpg", web::get().to(get_image)),
        );
}

/// JSON extractor settings: body limit and 400 on malformed payloads
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

/// Query extractor settings: 400 on malformed query strings
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}
