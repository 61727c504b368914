use actix_web::HttpResponse;

/// Liveness probe
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("pong")
}
