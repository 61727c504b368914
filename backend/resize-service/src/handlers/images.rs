/// Image handlers - HTTP endpoints for resizing and retrieval
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::models::{ImageKey, ResizeRequest};
use crate::services::{Orchestrator, Retrieval};

#[derive(Debug, Deserialize)]
pub struct ResizeQuery {
    #[serde(rename = "async")]
    pub async_mode: Option<String>,
}

impl ResizeQuery {
    /// Only the literal `true` selects async processing
    fn is_async(&self) -> bool {
        self.async_mode.as_deref() == Some("true")
    }
}

/// Resize a batch of images, or queue them with `?async=true`
pub async fn resize(
    orchestrator: web::Data<Orchestrator>,
    query: web::Query<ResizeQuery>,
    payload: web::Json<ResizeRequest>,
) -> Result<HttpResponse> {
    let results = orchestrator
        .process_resizes(payload.into_inner(), query.is_async())
        .await?;

    Ok(HttpResponse::Ok().json(results))
}

/// Serve a resized image, waiting for it if it is still processing
pub async fn get_image(
    orchestrator: web::Data<Orchestrator>,
    image_id: web::Path<String>,
) -> Result<HttpResponse> {
    let image_id = image_id.into_inner();
    let key = ImageKey::parse(&image_id)
        .ok_or_else(|| AppError::NotFound(format!("image {image_id}")))?;

    match orchestrator.get_image(&key).await {
        Retrieval::Found(data) => Ok(HttpResponse::Ok().content_type("image/jpeg").body(data)),
        Retrieval::NotFound => Err(AppError::NotFound(format!("image {key}"))),
        Retrieval::TimedOut => {
            warn!(image_key = %key, "Timed out waiting for image");
            Err(AppError::NotFound(format!("image {key} is still processing")))
        }
    }
}
