/// Download handler for produced variations
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::ArtifactOrigin;
use crate::services::storage::ArtifactStore;

pub async fn download_variation(
    store: web::Data<Arc<dyn ArtifactStore>>,
    variation_id: web::Path<String>,
) -> Result<HttpResponse> {
    let not_found = || AppError::NotFound(format!("variation {variation_id}"));

    let id = Uuid::parse_str(&variation_id).map_err(|_| not_found())?;
    match store.metadata(id) {
        Some(artifact) if artifact.origin == ArtifactOrigin::Derived => {}
        _ => return Err(not_found()),
    }
    let data = store.get(id).await?;

    Ok(HttpResponse::Ok()
        .content_type("video/mp4")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"variation_{id}.mp4\""),
        ))
        .body(data))
}
