/// HTTP handlers for the variation service
///
/// - Uploads: accept source videos
/// - Jobs: start variation jobs, poll progress
/// - Downloads: serve produced variations
pub mod downloads;
pub mod jobs;
pub mod uploads;

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::metrics;

pub use downloads::download_variation;
pub use jobs::{create_job, get_job};
pub use uploads::upload_video;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Malformed JSON bodies get the same error body as every other 4xx
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::InvalidRequest(err.to_string()).into())
}

/// Register every route. Expects `Config`, `JobEngine` and
/// `Arc<dyn ArtifactStore>` as app data.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health))
                .route("/uploads", web::post().to(upload_video))
                .service(
                    web::scope("/jobs")
                        .route("", web::post().to(create_job))
                        .route("/{job_id}", web::get().to(get_job)),
                )
                .route(
                    "/variations/{id}/download",
                    web::get().to(download_variation),
                ),
        );
}
