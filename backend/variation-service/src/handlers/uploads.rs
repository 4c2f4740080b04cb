/// Upload handler - accepts a single video file as multipart form data
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{ArtifactOrigin, UploadResponse};
use crate::services::storage::ArtifactStore;

/// Store the first file part of the form as a new source artifact.
///
/// The part's declared content type must be `video/*`. The size limit is
/// enforced while streaming, so oversized bodies are never fully buffered.
pub async fn upload_video(
    config: web::Data<Config>,
    store: web::Data<Arc<dyn ArtifactStore>>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let limit = config.storage.max_upload_bytes;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidRequest(format!("malformed multipart body: {e}")))?;

        // Plain form fields carry no content type
        let Some(mime) = field.content_type().cloned() else {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::InvalidRequest(e.to_string()))?;
            }
            continue;
        };

        if mime.type_() != mime::VIDEO {
            metrics::record_upload("unsupported_media");
            return Err(AppError::UnsupportedMedia(mime.essence_str().to_string()));
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidRequest(e.to_string()))?;
            if (buffer.len() + chunk.len()) as u64 > limit {
                warn!(limit, "Upload rejected: payload too large");
                metrics::record_upload("too_large");
                return Err(AppError::PayloadTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }

        let artifact = store.put(buffer.freeze(), ArtifactOrigin::Uploaded).await?;
        info!(
            artifact_id = %artifact.id,
            size = artifact.size_bytes,
            mime = %mime,
            "Video uploaded"
        );
        metrics::record_upload("accepted");

        return Ok(HttpResponse::Created().json(UploadResponse::from(artifact)));
    }

    metrics::record_upload("missing_file");
    Err(AppError::InvalidRequest("no file part in upload".to_string()))
}
