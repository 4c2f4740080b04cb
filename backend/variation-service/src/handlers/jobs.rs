/// Job handlers - start variation jobs and poll their status
use actix_web::{web, HttpResponse};

use crate::config::Config;
use crate::error::Result;
use crate::models::{CreateJobRequest, CreateJobResponse, JobNotFoundResponse};
use crate::services::JobEngine;

/// Start a variation job; returns immediately with the job id
pub async fn create_job(
    config: web::Data<Config>,
    engine: web::Data<JobEngine>,
    payload: web::Json<CreateJobRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    let count = request
        .variation_count
        .unwrap_or(config.jobs.default_variation_count as i64);

    let job_id = engine.create_job(request.video_id, count)?;
    Ok(HttpResponse::Accepted().json(CreateJobResponse { job_id }))
}

/// Latest job snapshot. Unknown ids are not an error for polling clients.
pub async fn get_job(engine: web::Data<JobEngine>, job_id: web::Path<String>) -> HttpResponse {
    match job_id.parse::<u64>().ok().and_then(|id| engine.status(id)) {
        Some(job) => HttpResponse::Ok().json(job),
        None => HttpResponse::Ok().json(JobNotFoundResponse::new()),
    }
}
