use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, TextEncoder};

use crate::models::JobStatus;

static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "variation_service_uploads_total",
            "Upload attempts handled by variation-service",
        ),
        &["outcome"],
    )
    .expect("failed to create variation_service_uploads_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register variation_service_uploads_total");
    counter
});

static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "variation_service_jobs_total",
            "Variation jobs by lifecycle event",
        ),
        &["status"],
    )
    .expect("failed to create variation_service_jobs_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register variation_service_jobs_total");
    counter
});

static VARIATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "variation_service_variations_total",
            "Individual variations rendered",
        ),
        &["outcome"],
    )
    .expect("failed to create variation_service_variations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register variation_service_variations_total");
    counter
});

static VARIATION_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "variation_service_variation_duration_seconds",
            "Wall time of one transform pipeline run",
        )
        .buckets(vec![0.05, 0.25, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 180.0, 600.0]),
    )
    .expect("failed to create variation_service_variation_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register variation_service_variation_duration_seconds");
    histogram
});

static SWEPT_ARTIFACTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "variation_service_swept_artifacts_total",
        "Artifacts evicted by the retention sweeper",
    )
    .expect("failed to create variation_service_swept_artifacts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register variation_service_swept_artifacts_total");
    counter
});

pub fn record_upload(outcome: &str) {
    UPLOADS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_job_started() {
    JOBS_TOTAL.with_label_values(&["created"]).inc();
}

pub fn record_job_finished(status: JobStatus) {
    JOBS_TOTAL.with_label_values(&[status.as_str()]).inc();
}

pub fn record_variation(success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    VARIATIONS_TOTAL.with_label_values(&[outcome]).inc();
    VARIATION_DURATION_SECONDS.observe(elapsed.as_secs_f64());
}

pub fn record_swept(count: usize) {
    SWEPT_ARTIFACTS_TOTAL.inc_by(count as u64);
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
