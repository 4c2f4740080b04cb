/// Variation Service - HTTP Server
///
/// Accepts video uploads, runs variation jobs in the background and serves
/// the produced variations.
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use variation_service::handlers;
use variation_service::services::retention::{self, RetentionSettings};
use variation_service::services::storage::{ArtifactStore, FsArtifactStore};
use variation_service::services::variation::{
    FfmpegTranscoder, PassthroughTranscoder, Transcoder, TransformPipeline,
};
use variation_service::services::{JobEngine, JobStore};
use variation_service::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("variation_service=info,actix_web=info")
            }),
        )
        .init();

    // Load configuration from environment
    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Invalid configuration: {e}")))?;

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    info!(
        address = %bind_address,
        env = %config.app.env,
        storage = %config.storage.root.display(),
        "Variation Service starting"
    );

    let store: Arc<dyn ArtifactStore> = Arc::new(
        FsArtifactStore::new(config.storage.uploads_dir(), config.storage.processed_dir())
            .await
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to initialize artifact store: {e}"),
                )
            })?,
    );
    tokio::fs::create_dir_all(config.storage.scratch_dir()).await?;

    let transcoder: Arc<dyn Transcoder> = if config.transcoder.enable_mock {
        warn!("VARIATION_TRANSCODE_ENABLE_MOCK set; variations are copied unchanged");
        Arc::new(PassthroughTranscoder)
    } else {
        Arc::new(FfmpegTranscoder::new(config.transcoder.clone()))
    };

    let pipeline = TransformPipeline::new(store.clone(), transcoder, config.storage.scratch_dir());
    let jobs = Arc::new(JobStore::new());
    let engine = JobEngine::new(
        jobs.clone(),
        store.clone(),
        pipeline,
        config.jobs.max_variation_count,
    )
    .with_rng_seed(config.jobs.rng_seed);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = retention::spawn_retention_sweeper(
        store.clone(),
        jobs,
        RetentionSettings {
            interval: Duration::from_secs(config.storage.sweep_interval_secs.max(1)),
            max_age: config.storage.retention_max_age(),
            scratch_dir: Some(config.storage.scratch_dir()),
        },
        shutdown_rx,
    );

    let config_data = web::Data::new(config.clone());
    let engine_data = web::Data::new(engine);
    let store_data = web::Data::new(store);
    let allowed_origins = config.cors.allowed_origins.clone();

    // Create HTTP server
    let server = HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in &allowed_origins {
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(config_data.clone())
            .app_data(engine_data.clone())
            .app_data(store_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)?
    .run();

    info!("HTTP server is running");
    let result = server.await;

    // actix handles ctrl-c for the server; stop background work afterwards
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    retention::join_sweeper(sweeper).await;

    info!("Variation Service stopped");
    result
}
