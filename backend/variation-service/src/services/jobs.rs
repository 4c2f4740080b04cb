/// Variation job lifecycle
///
/// Each job is driven by exactly one spawned task, which is the sole writer of
/// the job record. The record is published through a `watch` channel: status
/// requests read the latest snapshot and never block the writer.
///
/// State machine: `active → completed | failed`. Terminal jobs are read-only.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, PipelineError, Result};
use crate::metrics;
use crate::models::{Job, JobStatus, VariationResult};
use crate::services::storage::{ArtifactHold, ArtifactStore};
use crate::services::variation::{ConfigSynthesizer, SimilarityScorer, TransformPipeline};

/// In-memory job repository; constructed once at service start
pub struct JobStore {
    next_id: AtomicU64,
    jobs: DashMap<u64, watch::Receiver<Job>>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: DashMap::new(),
        }
    }

    /// Allocate a new active job and hand back its single writer
    pub fn create(&self, video_id: Uuid, variation_count: u32) -> JobPublisher {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(Job::new(id, video_id, variation_count));
        self.jobs.insert(id, rx);
        JobPublisher { id, tx }
    }

    pub fn snapshot(&self, id: u64) -> Option<Job> {
        self.jobs.get(&id).map(|rx| rx.borrow().clone())
    }

    /// Receiver that observes every published update of a job
    pub fn subscribe(&self, id: u64) -> Option<watch::Receiver<Job>> {
        self.jobs.get(&id).map(|rx| rx.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop terminal jobs that finished before `cutoff`. Active jobs are kept
    /// regardless of age. Returns the number of pruned jobs.
    pub fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        self.jobs.retain(|_, rx| {
            let job = rx.borrow();
            let expired = job.status.is_terminal()
                && job.completed_at.map_or(false, |finished| finished < cutoff);
            if expired {
                pruned += 1;
            }
            !expired
        });
        pruned
    }
}

/// Write side of one job record
pub struct JobPublisher {
    id: u64,
    tx: watch::Sender<Job>,
}

impl JobPublisher {
    pub fn job_id(&self) -> u64 {
        self.id
    }

    pub fn snapshot(&self) -> Job {
        self.tx.borrow().clone()
    }

    /// Append a finished variation and advance progress. The final variation
    /// completes the job in the same update, so `progress == 100` is only ever
    /// observed together with `completed`.
    pub fn record_variation(&self, result: VariationResult) {
        self.tx.send_modify(|job| {
            if job.status.is_terminal() {
                return;
            }

            let now = Utc::now();
            job.results.push(result);
            let done = job.results.len() as u32;

            if done >= job.variation_count {
                job.progress = 100;
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
            } else {
                job.progress = progress_for(done, job.variation_count)
                    .min(99)
                    .max(job.progress);
            }
            job.updated_at = now;
        });
    }

    /// Mark the job failed, keeping progress and partial results as they are
    pub fn fail(&self, message: String) {
        self.tx.send_modify(|job| {
            if job.status.is_terminal() {
                return;
            }
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.updated_at = now;
            job.completed_at = Some(now);
        });
    }
}

/// `round(done / total * 100)`
pub fn progress_for(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Creates jobs and drives them to completion in background tasks
#[derive(Clone)]
pub struct JobEngine {
    jobs: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    pipeline: TransformPipeline,
    synthesizer: ConfigSynthesizer,
    scorer: SimilarityScorer,
    max_variations: u32,
    rng_seed: Option<u64>,
}

impl JobEngine {
    pub fn new(
        jobs: Arc<JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        pipeline: TransformPipeline,
        max_variations: u32,
    ) -> Self {
        Self {
            jobs,
            artifacts,
            pipeline,
            synthesizer: ConfigSynthesizer::new(),
            scorer: SimilarityScorer::new(),
            max_variations,
            rng_seed: None,
        }
    }

    /// Pin the random source; each job derives its own stream from the seed
    pub fn with_rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Validate the request, allocate the job and start its background task.
    /// Must be called from within a tokio runtime.
    pub fn create_job(&self, source_id: Uuid, variation_count: i64) -> Result<u64> {
        if variation_count < 1 || variation_count > self.max_variations as i64 {
            return Err(AppError::InvalidRequest(format!(
                "variation_count must be between 1 and {}",
                self.max_variations
            )));
        }
        let variation_count = variation_count as u32;

        let hold = ArtifactHold::acquire(self.artifacts.clone(), source_id)
            .ok_or_else(|| AppError::NotFound(format!("video {source_id}")))?;

        let publisher = self.jobs.create(source_id, variation_count);
        let job_id = publisher.job_id();
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ job_id),
            None => StdRng::from_entropy(),
        };

        info!(job_id, video_id = %source_id, variation_count, "Variation job created");
        metrics::record_job_started();

        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(publisher, hold, rng).await;
        });

        Ok(job_id)
    }

    pub fn status(&self, job_id: u64) -> Option<Job> {
        self.jobs.snapshot(job_id)
    }

    async fn drive(self, publisher: JobPublisher, hold: ArtifactHold, mut rng: StdRng) {
        let job_id = publisher.job_id();
        let source_id = hold.id();

        let outcome = AssertUnwindSafe(self.run_variations(&publisher, source_id, &mut rng))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                info!(job_id, "Variation job completed");
                metrics::record_job_finished(JobStatus::Completed);
            }
            Ok(Err(err)) => {
                warn!(job_id, error = %err, "Variation job failed");
                publisher.fail(err.to_string());
                metrics::record_job_finished(JobStatus::Failed);
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(job_id, panic = %message, "Variation job panicked");
                publisher.fail(format!("internal error: {message}"));
                metrics::record_job_finished(JobStatus::Failed);
            }
        }

        drop(hold);
    }

    async fn run_variations(
        &self,
        publisher: &JobPublisher,
        source_id: Uuid,
        rng: &mut StdRng,
    ) -> std::result::Result<(), PipelineError> {
        let total = publisher.snapshot().variation_count;

        for index in 0..total {
            let config = self.synthesizer.synthesize(index, rng);
            let started = Instant::now();

            let output = match self.pipeline.apply(source_id, &config).await {
                Ok(output) => output,
                Err(err) => {
                    metrics::record_variation(false, started.elapsed());
                    return Err(err);
                }
            };
            metrics::record_variation(true, started.elapsed());

            let similarity = self.scorer.score(&config);
            let artifact = output.artifact;

            debug!(
                job_id = publisher.job_id(),
                variation = index,
                artifact_id = %artifact.id,
                similarity,
                effects = ?output.effects,
                "Variation produced"
            );

            publisher.record_variation(VariationResult {
                id: artifact.id,
                index,
                similarity,
                size_bytes: artifact.size_bytes,
                effects: output.effects,
                config,
                download_url: format!("/api/v1/variations/{}/download", artifact.id),
                completed_at: Utc::now(),
            });
        }

        Ok(())
    }
}
