/// Periodic retention sweep over stored artifacts, finished jobs and leftover
/// scratch space
///
/// Runs once immediately, then every `interval`, until the shutdown flag flips.
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics;
use crate::services::jobs::JobStore;
use crate::services::storage::ArtifactStore;

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub interval: Duration,
    pub max_age: chrono::Duration,
    /// Scratch root whose stale `variation_*` directories are also removed
    pub scratch_dir: Option<PathBuf>,
}

/// One sweep pass; returns the number of evicted artifacts
pub async fn sweep_once(
    store: &dyn ArtifactStore,
    jobs: &JobStore,
    settings: &RetentionSettings,
) -> usize {
    let now = Utc::now();
    let evicted = match store.sweep_at(now, settings.max_age).await {
        Ok(evicted) => evicted.len(),
        Err(e) => {
            warn!(error = %e, "Artifact sweep failed, will retry next interval");
            0
        }
    };
    metrics::record_swept(evicted);

    // Results of older jobs point at artifacts this sweep has just evicted
    let cutoff = now - settings.max_age;
    let pruned = jobs.prune_finished_before(cutoff);
    if pruned > 0 {
        info!(pruned, "Pruned finished jobs");
    }

    if let Some(scratch) = &settings.scratch_dir {
        match sweep_scratch(scratch, cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed stale scratch directories"),
            Err(e) => warn!(error = %e, "Scratch sweep failed"),
        }
    }

    evicted
}

/// Remove scratch directories last modified before `cutoff`
async fn sweep_scratch(dir: &Path, cutoff: DateTime<Utc>) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let is_workdir = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with("variation_"))
            .unwrap_or(false);
        if !is_workdir {
            continue;
        }

        let modified = entry.metadata().await.and_then(|m| m.modified())?;
        if DateTime::<Utc>::from(modified) >= cutoff {
            continue;
        }

        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove scratch dir"),
        }
    }

    Ok(removed)
}

/// Start the background sweeper
pub fn spawn_retention_sweeper(
    store: Arc<dyn ArtifactStore>,
    jobs: Arc<JobStore>,
    settings: RetentionSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = settings.interval.as_secs(),
            max_age_secs = settings.max_age.num_seconds(),
            "Starting retention sweeper"
        );

        // Initial sweep on startup
        let evicted = sweep_once(store.as_ref(), &jobs, &settings).await;
        info!(evicted, "Initial retention sweep completed");

        let mut interval = tokio::time::interval(settings.interval);
        interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Retention sweeper shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    let evicted = sweep_once(store.as_ref(), &jobs, &settings).await;
                    if evicted > 0 {
                        info!(evicted, "Retention sweep completed");
                    }
                }
            }
        }
    })
}

/// Log and swallow a sweeper join failure at shutdown
pub async fn join_sweeper(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "Retention sweeper task failed");
    }
}
