/// Service layer for the variation job engine
///
/// - `storage`: artifact persistence and source holds
/// - `variation`: config synthesis, transform pipeline and scoring
/// - `jobs`: job records and the background job loop
/// - `retention`: periodic eviction of old artifacts
pub mod jobs;
pub mod retention;
pub mod storage;
pub mod variation;

pub use jobs::{JobEngine, JobStore};
pub use storage::{ArtifactHold, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
