/// Variation synthesis, transform and scoring
///
/// - `synthesizer`: randomized parameter families
/// - `pipeline`: config → ordered stages → derived artifact
/// - `transcoder`: ffmpeg / passthrough backends
/// - `scorer`: bounded similarity heuristic
pub mod pipeline;
pub mod scorer;
pub mod synthesizer;
pub mod transcoder;

pub use pipeline::{PipelineOutput, TransformPipeline, TransformPlan, TransformStage};
pub use scorer::SimilarityScorer;
pub use synthesizer::ConfigSynthesizer;
pub use transcoder::{FfmpegTranscoder, PassthroughTranscoder, Transcoder};
