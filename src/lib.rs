// Soundscope Core - real-time audio feature extraction and classification
// Signal graph fan-out, lock-free capture pipeline and live rendering

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod graph;
pub mod recording;
pub mod render;

// Re-exports for convenience
pub use analysis::classifier::{ClassificationMode, ContentLabel};
pub use analysis::features::{FeatureFrame, FrameExtractor};
pub use analysis::{AnalysisPipeline, ClassificationResult};
pub use config::AppConfig;
pub use engine::EngineHandle;
pub use error::{AudioError, ErrorCode, GraphError, RecordingError};
pub use filter::{FilterConfig, FilterStage, FilterType};
pub use graph::{AudioSource, GraphHandle, SignalGraph, Stage, StageRef};
pub use recording::{RecordingSession, RecordingState};
pub use render::RenderLoop;

/// Install the fmt subscriber for binaries
///
/// `log` records from library code are forwarded to the same subscriber.
/// Calling this more than once is harmless.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(false);
        init_logging(true);
        log::info!("logging initialised");
    }
}
