// AnalysisStage - runs the analysis pipeline as a signal graph stage
//
// Frames and classification results are published on tokio broadcast
// channels (lagging receivers drop old events, they never block the audio
// thread). The latest frame and result are also kept for polling callers
// such as the coefficient bar renderer.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::classifier::ClassificationMode;
use super::features::FeatureFrame;
use super::{AnalysisEvent, AnalysisPipeline, ClassificationResult};
use crate::config::AppConfig;
use crate::graph::Stage;

#[derive(Debug, Default)]
struct Latest {
    frame: Option<FeatureFrame>,
    result: Option<ClassificationResult>,
}

/// Polling view of the most recent analysis output
#[derive(Debug, Clone, Default)]
pub struct AnalysisTap {
    latest: Arc<Mutex<Latest>>,
}

impl AnalysisTap {
    pub fn latest_frame(&self) -> Option<FeatureFrame> {
        self.latest.lock().ok().and_then(|l| l.frame)
    }

    pub fn latest_result(&self) -> Option<ClassificationResult> {
        self.latest.lock().ok().and_then(|l| l.result)
    }
}

/// Graph stage wrapping an [`AnalysisPipeline`]
pub struct AnalysisStage {
    pipeline: AnalysisPipeline,
    frame_tx: Option<broadcast::Sender<FeatureFrame>>,
    result_tx: Option<broadcast::Sender<ClassificationResult>>,
    tap: AnalysisTap,
}

impl AnalysisStage {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            pipeline: AnalysisPipeline::new(config),
            frame_tx: None,
            result_tx: None,
            tap: AnalysisTap::default(),
        }
    }

    /// Publish every frame on `tx`
    pub fn with_frame_sender(mut self, tx: broadcast::Sender<FeatureFrame>) -> Self {
        self.frame_tx = Some(tx);
        self
    }

    /// Publish every classification on `tx`
    pub fn with_result_sender(mut self, tx: broadcast::Sender<ClassificationResult>) -> Self {
        self.result_tx = Some(tx);
        self
    }

    pub fn tap(&self) -> AnalysisTap {
        self.tap.clone()
    }

    pub fn set_mode(&mut self, mode: ClassificationMode) {
        self.pipeline.set_mode(mode);
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }
}

impl Stage for AnalysisStage {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn process(&mut self, block: &[f32]) {
        let frame_tx = self.frame_tx.as_ref();
        let result_tx = self.result_tx.as_ref();
        let mut last_frame = None;
        let mut last_result = None;

        self.pipeline.process(block, |event| match event {
            AnalysisEvent::Frame(frame) => {
                if let Some(tx) = frame_tx {
                    // No receivers is fine
                    let _ = tx.send(frame);
                }
                last_frame = Some(frame);
            }
            AnalysisEvent::Classification(result) => {
                tracing::debug!(
                    "[AnalysisStage] {} ({:.2}) at frame {}",
                    result.label,
                    result.confidence,
                    result.timestamp
                );
                if let Some(tx) = result_tx {
                    let _ = tx.send(result);
                }
                last_result = Some(result);
            }
        });

        if last_frame.is_none() && last_result.is_none() {
            return;
        }
        // Skip the update rather than wait on a reader
        if let Ok(mut latest) = self.tap.latest.try_lock() {
            if last_frame.is_some() {
                latest.frame = last_frame;
            }
            if last_result.is_some() {
                latest.result = last_result;
            }
        }
    }

    fn on_detach(&mut self) {
        self.pipeline.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classifier::ContentLabel;

    #[test]
    fn test_stage_publishes_frames_and_results() {
        let (frame_tx, mut frame_rx) = broadcast::channel(64);
        let (result_tx, mut result_rx) = broadcast::channel(8);
        let mut stage = AnalysisStage::new(&AppConfig::default())
            .with_frame_sender(frame_tx)
            .with_result_sender(result_tx);
        let tap = stage.tap();

        for _ in 0..21 {
            stage.process(&[0.0; 256]);
        }

        let first = frame_rx.try_recv().unwrap();
        assert_eq!(first.timestamp, 0);
        let result = result_rx.try_recv().unwrap();
        assert_eq!(result.label, ContentLabel::Silence);
        assert_eq!(tap.latest_result(), Some(result));
        assert_eq!(tap.latest_frame().map(|f| f.timestamp), Some(19));
    }

    #[test]
    fn test_stage_without_receivers_keeps_running() {
        let (frame_tx, frame_rx) = broadcast::channel(4);
        drop(frame_rx);
        let mut stage = AnalysisStage::new(&AppConfig::default()).with_frame_sender(frame_tx);
        for _ in 0..40 {
            stage.process(&[0.0; 256]);
        }
        assert!(stage.pipeline().latest().is_some());
    }
}
