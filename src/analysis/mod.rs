// Analysis module - DSP pipeline for feature extraction and classification
//
// This module wires the per-frame feature extractor, the sliding-window
// aggregator and the classifier into one synchronous pipeline that runs on
// the audio processing thread, one engine block at a time.
//
// Architecture:
// - AnalysisPipeline: FrameExtractor → FeatureAggregator → Classifier
// - AnalysisStage: graph stage that runs the pipeline and publishes events
// - Output: FeatureFrame / ClassificationResult via tokio broadcast channels

pub mod aggregator;
pub mod classifier;
pub mod features;
pub mod stage;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use aggregator::{FeatureAggregator, WindowStats};
use classifier::{ClassificationMode, Classifier, Classify, ContentLabel};
use features::{FeatureFrame, FrameExtractor};

pub use stage::{AnalysisStage, AnalysisTap};

/// Labeled, confidence-scored result for one window (or one frame in vote mode)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: ContentLabel,
    /// Classification confidence score (0.0-1.0)
    pub confidence: f32,
    /// The aggregated statistics that produced this result
    pub source_stats: WindowStats,
    /// Strategy that produced the label
    pub strategy: ClassificationMode,
    /// Timestamp (frame index) of the newest frame in the window
    pub timestamp: u64,
}

/// Output of the pipeline for one engine block
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalysisEvent {
    Frame(FeatureFrame),
    Classification(ClassificationResult),
}

/// Extractor, aggregator and classifier run in sequence
///
/// Frames are consumed by the aggregator in the order they are produced,
/// so every classification is computed from a contiguous window. Only the
/// latest result is kept; older ones are superseded.
pub struct AnalysisPipeline {
    extractor: FrameExtractor,
    aggregator: FeatureAggregator,
    classifier: Classifier,
    latest: Option<ClassificationResult>,
}

impl AnalysisPipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            extractor: FrameExtractor::new(&config.extractor),
            aggregator: FeatureAggregator::new(&config.aggregator),
            classifier: Classifier::new(config.classifier.mode),
            latest: None,
        }
    }

    /// Feed one block; `on_event` is called for every frame and result in
    /// order
    ///
    /// Rules mode emits a classification each time the aggregation window
    /// triggers. Vote mode classifies every frame.
    pub fn process<F>(&mut self, block: &[f32], mut on_event: F)
    where
        F: FnMut(AnalysisEvent),
    {
        self.extractor.push(block);

        while let Some(frame) = self.extractor.next_frame() {
            on_event(AnalysisEvent::Frame(frame));

            let window = self.aggregator.push(frame);
            let result = match self.classifier.mode() {
                ClassificationMode::Rules => window.map(|stats| self.classify(stats, frame.timestamp)),
                ClassificationMode::Vote => {
                    Some(self.classify(WindowStats::from(&frame), frame.timestamp))
                }
            };

            if let Some(result) = result {
                self.latest = Some(result);
                on_event(AnalysisEvent::Classification(result));
            }
        }
    }

    fn classify(&self, stats: WindowStats, timestamp: u64) -> ClassificationResult {
        let (label, confidence) = self.classifier.classify(&stats);
        ClassificationResult {
            label,
            confidence,
            source_stats: stats,
            strategy: self.classifier.mode(),
            timestamp,
        }
    }

    /// Most recent classification, if any
    pub fn latest(&self) -> Option<ClassificationResult> {
        self.latest
    }

    /// Statistics over the frames currently in the window
    pub fn current_stats(&self) -> WindowStats {
        self.aggregator.current_stats()
    }

    pub fn mode(&self) -> ClassificationMode {
        self.classifier.mode()
    }

    /// Switch strategy; the window is kept
    pub fn set_mode(&mut self, mode: ClassificationMode) {
        self.classifier.set_mode(mode);
    }

    pub fn frames_emitted(&self) -> u64 {
        self.extractor.frames_emitted()
    }

    /// Drop buffered samples, the window and the latest result
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.aggregator.clear();
        self.latest = None;
    }
}
