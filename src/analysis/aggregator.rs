// FeatureAggregator - sliding window statistics over feature frames
//
// Frames are buffered in arrival order. Once the buffer reaches the trigger
// size an aggregation event fires: statistics are computed over the full
// window, then only the most recent `retain` frames are kept so consecutive
// windows overlap.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::features::FeatureFrame;
use crate::config::AggregatorConfig;

/// Aggregated statistics for one window of frames
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean_rms: f32,
    pub mean_energy: f32,
    /// Hz
    pub mean_spectral_centroid: f32,
    pub mean_spectral_flatness: f32,
    pub mean_zcr: f32,
    /// Standard deviation of the per-frame mean MFCC
    pub mfcc_std_dev: f32,
    /// Number of frames the statistics were computed from
    pub frame_count: usize,
}

/// Bounded sliding window of recent feature frames
pub struct FeatureAggregator {
    frames: VecDeque<FeatureFrame>,
    window_size: usize,
    retain: usize,
}

impl FeatureAggregator {
    /// # Panics
    /// If `window_size` is 0 or `retain >= window_size`.
    pub fn new(config: &AggregatorConfig) -> Self {
        assert!(config.window_size > 0, "window_size must be greater than 0");
        assert!(
            config.retain < config.window_size,
            "retain must be smaller than window_size"
        );

        Self {
            frames: VecDeque::with_capacity(config.window_size),
            window_size: config.window_size,
            retain: config.retain,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame; returns the window statistics when the trigger size
    /// is reached
    ///
    /// After an aggregation event only the newest `retain` frames remain.
    pub fn push(&mut self, frame: FeatureFrame) -> Option<WindowStats> {
        if self.frames.len() == self.window_size {
            // Only reachable if a caller bypassed the trigger; keep the bound
            self.frames.pop_front();
        }
        self.frames.push_back(frame);

        if self.frames.len() < self.window_size {
            return None;
        }

        let stats = self.current_stats();
        let excess = self.frames.len() - self.retain;
        self.frames.drain(..excess);
        Some(stats)
    }

    /// Statistics over the frames currently buffered
    ///
    /// Arithmetic mean of each scalar feature; an empty buffer yields zeros.
    pub fn current_stats(&self) -> WindowStats {
        let n = self.frames.len();
        if n == 0 {
            return WindowStats::default();
        }
        let count = n as f32;

        let mut stats = WindowStats {
            frame_count: n,
            ..WindowStats::default()
        };
        let mut mfcc_sum = 0.0f32;

        for frame in &self.frames {
            stats.mean_rms += frame.rms;
            stats.mean_energy += frame.energy;
            stats.mean_spectral_centroid += frame.spectral_centroid;
            stats.mean_spectral_flatness += frame.spectral_flatness;
            stats.mean_zcr += frame.zcr;
            mfcc_sum += frame.mean_mfcc();
        }

        stats.mean_rms /= count;
        stats.mean_energy /= count;
        stats.mean_spectral_centroid /= count;
        stats.mean_spectral_flatness /= count;
        stats.mean_zcr /= count;

        let mfcc_mean = mfcc_sum / count;
        let variance = self
            .frames
            .iter()
            .map(|f| {
                let d = f.mean_mfcc() - mfcc_mean;
                d * d
            })
            .sum::<f32>()
            / count;
        stats.mfcc_std_dev = variance.sqrt();

        stats
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new(&AggregatorConfig::default())
    }
}
