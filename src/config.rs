//! Configuration management for the analysis pipeline
//!
//! This module provides runtime configuration loading from JSON files so
//! frame sizes, window lengths, render gain and capture buffering can be
//! adjusted without recompilation. Classification thresholds are NOT part of
//! the configuration: label assignment depends on their exact values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::classifier::ClassificationMode;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Frame extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Frame length in samples
    pub buffer_size: usize,
    /// Advance between consecutive frames in samples
    pub hop_size: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            hop_size: 256,
            sample_rate: 44100,
        }
    }
}

/// Sliding window parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Number of frames that triggers a classification
    pub window_size: usize,
    /// Frames kept after each classification (overlap)
    pub retain: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            retain: 10,
        }
    }
}

/// Classification strategy selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: ClassificationMode,
}

/// Spectrogram and coefficient rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Spectrogram width in columns
    pub width: usize,
    /// Spectrogram height in rows
    pub height: usize,
    /// Linear gain applied to normalized magnitude before color mapping
    pub gain: f32,
    /// Offset added after gain
    pub offset: f32,
    /// Interval clock rate in frames per second
    pub frame_rate: u32,
    /// Analyzer FFT size (bins = fft_size / 2)
    pub fft_size: usize,
    /// Analyzer smoothing between snapshots (0.0 = none)
    pub smoothing: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            gain: 1.5,
            offset: 0.0,
            frame_rate: 60,
            fft_size: 2048,
            smoothing: 0.8,
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Size of each audio block in samples
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 64,
            block_size: 256,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or
    /// the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config.sanitized()
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/soundscope_config.json")
    }

    /// Repair values that would break the pipeline invariants
    pub fn sanitized(mut self) -> Self {
        let defaults = AppConfig::default();
        if self.extractor.buffer_size < 2 {
            log::warn!(
                "[Config] buffer_size {} too small, using {}",
                self.extractor.buffer_size,
                defaults.extractor.buffer_size
            );
            self.extractor.buffer_size = defaults.extractor.buffer_size;
        }
        if self.extractor.hop_size == 0 || self.extractor.hop_size > self.extractor.buffer_size {
            log::warn!(
                "[Config] hop_size {} invalid for buffer_size {}, using half the frame",
                self.extractor.hop_size,
                self.extractor.buffer_size
            );
            self.extractor.hop_size = (self.extractor.buffer_size / 2).max(1);
        }
        if self.extractor.sample_rate == 0 {
            self.extractor.sample_rate = defaults.extractor.sample_rate;
        }
        if self.aggregator.window_size == 0 || self.aggregator.retain >= self.aggregator.window_size
        {
            log::warn!(
                "[Config] aggregator window {}/{} invalid, using defaults",
                self.aggregator.window_size,
                self.aggregator.retain
            );
            self.aggregator = defaults.aggregator;
        }
        if self.render.width == 0 || self.render.height == 0 {
            self.render.width = defaults.render.width;
            self.render.height = defaults.render.height;
        }
        if !self.render.fft_size.is_power_of_two() || self.render.fft_size < 32 {
            self.render.fft_size = defaults.render.fft_size;
        }
        self.render.smoothing = self.render.smoothing.clamp(0.0, 0.99);
        if self.render.frame_rate == 0 {
            self.render.frame_rate = defaults.render.frame_rate;
        }
        if self.audio.buffer_pool_size == 0 {
            self.audio.buffer_pool_size = defaults.audio.buffer_pool_size;
        }
        if self.audio.block_size == 0 {
            self.audio.block_size = defaults.audio.block_size;
        }
        self
    }
}
