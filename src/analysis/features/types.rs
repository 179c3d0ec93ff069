// Types module - Data structures for audio features
//
// This module defines the per-frame feature vector produced by the
// FrameExtractor and consumed by the FeatureAggregator.

use serde::{Deserialize, Serialize};

/// Number of mel-frequency cepstral coefficients per frame
pub const MFCC_COUNT: usize = 13;

/// Features extracted from one analysis frame
///
/// Frames are immutable once created (`Copy`, no interior mutability) and
/// are produced in strict hop order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Frame index since the extractor was created
    pub timestamp: u64,

    /// Root-mean-square amplitude (>= 0)
    pub rms: f32,

    /// Zero-crossing rate (0.0 to 1.0, normalized)
    ///
    /// Higher values indicate more noise-like or high-frequency content.
    pub zcr: f32,

    /// Spectral centroid in Hz (magnitude-weighted mean frequency)
    pub spectral_centroid: f32,

    /// Spectral flatness (0.0 to 1.0, geometric/arithmetic mean ratio)
    ///
    /// 0.0 = pure tone, 1.0 = white noise
    pub spectral_flatness: f32,

    /// Sum of squared samples (>= 0)
    pub energy: f32,

    /// Mel-frequency cepstral coefficients
    pub mfcc: [f32; MFCC_COUNT],
}

impl FeatureFrame {
    /// Arithmetic mean of the frame's MFCC values
    pub fn mean_mfcc(&self) -> f32 {
        self.mfcc.iter().sum::<f32>() / MFCC_COUNT as f32
    }

    /// A frame of digital silence at the given index
    pub fn silent(timestamp: u64) -> Self {
        Self {
            timestamp,
            rms: 0.0,
            zcr: 0.0,
            spectral_centroid: 0.0,
            spectral_flatness: 0.0,
            energy: 0.0,
            mfcc: [0.0; MFCC_COUNT],
        }
    }
}
