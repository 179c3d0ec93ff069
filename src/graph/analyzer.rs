//! Analyzer tap - smoothed frequency-magnitude snapshots for rendering
//!
//! The analyzer keeps the most recent `fft_size` samples in a ring, and after
//! every block recomputes a smoothed magnitude spectrum mapped to bytes
//! (`min_db..max_db` → `0..=255`). The snapshot is published through a
//! shared lock with `try_write`, so the audio thread never waits on a
//! reader; a skipped publish is picked up on the next block.

use std::sync::{Arc, RwLock};

use crate::analysis::features::FftProcessor;
use crate::config::RenderConfig;

use super::Stage;

/// Default decibel range mapped onto 0..=255
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Latest published spectrum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MagnitudeSnapshot {
    /// One byte per bin, `fft_size / 2` bins
    pub bins: Vec<u8>,
    /// Increments on every publish
    pub sequence: u64,
}

/// Read side of an analyzer, shared with the render loop
#[derive(Debug, Clone, Default)]
pub struct AnalyzerTap {
    shared: Arc<RwLock<MagnitudeSnapshot>>,
}

impl AnalyzerTap {
    /// Copy the latest bins into `out`; returns the snapshot sequence
    ///
    /// Returns `None` if the lock is poisoned.
    pub fn read_into(&self, out: &mut Vec<u8>) -> Option<u64> {
        let snapshot = self.shared.read().ok()?;
        out.clear();
        out.extend_from_slice(&snapshot.bins);
        Some(snapshot.sequence)
    }

    /// Clone of the latest snapshot
    pub fn latest(&self) -> MagnitudeSnapshot {
        self.shared
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn sequence(&self) -> u64 {
        self.shared.read().map(|s| s.sequence).unwrap_or(0)
    }
}

/// Rolling spectrum analyzer
pub struct SpectrumAnalyzer {
    fft: FftProcessor,
    ring: Vec<f32>,
    write_pos: usize,
    ordered: Vec<f32>,
    magnitudes: Vec<f32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    tap: AnalyzerTap,
}

impl SpectrumAnalyzer {
    /// # Arguments
    /// * `fft_size` - Window length; `fft_size / 2` bins are published
    /// * `smoothing` - Weight of the previous spectrum (0.0 to 0.99)
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft = FftProcessor::new(fft_size);
        let bins = fft_size / 2;

        Self {
            magnitudes: vec![0.0; fft.bin_count()],
            fft,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            ordered: vec![0.0; fft_size],
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
            smoothing: smoothing.clamp(0.0, 0.99),
            min_db: MIN_DECIBELS,
            max_db: MAX_DECIBELS,
            tap: AnalyzerTap {
                shared: Arc::new(RwLock::new(MagnitudeSnapshot {
                    bins: vec![0; bins],
                    sequence: 0,
                })),
            },
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.fft_size, config.smoothing)
    }

    pub fn tap(&self) -> AnalyzerTap {
        self.tap.clone()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Append samples to the rolling window
    pub fn push(&mut self, block: &[f32]) {
        let len = self.ring.len();
        for &sample in block {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Recompute the spectrum and publish it
    pub fn update(&mut self) {
        // Oldest sample first
        let (tail, head) = self.ring.split_at(self.write_pos);
        let split = head.len();
        self.ordered[..split].copy_from_slice(head);
        self.ordered[split..].copy_from_slice(tail);

        self.fft
            .compute_magnitude_spectrum(&self.ordered, &mut self.magnitudes);

        let scale = 1.0 / self.fft.fft_size() as f32;
        let range = self.max_db - self.min_db;
        for ((smoothed, byte), &magnitude) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .zip(self.magnitudes.iter())
        {
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude * scale;
            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                self.min_db
            };
            let normalized = ((db - self.min_db) / range).clamp(0.0, 1.0);
            *byte = (normalized * 255.0) as u8;
        }

        if let Ok(mut snapshot) = self.tap.shared.try_write() {
            snapshot.bins.copy_from_slice(&self.bytes);
            snapshot.sequence += 1;
        }
    }

    /// Forget all history and publish an empty spectrum
    pub fn clear(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.write_pos = 0;
        if let Ok(mut snapshot) = self.tap.shared.write() {
            snapshot.bins.iter_mut().for_each(|b| *b = 0);
            snapshot.sequence += 1;
        }
    }
}

/// Graph stage that feeds a [`SpectrumAnalyzer`] with the raw source signal
pub struct AnalyzerStage {
    analyzer: SpectrumAnalyzer,
}

impl AnalyzerStage {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::from_config(config),
        }
    }

    pub fn tap(&self) -> AnalyzerTap {
        self.analyzer.tap()
    }
}

impl Stage for AnalyzerStage {
    fn name(&self) -> &'static str {
        "analyzer"
    }

    fn process(&mut self, block: &[f32]) {
        self.analyzer.push(block);
        self.analyzer.update();
    }

    fn on_detach(&mut self) {
        self.analyzer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_silence_publishes_zero_bins() {
        let mut analyzer = SpectrumAnalyzer::new(256, 0.0);
        let tap = analyzer.tap();
        analyzer.push(&[0.0; 256]);
        analyzer.update();

        let snapshot = tap.latest();
        assert_eq!(snapshot.bins.len(), 128);
        assert_eq!(snapshot.sequence, 1);
        assert!(snapshot.bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_expected_bin() {
        let sample_rate = 8192.0;
        let mut analyzer = SpectrumAnalyzer::new(256, 0.0);
        let tap = analyzer.tap();
        // 32 Hz per bin -> bin 16; quiet enough not to saturate
        let tone: Vec<f32> = sine(512.0, sample_rate, 256).iter().map(|s| s * 0.01).collect();
        analyzer.push(&tone);
        analyzer.update();

        let mut bins = Vec::new();
        let sequence = tap.read_into(&mut bins).unwrap();
        assert_eq!(sequence, 1);
        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        assert!(bins[16] > 150);
        assert!(bins[15] < bins[16] && bins[17] < bins[16]);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let mut analyzer = SpectrumAnalyzer::new(256, 0.8);
        let tap = analyzer.tap();
        let tone: Vec<f32> = sine(512.0, 8192.0, 256).iter().map(|s| s * 0.01).collect();
        analyzer.push(&tone);
        analyzer.update();
        let loud = tap.latest().bins[16];

        analyzer.push(&[0.0; 256]);
        analyzer.update();
        let decayed = tap.latest().bins[16];
        assert!(decayed > 0 && decayed < loud);
    }

    #[test]
    fn test_stage_clears_on_detach() {
        let mut stage = AnalyzerStage::new(&RenderConfig {
            fft_size: 256,
            smoothing: 0.0,
            ..RenderConfig::default()
        });
        let tap = stage.tap();
        stage.process(&sine(512.0, 8192.0, 256));
        assert!(tap.latest().bins.iter().any(|&b| b > 0));

        stage.on_detach();
        assert!(tap.latest().bins.iter().all(|&b| b == 0));
    }
}
