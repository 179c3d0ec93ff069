// FrameExtractor - per-frame feature extraction for content classification
//
// This module turns a continuous sample stream into hop-spaced analysis
// frames and computes one FeatureFrame per frame. Features are computed from
// time-domain and frequency-domain representations of the frame.
//
// Module organization:
// - types: Data structures (FeatureFrame)
// - fft: FFT computation with windowing
// - spectral: Frequency-domain features (centroid, flatness)
// - temporal: Time-domain features (RMS, energy, ZCR)
// - mfcc: Mel filter bank + DCT
// - mod.rs: Coordinator (FrameAnalyzer, FrameExtractor, FeatureStream)
//
// Features extracted:
// 1. RMS and energy: loudness
// 2. Zero-Crossing Rate (ZCR): rate of sign changes (noise/tonality measure)
// 3. Spectral Centroid: weighted mean frequency (brightness measure)
// 4. Spectral Flatness: ratio of geometric to arithmetic mean (tonality measure)
// 5. MFCC: 13 cepstral coefficients describing spectral shape
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

mod fft;
mod mfcc;
mod spectral;
mod temporal;
mod types;

pub use fft::FftProcessor;
pub use mfcc::MEL_BANDS;
pub use types::{FeatureFrame, MFCC_COUNT};

use crate::config::ExtractorConfig;
use mfcc::MfccProcessor;
use spectral::SpectralFeatures;
use temporal::TemporalFeatures;

/// Number of frames produced by a stream of `len` samples
///
/// `floor((len - buffer_size) / hop_size) + 1`, or 0 when the stream is
/// shorter than one frame.
pub fn expected_frame_count(len: usize, buffer_size: usize, hop_size: usize) -> usize {
    if len < buffer_size || hop_size == 0 {
        0
    } else {
        (len - buffer_size) / hop_size + 1
    }
}

/// Computes a FeatureFrame from one analysis window
///
/// Combines FFT processing, spectral, temporal and cepstral feature
/// extraction. All buffers are allocated up front.
pub struct FrameAnalyzer {
    fft_processor: FftProcessor,
    spectral_features: SpectralFeatures,
    mfcc: MfccProcessor,
    spectrum: Vec<f32>,
}

impl FrameAnalyzer {
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz (e.g., 44100)
    /// * `frame_size` - Analysis window length (also the FFT size)
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        let fft_processor = FftProcessor::new(frame_size);
        let bins = fft_processor.bin_count();

        Self {
            fft_processor,
            spectral_features: SpectralFeatures::new(sample_rate, frame_size),
            mfcc: MfccProcessor::new(sample_rate, bins),
            spectrum: vec![0.0; bins],
        }
    }

    /// Extract all features from an audio window
    ///
    /// Windows shorter than the frame size are zero-padded for the spectral
    /// features; time-domain features use the samples as given.
    pub fn analyze(&mut self, window: &[f32], timestamp: u64) -> FeatureFrame {
        let frame_size = self.fft_processor.fft_size();
        let window = &window[..window.len().min(frame_size)];

        self.fft_processor
            .compute_magnitude_spectrum(window, &mut self.spectrum);

        let spectral_centroid = self.spectral_features.compute_centroid(&self.spectrum);
        let spectral_flatness = self.spectral_features.compute_flatness(&self.spectrum);
        let mfcc = self.mfcc.compute(&self.spectrum);

        FeatureFrame {
            timestamp,
            rms: TemporalFeatures::compute_rms(window),
            zcr: TemporalFeatures::compute_zcr(window),
            spectral_centroid,
            spectral_flatness,
            energy: TemporalFeatures::compute_energy(window),
            mfcc,
        }
    }
}

/// Hop-based frame extractor over a continuous sample stream
///
/// Samples are accumulated until a full `buffer_size` window is available at
/// the current hop offset. Frames come out in strict hop order with
/// `timestamp` counting frames since creation.
pub struct FrameExtractor {
    analyzer: FrameAnalyzer,
    buffer_size: usize,
    hop_size: usize,
    sample_rate: u32,
    accumulator: Vec<f32>,
    /// Incoming samples still owed to a hop longer than the buffered tail
    pending_skip: usize,
    next_timestamp: u64,
}

impl FrameExtractor {
    /// Create an extractor from configuration
    ///
    /// # Panics
    /// If `buffer_size < 2` or `hop_size` is 0. `AppConfig::sanitized`
    /// repairs both before they get here.
    pub fn new(config: &ExtractorConfig) -> Self {
        assert!(config.buffer_size >= 2, "buffer_size must be at least 2");
        assert!(config.hop_size > 0, "hop_size must be greater than 0");

        Self {
            analyzer: FrameAnalyzer::new(config.sample_rate, config.buffer_size),
            buffer_size: config.buffer_size,
            hop_size: config.hop_size,
            sample_rate: config.sample_rate,
            // Room for one frame plus a few engine blocks before compaction
            accumulator: Vec::with_capacity(config.buffer_size * 4),
            pending_skip: 0,
            next_timestamp: 0,
        }
    }

    /// Extractor with default frame/hop sizes at the given sample rate
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self::new(&ExtractorConfig {
            sample_rate,
            ..ExtractorConfig::default()
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples buffered but not yet consumed by a hop
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// Number of frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_timestamp
    }

    /// Append samples to the accumulator
    ///
    /// When the hop is longer than the frame, samples between two frames are
    /// dropped here instead of being buffered.
    pub fn push(&mut self, samples: &[f32]) {
        let skip = self.pending_skip.min(samples.len());
        self.pending_skip -= skip;
        self.accumulator.extend_from_slice(&samples[skip..]);
    }

    /// Produce the next frame if a full window is buffered
    pub fn next_frame(&mut self) -> Option<FeatureFrame> {
        if self.accumulator.len() < self.buffer_size {
            return None;
        }

        let frame = self
            .analyzer
            .analyze(&self.accumulator[..self.buffer_size], self.next_timestamp);
        self.next_timestamp += 1;

        // Advance by one hop; keep the overlap for the next frame
        let consumed = self.hop_size.min(self.accumulator.len());
        self.accumulator.drain(..consumed);
        self.pending_skip = self.hop_size - consumed;
        Some(frame)
    }

    /// Push one engine block and iterate over the frames it completed
    ///
    /// With the block size equal to the hop size this yields zero or one
    /// frame per call.
    pub fn process(&mut self, samples: &[f32]) -> PendingFrames<'_> {
        self.push(samples);
        PendingFrames { extractor: self }
    }

    /// Turn a block source into a lazy sequence of frames
    ///
    /// The sequence is unbounded while `blocks` keeps producing and ends
    /// when `blocks` ends. It consumes the extractor, so it cannot be
    /// restarted.
    pub fn frames<I, B>(self, blocks: I) -> FeatureStream<I::IntoIter>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[f32]>,
    {
        FeatureStream {
            extractor: self,
            blocks: blocks.into_iter(),
        }
    }

    /// Drop buffered samples and restart frame numbering
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.pending_skip = 0;
        self.next_timestamp = 0;
    }
}

/// Frames made available by the last [`FrameExtractor::process`] call
pub struct PendingFrames<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for PendingFrames<'_> {
    type Item = FeatureFrame;

    fn next(&mut self) -> Option<FeatureFrame> {
        self.extractor.next_frame()
    }
}

/// Lazy frame sequence over a block iterator
pub struct FeatureStream<I> {
    extractor: FrameExtractor,
    blocks: I,
}

impl<I> FeatureStream<I> {
    /// Give back the extractor (with whatever samples are still buffered)
    pub fn into_inner(self) -> FrameExtractor {
        self.extractor
    }
}

impl<I, B> Iterator for FeatureStream<I>
where
    I: Iterator<Item = B>,
    B: AsRef<[f32]>,
{
    type Item = FeatureFrame;

    fn next(&mut self) -> Option<FeatureFrame> {
        loop {
            if let Some(frame) = self.extractor.next_frame() {
                return Some(frame);
            }
            let block = self.blocks.next()?;
            self.extractor.push(block.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const SAMPLE_RATE: u32 = 44100;

    /// Generate pure sine wave for testing
    fn generate_sine_wave(sample_rate: u32, frequency: f32, duration_samples: usize) -> Vec<f32> {
        (0..duration_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    /// Generate white noise for testing
    fn generate_white_noise(duration_samples: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..duration_samples)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect()
    }

    #[test]
    fn test_frame_count_matches_formula() {
        let config = ExtractorConfig::default();
        for len in [0usize, 100, 511, 512, 513, 767, 768, 1024, 5000, 44100] {
            let mut extractor = FrameExtractor::new(&config);
            let audio = generate_white_noise(len, len as u64);
            let count = extractor.process(&audio).count();
            assert_eq!(
                count,
                expected_frame_count(len, config.buffer_size, config.hop_size),
                "length {}",
                len
            );
        }
    }

    #[test]
    fn test_frame_count_independent_of_block_size() {
        let audio = generate_white_noise(10_000, 7);
        let expected = expected_frame_count(audio.len(), 512, 256);

        for block in [1usize, 64, 128, 256, 300, 1024] {
            let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
            let mut count = 0;
            for chunk in audio.chunks(block) {
                count += extractor.process(chunk).count();
            }
            assert_eq!(count, expected, "block size {}", block);
        }
    }

    #[test]
    fn test_hop_longer_than_frame_skips_gap() {
        let config = ExtractorConfig {
            buffer_size: 256,
            hop_size: 512,
            sample_rate: SAMPLE_RATE,
        };
        // Silent where frames land, noise in the gaps they skip
        let noise = generate_white_noise(5000, 11);
        let audio: Vec<f32> = noise
            .iter()
            .enumerate()
            .map(|(i, &n)| if i % 512 < 256 { 0.0 } else { n })
            .collect();

        for block in [256usize, 100, 1024] {
            let mut extractor = FrameExtractor::new(&config);
            let mut frames = Vec::new();
            for chunk in audio.chunks(block) {
                frames.extend(extractor.process(chunk));
            }
            assert_eq!(frames.len(), expected_frame_count(audio.len(), 256, 512));
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame.timestamp, i as u64);
                assert_eq!(frame.rms, 0.0, "block size {} frame {}", block, i);
            }
        }
    }

    #[test]
    fn test_hop_sized_blocks_yield_at_most_one_frame() {
        let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let audio = generate_white_noise(256 * 20, 3);
        for chunk in audio.chunks(256) {
            assert!(extractor.process(chunk).count() <= 1);
        }
    }

    #[test]
    fn test_timestamps_are_in_hop_order() {
        let extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let audio = generate_white_noise(4096, 11);
        let blocks: Vec<Vec<f32>> = audio.chunks(256).map(|c| c.to_vec()).collect();
        let timestamps: Vec<u64> = extractor.frames(blocks).map(|f| f.timestamp).collect();
        let expected: Vec<u64> = (0..expected_frame_count(4096, 512, 256) as u64).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_silence_yields_zero_features() {
        let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let silence = vec![0.0f32; 512];
        let frame = extractor.process(&silence).next().unwrap();

        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.energy, 0.0);
        assert_eq!(frame.spectral_flatness, 0.0);
        assert_eq!(frame.spectral_centroid, 0.0);
        assert_eq!(frame.zcr, 0.0);
        assert!(frame.mfcc.iter().all(|c| *c == 0.0));
    }

    #[test]
    fn test_feature_ranges_hold_for_varied_input() {
        let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let mut audio = generate_white_noise(4096, 99);
        audio.extend(generate_sine_wave(SAMPLE_RATE, 440.0, 4096));
        audio.extend(vec![0.0; 2048]);
        audio.extend(generate_sine_wave(SAMPLE_RATE, 8000.0, 4096).iter().map(|s| s * 1e-4));

        for frame in extractor.process(&audio) {
            assert!(frame.rms >= 0.0 && frame.rms.is_finite());
            assert!(frame.energy >= 0.0 && frame.energy.is_finite());
            assert!((0.0..=1.0).contains(&frame.zcr));
            assert!((0.0..=1.0).contains(&frame.spectral_flatness));
            assert!(frame.spectral_centroid >= 0.0);
            assert!(frame.mfcc.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn test_sine_centroid_near_tone_frequency() {
        let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let audio = generate_sine_wave(SAMPLE_RATE, 1000.0, 512);
        let frame = extractor.process(&audio).next().unwrap();

        println!("Sine 1000Hz centroid: {:.1} Hz", frame.spectral_centroid);
        assert!(frame.spectral_centroid > 700.0 && frame.spectral_centroid < 1400.0);
        assert!(frame.spectral_flatness < 0.3);
    }

    #[test]
    fn test_noise_is_flatter_than_sine() {
        let mut extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let noise = generate_white_noise(512, 5);
        let sine = generate_sine_wave(SAMPLE_RATE, 440.0, 512);

        let noise_frame = extractor.process(&noise).next().unwrap();
        extractor.reset();
        let sine_frame = extractor.process(&sine).next().unwrap();

        assert!(noise_frame.spectral_flatness > sine_frame.spectral_flatness);
        assert!(noise_frame.zcr > sine_frame.zcr);
    }

    #[test]
    fn test_stream_ends_with_source() {
        let extractor = FrameExtractor::with_sample_rate(SAMPLE_RATE);
        let blocks = vec![vec![0.1f32; 256]; 3];
        let mut stream = extractor.frames(blocks);
        assert_eq!(stream.next().map(|f| f.timestamp), Some(0));
        assert_eq!(stream.next().map(|f| f.timestamp), Some(1));
        assert!(stream.next().is_none());
        // Last hop of samples is still buffered
        assert_eq!(stream.into_inner().buffered(), 256);
    }
}
