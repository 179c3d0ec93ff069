// FFT module - Fast Fourier Transform computation
//
// This module handles FFT computation with proper windowing to reduce
// spectral leakage. The magnitude spectrum is used by spectral feature
// extraction functions and by the analyzer tap.
//
// The plan, window and scratch buffers are created once in `new`, so
// `compute_magnitude_spectrum` never allocates on the audio path.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor that computes magnitude spectra from audio windows
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window for FFT (pre-computed)
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - FFT window size (the analysis frame length)
    pub fn new(fft_size: usize) -> Self {
        assert!(fft_size >= 2, "fft_size must be at least 2");

        // Pre-compute Hann window to reduce spectral leakage
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            fft_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    /// Number of bins written by [`compute_magnitude_spectrum`]
    ///
    /// [`compute_magnitude_spectrum`]: FftProcessor::compute_magnitude_spectrum
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute magnitude spectrum using FFT
    ///
    /// Applies Hann windowing, performs FFT, and writes the magnitude of the
    /// positive frequencies into `out` (exploiting symmetry of real-valued
    /// FFT). Audio shorter than the FFT size is zero-padded; longer audio is
    /// truncated.
    ///
    /// # Arguments
    /// * `audio` - Audio window
    /// * `out` - Destination, at least `bin_count()` long
    pub fn compute_magnitude_spectrum(&mut self, audio: &[f32], out: &mut [f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = audio.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = self.bin_count().min(out.len());
        for (dst, c) in out[..bins].iter_mut().zip(self.buffer.iter()) {
            let magnitude = c.norm();
            *dst = if magnitude.is_finite() { magnitude } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_count() {
        let fft = FftProcessor::new(512);
        assert_eq!(fft.bin_count(), 257);
        assert_eq!(fft.fft_size(), 512);
    }

    #[test]
    fn test_sine_peak_lands_in_expected_bin() {
        let sample_rate = 48000.0;
        let size = 1024;
        let mut fft = FftProcessor::new(size);
        // Exactly on bin 32
        let freq = 32.0 * sample_rate / size as f32;
        let audio: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();
        let mut spectrum = vec![0.0; fft.bin_count()];
        fft.compute_magnitude_spectrum(&audio, &mut spectrum);

        let (peak_bin, _) = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(peak_bin, 32);
    }

    #[test]
    fn test_short_audio_is_zero_padded() {
        let mut fft = FftProcessor::new(64);
        let mut spectrum = vec![1.0; fft.bin_count()];
        fft.compute_magnitude_spectrum(&[], &mut spectrum);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }
}
