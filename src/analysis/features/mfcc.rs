// MFCC module - Mel-frequency cepstral coefficients
//
// Power spectrum -> triangular mel filter bank -> log -> DCT-II.
// The filter bank and DCT basis are computed once; `compute` only writes
// into caller-provided and internal scratch buffers.

use super::types::MFCC_COUNT;

/// Number of triangular mel filters
pub const MEL_BANDS: usize = 26;

#[inline]
fn freq_to_mel(f: f32) -> f32 {
    1127.0 * (1.0 + f / 700.0).ln()
}

#[inline]
fn mel_to_freq(m: f32) -> f32 {
    700.0 * ((m / 1127.0).exp() - 1.0)
}

/// Build `mel_bins` triangular filters spanning 0..nyquist over `mag_bins` bins
fn mel_filter_bank(sample_rate: u32, mag_bins: usize, mel_bins: usize) -> Vec<Vec<f32>> {
    let f_max = sample_rate as f32 / 2.0;
    let mel_step = freq_to_mel(f_max) / (mel_bins + 1) as f32;
    let edges: Vec<f32> = (0..=mel_bins + 1)
        .map(|i| mel_to_freq(i as f32 * mel_step))
        .collect();
    let bin_hz = if mag_bins > 1 {
        f_max / (mag_bins - 1) as f32
    } else {
        f_max
    };

    let mut bank = vec![vec![0.0f32; mag_bins]; mel_bins];
    for (i, filter) in bank.iter_mut().enumerate() {
        let (left, center, right) = (edges[i], edges[i + 1], edges[i + 2]);
        for (bin, amp) in filter.iter_mut().enumerate() {
            let freq = bin as f32 * bin_hz;
            *amp = if freq < left || freq > right {
                0.0
            } else if freq <= center {
                (freq - left) / (center - left)
            } else {
                (right - freq) / (right - center)
            };
        }
    }
    bank
}

/// Mel filter bank plus DCT basis for a fixed spectrum size
pub struct MfccProcessor {
    filters: Vec<Vec<f32>>,
    /// dct[k][m] = cos(pi / M * (m + 0.5) * k)
    dct: Vec<[f32; MEL_BANDS]>,
    mel_energies: [f32; MEL_BANDS],
}

impl MfccProcessor {
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `mag_bins` - Length of the magnitude spectrum (fft_size / 2 + 1)
    pub fn new(sample_rate: u32, mag_bins: usize) -> Self {
        let filters = mel_filter_bank(sample_rate, mag_bins, MEL_BANDS);
        let dct = (0..MFCC_COUNT)
            .map(|k| {
                let mut row = [0.0f32; MEL_BANDS];
                for (m, v) in row.iter_mut().enumerate() {
                    *v = (std::f32::consts::PI / MEL_BANDS as f32 * (m as f32 + 0.5) * k as f32)
                        .cos();
                }
                row
            })
            .collect();

        Self {
            filters,
            dct,
            mel_energies: [0.0; MEL_BANDS],
        }
    }

    /// Compute 13 coefficients from a magnitude spectrum
    ///
    /// Band energies are taken as `ln(1 + e)` so a silent spectrum yields
    /// all-zero coefficients.
    pub fn compute(&mut self, magnitude: &[f32]) -> [f32; MFCC_COUNT] {
        for (energy, filter) in self.mel_energies.iter_mut().zip(self.filters.iter()) {
            let e: f32 = filter
                .iter()
                .zip(magnitude.iter())
                .map(|(&w, &mag)| w * mag * mag)
                .sum();
            *energy = if e.is_finite() { (1.0 + e.max(0.0)).ln() } else { 0.0 };
        }

        let mut coefficients = [0.0f32; MFCC_COUNT];
        for (c, basis) in coefficients.iter_mut().zip(self.dct.iter()) {
            *c = basis
                .iter()
                .zip(self.mel_energies.iter())
                .map(|(b, e)| b * e)
                .sum();
        }
        coefficients
    }
}
