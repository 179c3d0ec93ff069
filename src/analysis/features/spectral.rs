// Spectral module - Frequency-domain feature extraction
//
// This module computes spectral features from magnitude spectra.
// All features are based on the magnitude spectrum (absolute values of FFT bins).
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

/// Magnitudes below this are treated as empty bins
const MAGNITUDE_FLOOR: f32 = 1e-10;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    sample_rate: u32,
    fft_size: usize,
}

impl SpectralFeatures {
    /// Create a new spectral features processor
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `fft_size` - FFT window size
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        Self {
            sample_rate,
            fft_size,
        }
    }

    /// Width of one FFT bin in Hz
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Compute spectral centroid (weighted mean frequency)
    ///
    /// Formula: centroid = Σ(f_i × |X[i]|) / Σ|X[i]|
    ///
    /// The spectral centroid represents the "center of mass" of the spectrum,
    /// and is a measure of the brightness of a sound.
    ///
    /// # Returns
    /// Spectral centroid in Hz, 0.0 for an empty spectrum
    pub fn compute_centroid(&self, spectrum: &[f32]) -> f32 {
        let freq_bin_width = self.bin_width();

        let weighted_sum: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &mag)| {
                let freq = i as f32 * freq_bin_width;
                freq * mag
            })
            .sum();

        let magnitude_sum: f32 = spectrum.iter().sum();

        if magnitude_sum > MAGNITUDE_FLOOR {
            (weighted_sum / magnitude_sum).max(0.0)
        } else {
            0.0
        }
    }

    /// Compute spectral flatness (tonality measure)
    ///
    /// Formula: flatness = geometric_mean(|X[i]|) / arithmetic_mean(|X[i]|)
    ///
    /// Returns value between 0 (tonal, e.g., sine wave) and 1 (noise-like).
    /// Near-zero bins are excluded from both means; a spectrum with no
    /// usable bins has flatness 0.
    pub fn compute_flatness(&self, spectrum: &[f32]) -> f32 {
        let mut count = 0usize;
        let mut log_sum = 0.0f32;
        let mut linear_sum = 0.0f32;

        for &mag in spectrum {
            if mag > MAGNITUDE_FLOOR {
                count += 1;
                log_sum += mag.ln();
                linear_sum += mag;
            }
        }

        if count == 0 {
            return 0.0;
        }

        // Geometric mean: exp(mean(log(x)))
        let geometric_mean = (log_sum / count as f32).exp();
        let arithmetic_mean = linear_sum / count as f32;

        if arithmetic_mean > MAGNITUDE_FLOOR {
            let flatness = geometric_mean / arithmetic_mean;
            if flatness.is_finite() {
                flatness.clamp(0.0, 1.0)
            } else {
                0.0
            }
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_of_single_bin() {
        let spectral = SpectralFeatures::new(1000, 100);
        let mut spectrum = vec![0.0; 51];
        spectrum[10] = 2.0;
        assert!((spectral.compute_centroid(&spectrum) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_flatness_of_flat_spectrum_is_one() {
        let spectral = SpectralFeatures::new(1000, 100);
        let spectrum = vec![0.5; 51];
        assert!((spectral.compute_flatness(&spectrum) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_spectrum_defaults_to_zero() {
        let spectral = SpectralFeatures::new(48000, 512);
        let spectrum = vec![0.0; 257];
        assert_eq!(spectral.compute_centroid(&spectrum), 0.0);
        assert_eq!(spectral.compute_flatness(&spectrum), 0.0);
        assert_eq!(spectral.compute_flatness(&[]), 0.0);
    }
}
