// Temporal module - Time-domain feature extraction
//
// This module computes features directly from time-domain audio signals:
// loudness (energy, RMS) and zero-crossing rate.
//
// References:
// - Peeters, G. (2004). A large set of audio features for sound description
// - Lerch, A. (2012). An Introduction to Audio Content Analysis

/// Temporal feature computation functions
pub struct TemporalFeatures;

impl TemporalFeatures {
    /// Compute frame energy
    ///
    /// Formula: E = Σ x[n]²
    pub fn compute_energy(audio: &[f32]) -> f32 {
        let energy: f32 = audio.iter().map(|&x| x * x).sum();
        if energy.is_finite() {
            energy
        } else {
            0.0
        }
    }

    /// Compute root-mean-square amplitude
    ///
    /// Formula: RMS = sqrt(E / N). Returns 0.0 for empty or silent input.
    pub fn compute_rms(audio: &[f32]) -> f32 {
        if audio.is_empty() {
            return 0.0;
        }
        let energy = Self::compute_energy(audio);
        if energy <= 0.0 {
            return 0.0;
        }
        (energy / audio.len() as f32).sqrt()
    }

    /// Compute zero-crossing rate (ZCR)
    ///
    /// Fraction of adjacent sample pairs with opposite sign.
    /// High ZCR indicates high-frequency or noise-like content.
    /// Low ZCR indicates low-frequency or tonal content.
    ///
    /// # Returns
    /// Zero-crossing rate (0.0 to 1.0)
    pub fn compute_zcr(audio: &[f32]) -> f32 {
        if audio.len() < 2 {
            return 0.0;
        }

        let crossings = audio
            .windows(2)
            .filter(|pair| (pair[1] >= 0.0) != (pair[0] >= 0.0))
            .count();

        // Normalize by number of adjacent pairs
        crossings as f32 / (audio.len() - 1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_constant_signal() {
        let audio = vec![0.5; 100];
        assert!((TemporalFeatures::compute_rms(&audio) - 0.5).abs() < 1e-6);
        assert!((TemporalFeatures::compute_energy(&audio) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_zcr_alternating_signal_is_one() {
        let audio: Vec<f32> = (0..64)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert!((TemporalFeatures::compute_zcr(&audio) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_and_empty_input() {
        assert_eq!(TemporalFeatures::compute_rms(&[]), 0.0);
        assert_eq!(TemporalFeatures::compute_zcr(&[0.3]), 0.0);
        let silence = vec![0.0; 512];
        assert_eq!(TemporalFeatures::compute_rms(&silence), 0.0);
        assert_eq!(TemporalFeatures::compute_energy(&silence), 0.0);
        assert_eq!(TemporalFeatures::compute_zcr(&silence), 0.0);
    }
}
