//! Parametric filter stage
//!
//! Second-order IIR (biquad) with RBJ "Audio EQ Cookbook" coefficients.
//! Reconfiguring recomputes the coefficients but keeps the delay line, so a
//! parameter change takes effect on the next block without reconstructing
//! the node.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::graph::{AnalyzerTap, SpectrumAnalyzer, Stage};

pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 20000.0;
pub const MIN_Q: f32 = 0.1;
pub const MAX_Q: f32 = 20.0;
pub const MIN_GAIN_DB: f32 = -40.0;
pub const MAX_GAIN_DB: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
    Lowshelf,
    Highshelf,
}

impl FilterType {
    /// Whether `gain` affects this filter type
    pub fn uses_gain(&self) -> bool {
        matches!(
            self,
            FilterType::Peaking | FilterType::Lowshelf | FilterType::Highshelf
        )
    }
}

/// Filter parameters as edited by the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub filter_type: FilterType,
    /// Center/corner frequency in Hz (20-20000)
    pub frequency: f32,
    /// Quality factor (0.1-20)
    pub q: f32,
    /// Gain in dB (-40..+40), peaking and shelf types only
    pub gain: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            frequency: 1000.0,
            q: 1.0,
            gain: 0.0,
        }
    }
}

impl FilterConfig {
    /// Copy with every parameter clamped into its valid range
    ///
    /// Non-finite values fall back to the defaults.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let pick = |v: f32, d: f32| if v.is_finite() { v } else { d };
        Self {
            filter_type: self.filter_type,
            frequency: pick(self.frequency, defaults.frequency).clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            q: pick(self.q, defaults.q).clamp(MIN_Q, MAX_Q),
            gain: pick(self.gain, defaults.gain).clamp(MIN_GAIN_DB, MAX_GAIN_DB),
        }
    }
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Design coefficients for `config` at `sample_rate`
    ///
    /// The frequency is additionally kept below Nyquist.
    pub fn design(config: &FilterConfig, sample_rate: u32) -> Self {
        let config = config.clamped();
        let fs = sample_rate.max(1) as f64;
        let freq = (config.frequency as f64).min(fs * 0.49);
        let q = config.q as f64;

        let w0 = 2.0 * PI * freq / fs;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10f64.powf(config.gain as f64 / 40.0);
        let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let (b0, b1, b2, a0, a1, a2) = match config.filter_type {
            FilterType::Lowpass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            // Constant 0 dB peak gain
            FilterType::Bandpass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::Lowshelf => (
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha),
                (a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha,
            ),
            FilterType::Highshelf => (
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha),
                (a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha,
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response in dB at `freq` Hz
    pub fn magnitude_db(&self, freq: f32, sample_rate: u32) -> f32 {
        let w = 2.0 * PI * freq as f64 / sample_rate.max(1) as f64;
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let numerator = Complex::new(self.b0, 0.0) + z1 * self.b1 + z2 * self.b2;
        let denominator = Complex::new(1.0, 0.0) + z1 * self.a1 + z2 * self.a2;
        let magnitude = numerator.norm() / denominator.norm().max(1e-12);
        (20.0 * magnitude.max(1e-12).log10()) as f32
    }
}

/// Direct form I biquad with a persistent delay line
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    /* 2-sample delay-line (x[n-k], y[n-k]) */
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(coefficients: BiquadCoefficients) -> Self {
        Self {
            coefficients,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Swap coefficients, keeping the delay line
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefficients
    }

    #[inline]
    pub fn process_sample(&mut self, x0: f32) -> f32 {
        let c = &self.coefficients;
        let x0 = x0 as f64;
        let y0 = c.b0 * x0 + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        // Flush denormals
        self.y1 = if y0.abs() < 1e-20 { 0.0 } else { y0 };
        self.y1 as f32
    }

    /// Zero internal delay-line
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Graph stage applying a configurable biquad to its copy of the signal
///
/// The filtered block is kept for the host (`output`) and fed to the
/// stage's own spectrum analyzer for visualization. While disabled the
/// stage stays attached, passes audio through unchanged and stops
/// advancing its visualization.
pub struct FilterStage {
    config: FilterConfig,
    sample_rate: u32,
    biquad: Biquad,
    enabled: bool,
    output: Vec<f32>,
    analyzer: SpectrumAnalyzer,
    blocks_filtered: u64,
}

impl FilterStage {
    pub fn new(config: FilterConfig, sample_rate: u32, render: &RenderConfig) -> Self {
        let config = config.clamped();
        Self {
            biquad: Biquad::new(BiquadCoefficients::design(&config, sample_rate)),
            config,
            sample_rate,
            enabled: true,
            output: Vec::with_capacity(1024),
            analyzer: SpectrumAnalyzer::from_config(render),
            blocks_filtered: 0,
        }
    }

    /// Update type/frequency/Q/gain on the live node
    ///
    /// Values are clamped into range. Effective from the next block.
    pub fn configure(&mut self, config: FilterConfig) {
        let clamped = config.clamped();
        if clamped != config {
            log::warn!(
                "[FilterStage] Parameters clamped: {:?} -> {:?}",
                config,
                clamped
            );
        }
        self.config = clamped;
        self.biquad
            .set_coefficients(BiquadCoefficients::design(&clamped, self.sample_rate));
    }

    /// Enable or bypass the filter without detaching it
    pub fn toggle(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        if enabled {
            // Stale history from before the bypass would click
            self.biquad.reset();
        }
        self.enabled = enabled;
        log::debug!("[FilterStage] enabled = {}", enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> FilterConfig {
        self.config
    }

    /// Response of the current configuration in dB at `freq` Hz
    pub fn magnitude_response(&self, freq: f32) -> f32 {
        self.biquad
            .coefficients()
            .magnitude_db(freq, self.sample_rate)
    }

    /// The last processed block
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Visualization of the filtered signal
    pub fn tap(&self) -> AnalyzerTap {
        self.analyzer.tap()
    }

    pub fn blocks_filtered(&self) -> u64 {
        self.blocks_filtered
    }
}

impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn process(&mut self, block: &[f32]) {
        self.output.clear();
        if !self.enabled {
            self.output.extend_from_slice(block);
            return;
        }

        let biquad = &mut self.biquad;
        self.output
            .extend(block.iter().map(|&x| biquad.process_sample(x)));
        self.blocks_filtered += 1;

        self.analyzer.push(&self.output);
        self.analyzer.update();
    }

    fn on_attach(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.biquad
                .set_coefficients(BiquadCoefficients::design(&self.config, sample_rate));
        }
        self.biquad.reset();
    }

    fn on_detach(&mut self) {
        self.biquad.reset();
        self.output.clear();
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
