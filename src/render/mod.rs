//! Render loop - cancellable, frame-clock-driven painting
//!
//! Each running loop owns a liveness token. Every tick checks that its
//! token is still the active one before painting and again before
//! requesting the next frame, so a stopped (or superseded) loop never
//! paints against a stale analyzer.

mod canvas;
mod clock;

pub use canvas::{Canvas, ColorRamp, Rgba, CYAN, DEEP_BLUE, GREEN, RED, YELLOW};
pub use clock::{FrameCallback, FrameClock, IntervalFrameClock, ManualFrameClock};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::analysis::stage::AnalysisTap;
use crate::config::RenderConfig;
use crate::graph::AnalyzerTap;

/// Something that draws one frame per tick
pub trait Painter: Send {
    fn paint(&mut self, now: Instant);
}

/// Scrolling spectrogram plus MFCC coefficient bars
pub struct SpectrogramPainter {
    tap: AnalyzerTap,
    analysis: Option<AnalysisTap>,
    spectrogram: Canvas,
    bars: Canvas,
    ramp: ColorRamp,
    gain: f32,
    offset: f32,
    bins: Vec<u8>,
    frames_painted: u64,
}

/// Height of the coefficient bar canvas
const BAR_CANVAS_HEIGHT: usize = 64;
const BAR_WIDTH: usize = 8;

impl SpectrogramPainter {
    pub fn new(tap: AnalyzerTap, config: &RenderConfig) -> Self {
        Self {
            tap,
            analysis: None,
            spectrogram: Canvas::new(config.width, config.height, DEEP_BLUE),
            bars: Canvas::new(
                crate::analysis::features::MFCC_COUNT * BAR_WIDTH,
                BAR_CANVAS_HEIGHT,
                Rgba::default(),
            ),
            ramp: ColorRamp::spectrogram(),
            gain: config.gain,
            offset: config.offset,
            bins: Vec::with_capacity(config.fft_size / 2),
            frames_painted: 0,
        }
    }

    /// Also paint coefficient bars from the analysis stage
    pub fn with_analysis(mut self, analysis: AnalysisTap) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn set_boost(&mut self, gain: f32, offset: f32) {
        self.gain = gain;
        self.offset = offset;
    }

    pub fn spectrogram(&self) -> &Canvas {
        &self.spectrogram
    }

    pub fn bars(&self) -> &Canvas {
        &self.bars
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames_painted
    }

    /// Scroll left and draw the newest column from the analyzer snapshot
    fn paint_spectrogram(&mut self) {
        if self.tap.read_into(&mut self.bins).is_none() {
            return;
        }

        let height = self.spectrogram.height();
        let x = self.spectrogram.width().saturating_sub(1);
        self.spectrogram.shift_left();

        let bins = &self.bins;
        let ramp = &self.ramp;
        let (gain, offset) = (self.gain, self.offset);
        self.spectrogram.draw_column(x, |y| {
            if bins.is_empty() {
                return ramp.map(offset);
            }
            // Low frequencies at the bottom
            let row_from_bottom = height.saturating_sub(1 + y);
            let bin = (row_from_bottom * bins.len() / height).min(bins.len() - 1);
            let magnitude = bins[bin] as f32 / 255.0;
            ramp.map(gain * magnitude + offset)
        });
    }

    fn paint_bars(&mut self) {
        let Some(frame) = self.analysis.as_ref().and_then(|a| a.latest_frame()) else {
            return;
        };

        self.bars.fill(Rgba::default());
        let peak = frame
            .mfcc
            .iter()
            .fold(0.0f32, |max, c| max.max(c.abs()));
        if peak <= 0.0 {
            return;
        }

        let height = self.bars.height();
        let last = (frame.mfcc.len() - 1).max(1) as f32;
        for (k, c) in frame.mfcc.iter().enumerate() {
            let bar = ((c.abs() / peak) * height as f32).round() as usize;
            let color = self.ramp.map(k as f32 / last);
            self.bars
                .fill_rect(k * BAR_WIDTH + 1, height - bar, BAR_WIDTH - 2, bar, color);
        }
    }
}

impl Painter for SpectrogramPainter {
    fn paint(&mut self, _now: Instant) {
        self.paint_spectrogram();
        self.paint_bars();
        self.frames_painted += 1;
    }
}

struct LoopShared<C, P> {
    clock: C,
    painter: Mutex<P>,
    /// Token of the running loop, 0 when stopped
    active: AtomicU64,
    next_token: AtomicU64,
}

impl<C, P> LoopShared<C, P> {
    fn painter(&self) -> MutexGuard<'_, P> {
        match self.painter.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("[RenderLoop] Painter lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn is_active(&self, token: u64) -> bool {
        self.active.load(Ordering::Acquire) == token
    }
}

/// Cancellable loop painting once per clock tick
pub struct RenderLoop<C, P> {
    shared: Arc<LoopShared<C, P>>,
}

impl<C, P> RenderLoop<C, P>
where
    C: FrameClock + 'static,
    P: Painter + 'static,
{
    pub fn new(clock: C, painter: P) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                clock,
                painter: Mutex::new(painter),
                active: AtomicU64::new(0),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Start painting; supersedes a loop that is already running
    pub fn start(&self) -> u64 {
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        self.shared.active.store(token, Ordering::Release);
        log::debug!("[RenderLoop] Started loop {}", token);
        schedule(Arc::clone(&self.shared), token);
        token
    }

    /// Cancel the running loop
    ///
    /// Waits for a paint already in progress; after this returns the
    /// painter is never called again until the next `start`.
    pub fn stop(&self) {
        let previous = self.shared.active.swap(0, Ordering::AcqRel);
        // Paints check the token under this lock
        drop(self.shared.painter());
        if previous != 0 {
            log::debug!("[RenderLoop] Stopped loop {}", previous);
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::Acquire) != 0
    }

    pub fn clock(&self) -> &C {
        &self.shared.clock
    }

    /// Run `f` with the painter locked
    pub fn with_painter<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.shared.painter())
    }
}

impl<C, P> Drop for RenderLoop<C, P> {
    fn drop(&mut self) {
        self.shared.active.store(0, Ordering::Release);
    }
}

fn schedule<C, P>(shared: Arc<LoopShared<C, P>>, token: u64)
where
    C: FrameClock + 'static,
    P: Painter + 'static,
{
    // The clock may hold this callback past the loop's lifetime
    let weak = Arc::downgrade(&shared);
    shared.clock.request_frame(Box::new(move |now| {
        let Some(tick_shared) = weak.upgrade() else {
            return;
        };
        {
            let mut painter = tick_shared.painter();
            if !tick_shared.is_active(token) {
                return;
            }
            painter.paint(now);
        }
        if tick_shared.is_active(token) {
            schedule(tick_shared, token);
        }
    }));
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
