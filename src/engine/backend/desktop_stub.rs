use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AudioError;

use super::{AudioBackend, BackendStartContext};

/// Signal produced by [`DesktopStubBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticSignal {
    Silence,
    Tone { frequency: f32, amplitude: f32 },
    /// Uniform white noise in `-amplitude..amplitude`
    Noise { amplitude: f32 },
    ToneWithNoise {
        frequency: f32,
        amplitude: f32,
        noise: f32,
    },
}

/// Desktop stub backend used for deterministic testing and CLI tooling.
///
/// Generates a synthetic signal on its own thread. Noise comes from a seeded
/// RNG, so two runs with the same settings deliver identical blocks. With
/// `realtime` off, blocks are produced as fast as the engine drains them and
/// none are dropped.
pub struct DesktopStubBackend {
    sample_rate: u32,
    block_size: usize,
    signal: SyntheticSignal,
    seed: u64,
    realtime: bool,
    max_blocks: Option<u64>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    blocks_sent: Arc<AtomicU64>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DesktopStubBackend {
    pub fn new(sample_rate: u32, block_size: usize, signal: SyntheticSignal) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            block_size: block_size.max(1),
            signal,
            seed: 0x5EED,
            realtime: false,
            max_blocks: None,
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            blocks_sent: Arc::new(AtomicU64::new(0)),
            thread: Mutex::new(None),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Pace blocks at the sample rate instead of as fast as possible
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Stop generating after `blocks` blocks
    pub fn with_max_blocks(mut self, blocks: u64) -> Self {
        self.max_blocks = Some(blocks);
        self
    }

    /// All `max_blocks` have been delivered
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent.load(Ordering::SeqCst)
    }
}

/// Stateful generator for one [`SyntheticSignal`]
struct Generator {
    signal: SyntheticSignal,
    sample_rate: f32,
    phase: f32,
    rng: StdRng,
}

impl Generator {
    fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = match self.signal {
                SyntheticSignal::Silence => 0.0,
                SyntheticSignal::Tone {
                    frequency,
                    amplitude,
                } => amplitude * self.next_phase(frequency).sin(),
                SyntheticSignal::Noise { amplitude } => self.noise(amplitude),
                SyntheticSignal::ToneWithNoise {
                    frequency,
                    amplitude,
                    noise,
                } => amplitude * self.next_phase(frequency).sin() + self.noise(noise),
            };
        }
    }

    fn next_phase(&mut self, frequency: f32) -> f32 {
        let phase = self.phase;
        self.phase = (self.phase + TAU * frequency / self.sample_rate) % TAU;
        phase
    }

    fn noise(&mut self, amplitude: f32) -> f32 {
        if amplitude.is_nan() || amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-amplitude..amplitude)
    }
}

impl AudioBackend for DesktopStubBackend {
    fn start(&self, ctx: BackendStartContext) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        self.finished.store(false, Ordering::SeqCst);
        self.blocks_sent.store(0, Ordering::SeqCst);

        let mut capture = ctx.capture;
        let mut generator = Generator {
            signal: self.signal,
            sample_rate: self.sample_rate as f32,
            phase: 0.0,
            rng: StdRng::seed_from_u64(self.seed),
        };
        let block_size = self.block_size;
        let block_period =
            Duration::from_secs_f64(block_size as f64 / self.sample_rate as f64);
        let realtime = self.realtime;
        let max_blocks = self.max_blocks;
        let running = Arc::clone(&self.running);
        let finished = Arc::clone(&self.finished);
        let blocks_sent = Arc::clone(&self.blocks_sent);

        let join = std::thread::Builder::new()
            .name("soundscope-stub-capture".to_string())
            .spawn(move || {
                let mut block = vec![0.0f32; block_size];
                let mut sent = 0u64;
                tracing::info!("[DesktopStubBackend] Generating {:?}", generator.signal);

                while running.load(Ordering::SeqCst) {
                    if max_blocks.is_some_and(|max| sent >= max) {
                        break;
                    }
                    if !realtime && !capture.has_free_block() {
                        std::thread::sleep(Duration::from_millis(1));
                        continue;
                    }

                    generator.fill(&mut block);
                    capture.write(&block);
                    sent += 1;
                    blocks_sent.store(sent, Ordering::SeqCst);

                    if realtime {
                        std::thread::sleep(block_period);
                    }
                }

                if max_blocks.is_some_and(|max| sent >= max) {
                    finished.store(true, Ordering::SeqCst);
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::StreamOpenFailed {
                    reason: format!("Failed to spawn stub capture thread: {}", e),
                }
            })?;

        let mut guard = self.thread.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_thread".to_string(),
        })?;
        *guard = Some(join);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(AudioError::NotRunning);
        }
        let join = self
            .thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "stub_thread".to_string(),
            })?
            .take();
        if let Some(join) = join {
            if join.join().is_err() {
                return Err(AudioError::StreamFailure {
                    reason: "Stub capture thread panicked".to_string(),
                });
            }
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for DesktopStubBackend {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferPool;

    fn collect(backend: &DesktopStubBackend, blocks: u64) -> Vec<f32> {
        let (capture, mut processing, _) = BufferPool::new(4, 64);
        backend.start(BackendStartContext { capture }).unwrap();

        let mut samples = Vec::new();
        while samples.len() < blocks as usize * 64 {
            processing.drain(|block| samples.extend_from_slice(block));
            std::thread::sleep(Duration::from_millis(1));
        }
        backend.stop().unwrap();
        samples
    }

    #[test]
    fn test_finite_run_delivers_every_block() {
        let backend = DesktopStubBackend::new(8000, 64, SyntheticSignal::Silence).with_max_blocks(20);
        let samples = collect(&backend, 20);
        assert_eq!(samples.len(), 20 * 64);
        assert!(backend.is_finished());
        assert_eq!(backend.blocks_sent(), 20);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let signal = SyntheticSignal::Noise { amplitude: 0.5 };
        let a = collect(&DesktopStubBackend::new(8000, 64, signal).with_max_blocks(4), 4);
        let b = collect(&DesktopStubBackend::new(8000, 64, signal).with_max_blocks(4), 4);
        assert_eq!(a, b);
        assert!(a.iter().all(|s| s.abs() <= 0.5));
        assert!(a.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_tone_amplitude() {
        let signal = SyntheticSignal::Tone {
            frequency: 1000.0,
            amplitude: 0.25,
        };
        let samples = collect(&DesktopStubBackend::new(8000, 64, signal).with_max_blocks(2), 2);
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_lifecycle_errors() {
        let backend = DesktopStubBackend::new(8000, 64, SyntheticSignal::Silence);
        assert_eq!(backend.stop(), Err(AudioError::NotRunning));

        let (capture, _processing, _) = BufferPool::new(2, 64);
        backend.start(BackendStartContext { capture }).unwrap();
        let (capture, _processing2, _) = BufferPool::new(2, 64);
        assert_eq!(
            backend.start(BackendStartContext { capture }),
            Err(AudioError::AlreadyRunning)
        );
        assert!(backend.is_running());
        backend.stop().unwrap();
        assert!(!backend.is_running());
    }
}
