//! CPAL input backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send` on every host, so the stream lives on a
//! dedicated thread for its whole life. `start` waits for that thread to
//! report whether the stream opened; `stop` signals it and joins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::CaptureChannels;
use crate::error::{log_audio_error, AudioError};

use super::{AudioBackend, BackendStartContext};

struct StreamThread {
    stop_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Default-input-device capture backend
pub struct CpalBackend {
    sample_rate: u32,
    running: AtomicBool,
    thread: Mutex<Option<StreamThread>>,
}

impl CpalBackend {
    /// # Arguments
    /// * `sample_rate` - Rate requested from the input device
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    fn open_stream(
        sample_rate: u32,
        mut capture: CaptureChannels,
    ) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable {
                details: "No default input device found".to_string(),
            })?;

        let default_config =
            device
                .default_input_config()
                .map_err(|e| AudioError::StreamOpenFailed {
                    reason: format!("Failed to get default input config: {}", e),
                })?;

        if default_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::StreamOpenFailed {
                reason: format!(
                    "Unsupported input sample format {:?}, only F32 is supported",
                    default_config.sample_format()
                ),
            });
        }

        let mut stream_config: cpal::StreamConfig = default_config.into();
        stream_config.sample_rate = cpal::SampleRate(sample_rate);
        let channels = stream_config.channels as usize;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    capture.write_interleaved(data, channels);
                },
                |err| {
                    log_audio_error(
                        &AudioError::StreamFailure {
                            reason: err.to_string(),
                        },
                        "CpalBackend input callback",
                    );
                },
                None,
            )
            .map_err(|err| match err {
                cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable {
                    details: err.to_string(),
                },
                cpal::BuildStreamError::BackendSpecific { .. } => AudioError::HardwareError {
                    details: err.to_string(),
                },
                other => AudioError::StreamOpenFailed {
                    reason: other.to_string(),
                },
            })?;

        stream.play().map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to start input stream: {}", e),
        })?;

        Ok(stream)
    }
}

impl AudioBackend for CpalBackend {
    fn start(&self, ctx: BackendStartContext) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let sample_rate = self.sample_rate;
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("soundscope-capture".to_string())
            .spawn(move || {
                let stream = match Self::open_stream(sample_rate, ctx.capture) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                tracing::info!("[CpalBackend] Input stream running at {} Hz", sample_rate);

                // Sender dropped or stop requested
                let _ = stop_rx.recv();
                drop(stream);
                tracing::info!("[CpalBackend] Input stream closed");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::StreamOpenFailed {
                    reason: format!("Failed to spawn capture thread: {}", e),
                }
            })?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamFailure {
                reason: "Capture thread exited during startup".to_string(),
            })
        });

        if let Err(err) = opened {
            let _ = join.join();
            self.running.store(false, Ordering::SeqCst);
            log_audio_error(&err, "CpalBackend::start");
            return Err(err);
        }

        let mut guard = self.thread.lock().map_err(|_| AudioError::LockPoisoned {
            component: "cpal_thread".to_string(),
        })?;
        *guard = Some(StreamThread { stop_tx, join });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(AudioError::NotRunning);
        }

        let thread = self
            .thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "cpal_thread".to_string(),
            })?
            .take();

        if let Some(thread) = thread {
            let _ = thread.stop_tx.send(());
            if thread.join.join().is_err() {
                return Err(AudioError::StreamFailure {
                    reason: "Capture thread panicked".to_string(),
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

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}
