//! Recording session - capture lifecycle state machine
//!
//! ```text
//! idle ──start──▶ recording ──pause──▶ paused
//!                    ▲  │◀──resume──────┘
//!                    │  └────stop──▶ stopped ──discard──▶ idle
//! ```
//!
//! Out-of-order calls (pause while idle, resume while recording, stop while
//! idle, ...) are ignored and logged at debug level. Only environment
//! failures while acquiring the capture device and encode/delivery failures
//! surface as errors.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{log_audio_error, log_recording_error, AudioError, RecordingError};
use crate::graph::Stage;

/// MIME type of finalized recordings
pub const WAV_MIME_TYPE: &str = "audio/wav";

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// Lifecycle state of a [`RecordingSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// Microphone or other capture device the session holds while recording
pub trait CaptureDevice: Send {
    /// Acquire the device; permission and availability errors are final
    fn acquire(&mut self) -> Result<(), AudioError>;

    /// Give the device back
    fn release(&mut self);
}

/// External storage collaborator for finalized recordings
pub trait UploadService {
    fn deliver(&self, blob: &AudioBlob) -> Result<BlobReference, RecordingError>;
}

/// Monotonic time since an arbitrary origin
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock [`TimeSource`] backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A finalized recording
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Length of the recorded audio
    pub duration: Duration,
}

/// Durable reference returned by an [`UploadService`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct BlobReference(pub String);

impl fmt::Display for BlobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct SinkState {
    accepting: bool,
    /// f32 little-endian sample bytes, in arrival order
    chunks: Vec<Vec<u8>>,
}

/// Chunk store shared by a session and the stages feeding it
///
/// Accepts samples only while its session is recording. The lock is held
/// for a single append, so a caller busy with the session never makes the
/// audio path lose a block.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    shared: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one chunk; false when the samples were not recorded
    pub fn push(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let mut state = self.lock();
        if !state.accepting {
            return false;
        }
        let mut chunk = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            chunk.extend_from_slice(&sample.to_le_bytes());
        }
        state.chunks.push(chunk);
        true
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
    }

    fn clear(&self) {
        self.lock().chunks.clear();
    }
}

/// Capture lifecycle for one recording
pub struct RecordingSession<D: CaptureDevice> {
    device: D,
    time: Arc<dyn TimeSource>,
    sample_rate: u32,
    state: RecordingState,
    sink: RecordingSink,
    /// Recording time of closed segments
    elapsed_closed: Duration,
    /// Start of the open recording segment
    segment_start: Option<Duration>,
    blob: Option<AudioBlob>,
}

impl<D: CaptureDevice> RecordingSession<D> {
    pub fn new(device: D, sample_rate: u32) -> Self {
        Self::with_time_source(device, sample_rate, Arc::new(MonotonicTime::default()))
    }

    pub fn with_time_source(device: D, sample_rate: u32, time: Arc<dyn TimeSource>) -> Self {
        Self {
            device,
            time,
            sample_rate: sample_rate.max(1),
            state: RecordingState::Idle,
            sink: RecordingSink::default(),
            elapsed_closed: Duration::ZERO,
            segment_start: None,
            blob: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn chunk_count(&self) -> usize {
        self.sink.lock().chunks.len()
    }

    /// Samples accumulated so far
    pub fn sample_count(&self) -> usize {
        sample_count(&self.sink.lock().chunks)
    }

    /// Handle for stages that feed this session from the audio path
    pub fn sink(&self) -> RecordingSink {
        self.sink.clone()
    }

    /// The finalized recording, once stopped
    pub fn blob(&self) -> Option<&AudioBlob> {
        self.blob.as_ref()
    }

    /// Recording time so far, paused intervals excluded
    pub fn elapsed(&self) -> Duration {
        let open = self
            .segment_start
            .map(|start| self.time.now().saturating_sub(start))
            .unwrap_or(Duration::ZERO);
        self.elapsed_closed + open
    }

    /// idle → recording
    ///
    /// On a capture error the session stays idle; the error is not retried.
    pub fn start(&mut self) -> Result<(), RecordingError> {
        if self.state != RecordingState::Idle {
            log::debug!("[RecordingSession] start ignored in state {:?}", self.state);
            return Ok(());
        }

        // Open before acquiring: the device may deliver from its first block
        self.sink.clear();
        self.sink.set_accepting(true);
        if let Err(err) = self.device.acquire() {
            self.sink.set_accepting(false);
            self.sink.clear();
            log_audio_error(&err, "RecordingSession::start");
            return Err(RecordingError::Capture(err));
        }

        self.blob = None;
        self.elapsed_closed = Duration::ZERO;
        self.segment_start = Some(self.time.now());
        self.state = RecordingState::Recording;
        log::info!("[RecordingSession] Recording started");
        Ok(())
    }

    /// recording → paused
    pub fn pause(&mut self) {
        if self.state != RecordingState::Recording {
            log::debug!("[RecordingSession] pause ignored in state {:?}", self.state);
            return;
        }
        self.close_segment();
        self.sink.set_accepting(false);
        self.state = RecordingState::Paused;
    }

    /// paused → recording
    pub fn resume(&mut self) {
        if self.state != RecordingState::Paused {
            log::debug!("[RecordingSession] resume ignored in state {:?}", self.state);
            return;
        }
        self.segment_start = Some(self.time.now());
        self.sink.set_accepting(true);
        self.state = RecordingState::Recording;
    }

    /// Append one chunk; returns false when the samples were not recorded
    pub fn push_samples(&mut self, samples: &[f32]) -> bool {
        self.state == RecordingState::Recording && self.sink.push(samples)
    }

    /// recording | paused → stopped
    ///
    /// Releases the device and finalizes the chunks into one WAV blob.
    /// Blocks the device flushes while being released are still recorded.
    /// If encoding fails the session is still stopped, with no blob.
    pub fn stop(&mut self) -> Result<(), RecordingError> {
        if !matches!(
            self.state,
            RecordingState::Recording | RecordingState::Paused
        ) {
            log::debug!("[RecordingSession] stop ignored in state {:?}", self.state);
            return Ok(());
        }

        self.close_segment();
        self.device.release();
        self.sink.set_accepting(false);
        self.state = RecordingState::Stopped;

        match self.encode() {
            Ok(blob) => {
                log::info!(
                    "[RecordingSession] Stopped: {} chunks, {:.2}s of audio",
                    self.chunk_count(),
                    blob.duration.as_secs_f64()
                );
                self.blob = Some(blob);
                Ok(())
            }
            Err(err) => {
                log_recording_error(&err, "RecordingSession::stop");
                Err(err)
            }
        }
    }

    /// Hand the finalized blob to the upload service
    pub fn deliver(&self, uploader: &dyn UploadService) -> Result<BlobReference, RecordingError> {
        let blob = self.blob.as_ref().ok_or(RecordingError::NothingToDeliver)?;
        uploader.deliver(blob).map_err(|err| {
            log_recording_error(&err, "RecordingSession::deliver");
            err
        })
    }

    /// stopped → idle, dropping the recording
    pub fn discard(&mut self) {
        if self.state != RecordingState::Stopped {
            log::debug!("[RecordingSession] discard ignored in state {:?}", self.state);
            return;
        }
        self.sink.clear();
        self.blob = None;
        self.elapsed_closed = Duration::ZERO;
        self.segment_start = None;
        self.state = RecordingState::Idle;
    }

    fn close_segment(&mut self) {
        if let Some(start) = self.segment_start.take() {
            self.elapsed_closed += self.time.now().saturating_sub(start);
        }
    }

    /// Mono 32-bit float WAV of every chunk
    fn encode(&self) -> Result<AudioBlob, RecordingError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let sink = self.sink.lock();
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for chunk in &sink.chunks {
            for bytes in chunk.chunks_exact(BYTES_PER_SAMPLE) {
                writer.write_sample(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?;
            }
        }
        writer.finalize()?;

        let samples = sample_count(&sink.chunks) as u64;
        Ok(AudioBlob {
            bytes: cursor.into_inner(),
            mime_type: WAV_MIME_TYPE.to_string(),
            duration: Duration::from_nanos(
                samples.saturating_mul(1_000_000_000) / self.sample_rate as u64,
            ),
        })
    }
}

impl<D: CaptureDevice> Drop for RecordingSession<D> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            RecordingState::Recording | RecordingState::Paused
        ) {
            self.device.release();
            self.sink.set_accepting(false);
        }
    }
}

fn sample_count(chunks: &[Vec<u8>]) -> usize {
    chunks.iter().map(|c| c.len() / BYTES_PER_SAMPLE).sum()
}

/// Graph stage feeding dispatched blocks into a session's sink
///
/// Holds only the sink, never the session, so the stage does not keep the
/// session's capture device alive.
pub struct RecordingStage {
    sink: RecordingSink,
}

impl RecordingStage {
    pub fn new(sink: RecordingSink) -> Self {
        Self { sink }
    }
}

impl Stage for RecordingStage {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn process(&mut self, block: &[f32]) {
        self.sink.push(block);
    }
}

/// Upload service writing each blob into a directory
#[derive(Debug, Clone)]
pub struct DirectoryUploadService {
    dir: PathBuf,
    prefix: String,
}

impl DirectoryUploadService {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl UploadService for DirectoryUploadService {
    fn deliver(&self, blob: &AudioBlob) -> Result<BlobReference, RecordingError> {
        let extension = if blob.mime_type == WAV_MIME_TYPE {
            "wav"
        } else {
            "bin"
        };
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = self
            .dir
            .join(format!("{}-{}.{}", self.prefix, millis, extension));

        std::fs::write(&path, &blob.bytes).map_err(|err| RecordingError::DeliveryFailed {
            reason: format!("{}: {}", path.display(), err),
        })?;
        Ok(BlobReference(path.display().to_string()))
    }
}

#[cfg(test)]
#[path = "recording_tests.rs"]
mod tests;
