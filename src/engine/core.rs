//! EngineHandle: capture → signal graph → stages orchestration layer.
//!
//! The handle owns one [`AudioSource`] bound into a [`SignalGraph`] with
//! three stages fanned out from it: the parametric filter, the analyzer tap
//! used for rendering, and the analysis stage (extractor → aggregator →
//! classifier). A capture backend fills the lock-free buffer pool; a
//! processing thread drains it and dispatches every block to the graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::classifier::ClassificationMode;
use crate::analysis::features::FeatureFrame;
use crate::analysis::{AnalysisStage, AnalysisTap, ClassificationResult};
use crate::audio::{BufferPool, PoolStats, ProcessingChannels};
use crate::config::AppConfig;
#[cfg(not(target_os = "android"))]
use crate::engine::backend::CpalBackend;
use crate::engine::backend::{AudioBackend, BackendStartContext};
use crate::error::{log_audio_error, log_graph_error, AudioError, GraphError};
use crate::filter::{FilterConfig, FilterStage};
use crate::graph::{AnalyzerStage, AnalyzerTap, AudioSource, GraphHandle, SignalGraph, StageRef};
use crate::recording::CaptureDevice;

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

const FRAME_CHANNEL_CAPACITY: usize = 256;
const RESULT_CHANNEL_CAPACITY: usize = 32;
const TELEMETRY_CHANNEL_CAPACITY: usize = 64;

/// Telemetry event emitted by the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    EngineStarted { sample_rate: u32 },
    EngineStopped { blocks: u64, overruns: u64 },
    FilterChanged,
    FilterToggled { enabled: bool },
    Warning,
}

struct ProcessingWorker {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    stats: Arc<PoolStats>,
}

/// EngineHandle orchestrates capture, the signal graph and the event channels.
pub struct EngineHandle {
    config: AppConfig,
    backend: Arc<dyn AudioBackend>,
    graph: Arc<SignalGraph>,
    source: Arc<AudioSource>,
    handle: GraphHandle,
    filter: Arc<Mutex<FilterStage>>,
    analysis: Arc<Mutex<AnalysisStage>>,
    analyzer_tap: AnalyzerTap,
    analysis_tap: AnalysisTap,
    frame_tx: broadcast::Sender<FeatureFrame>,
    result_tx: broadcast::Sender<ClassificationResult>,
    telemetry_tx: broadcast::Sender<TelemetryEvent>,
    worker: Mutex<Option<ProcessingWorker>>,
    running: AtomicBool,
    start_instant: Instant,
}

impl EngineHandle {
    /// Engine on the platform capture backend, configured from the default
    /// config file.
    #[cfg(not(target_os = "android"))]
    pub fn new() -> Result<Self, GraphError> {
        let config = AppConfig::load();
        let backend = Arc::new(CpalBackend::new(config.extractor.sample_rate));
        Self::with_backend(config, backend)
    }

    /// Engine on an explicit backend
    ///
    /// Binds a fresh source and attaches the filter, analyzer and analysis
    /// stages.
    pub fn with_backend(
        config: AppConfig,
        backend: Arc<dyn AudioBackend>,
    ) -> Result<Self, GraphError> {
        let config = config.sanitized();
        let sample_rate = backend.sample_rate();
        let mut analysis_config = config.clone();
        analysis_config.extractor.sample_rate = sample_rate;

        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (result_tx, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let (telemetry_tx, _) = broadcast::channel(TELEMETRY_CHANNEL_CAPACITY);

        let filter_stage = FilterStage::new(FilterConfig::default(), sample_rate, &config.render);
        let analyzer_stage = AnalyzerStage::new(&config.render);
        let analysis_stage = AnalysisStage::new(&analysis_config)
            .with_frame_sender(frame_tx.clone())
            .with_result_sender(result_tx.clone());

        let analyzer_tap = analyzer_stage.tap();
        let analysis_tap = analysis_stage.tap();
        let filter = Arc::new(Mutex::new(filter_stage));
        let analyzer = Arc::new(Mutex::new(analyzer_stage));
        let analysis = Arc::new(Mutex::new(analysis_stage));

        let graph = Arc::new(SignalGraph::new());
        let source = AudioSource::new(sample_rate);
        let handle = graph.bind(&source)?;
        graph.attach_stage(handle, filter.clone() as StageRef)?;
        graph.attach_stage(handle, analyzer as StageRef)?;
        graph.attach_stage(handle, analysis.clone() as StageRef)?;

        Ok(Self {
            config,
            backend,
            graph,
            source,
            handle,
            filter,
            analysis,
            analyzer_tap,
            analysis_tap,
            frame_tx,
            result_tx,
            telemetry_tx,
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
            start_instant: Instant::now(),
        })
    }

    fn emit_event(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;
        let _ = self.telemetry_tx.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    fn worker_slot(&self) -> Result<MutexGuard<'_, Option<ProcessingWorker>>, AudioError> {
        self.worker.lock().map_err(|_| AudioError::LockPoisoned {
            component: "processing_worker".to_string(),
        })
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start capture and the processing thread
    pub fn start(&self) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let (capture, processing, stats) =
            BufferPool::new(self.config.audio.buffer_pool_size, self.config.audio.block_size);
        let shutdown = Arc::new(AtomicBool::new(false));
        let join = match spawn_processing_thread(
            processing,
            Arc::clone(&self.graph),
            self.handle,
            Arc::clone(&shutdown),
        ) {
            Ok(join) => join,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        if let Err(err) = self.backend.start(BackendStartContext { capture }) {
            shutdown.store(true, Ordering::SeqCst);
            let _ = join.join();
            self.running.store(false, Ordering::SeqCst);
            log_audio_error(&err, "EngineHandle::start");
            return Err(err);
        }

        *self.worker_slot()? = Some(ProcessingWorker {
            shutdown,
            join,
            stats,
        });

        let sample_rate = self.source.sample_rate();
        tracing::info!("[EngineHandle] Engine started at {} Hz", sample_rate);
        self.emit_event(TelemetryEventKind::EngineStarted { sample_rate }, None);
        Ok(())
    }

    /// Stop capture, then drain and join the processing thread
    pub fn stop(&self) -> Result<(), AudioError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::NotRunning);
        }

        let backend_result = self.backend.stop();
        let worker = self.worker_slot()?.take();
        self.running.store(false, Ordering::SeqCst);

        let (blocks, overruns) = match worker {
            Some(worker) => {
                worker.shutdown.store(true, Ordering::SeqCst);
                if worker.join.join().is_err() {
                    tracing::error!("[EngineHandle] Processing thread panicked");
                }
                (worker.stats.blocks_delivered(), worker.stats.overruns())
            }
            None => (0, 0),
        };

        tracing::info!(
            "[EngineHandle] Engine stopped ({} blocks, {} overruns)",
            blocks,
            overruns
        );
        self.emit_event(TelemetryEventKind::EngineStopped { blocks, overruns }, None);

        match backend_result {
            // Backend that already wound down on its own
            Err(AudioError::NotRunning) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocks dispatched to the graph since the last `start`
    pub fn blocks_processed(&self) -> u64 {
        self.worker
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(|w| w.stats.blocks_delivered()))
            .unwrap_or(0)
    }

    /// Wait until at least `blocks` blocks went through the graph
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_for_blocks(&self, blocks: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.blocks_processed() < blocks {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }

    // ========================================================================
    // FILTER CONTROL
    // ========================================================================

    /// Apply new filter parameters from the next block (values are clamped)
    pub fn configure_filter(&self, config: FilterConfig) -> Result<(), AudioError> {
        self.filter_stage()?.configure(config);
        self.emit_event(TelemetryEventKind::FilterChanged, None);
        Ok(())
    }

    /// Enable or bypass the filter without detaching it
    pub fn toggle_filter(&self, enabled: bool) -> Result<(), AudioError> {
        self.filter_stage()?.toggle(enabled);
        self.emit_event(TelemetryEventKind::FilterToggled { enabled }, None);
        Ok(())
    }

    pub fn filter_config(&self) -> Result<FilterConfig, AudioError> {
        Ok(self.filter_stage()?.config())
    }

    /// Filter response in dB at `freq`, for drawing the filter curve
    pub fn filter_response(&self, freq: f32) -> Result<f32, AudioError> {
        Ok(self.filter_stage()?.magnitude_response(freq))
    }

    /// Visualization of the filtered signal
    pub fn filter_tap(&self) -> Result<AnalyzerTap, AudioError> {
        Ok(self.filter_stage()?.tap())
    }

    fn filter_stage(&self) -> Result<MutexGuard<'_, FilterStage>, AudioError> {
        self.filter.lock().map_err(|_| AudioError::LockPoisoned {
            component: "filter_stage".to_string(),
        })
    }

    // ========================================================================
    // ANALYSIS
    // ========================================================================

    pub fn set_classification_mode(&self, mode: ClassificationMode) -> Result<(), AudioError> {
        self.analysis
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "analysis_stage".to_string(),
            })?
            .set_mode(mode);
        Ok(())
    }

    /// Latest classification, if any window completed
    pub fn latest_classification(&self) -> Option<ClassificationResult> {
        self.analysis_tap.latest_result()
    }

    /// Smoothed magnitude snapshot of the raw signal
    pub fn analyzer_tap(&self) -> AnalyzerTap {
        self.analyzer_tap.clone()
    }

    /// Polling view of the latest frame and classification
    pub fn analysis_tap(&self) -> AnalysisTap {
        self.analysis_tap.clone()
    }

    // ========================================================================
    // GRAPH ACCESS
    // ========================================================================

    /// Fan another stage out from the engine's source
    pub fn attach_stage(&self, stage: StageRef) -> Result<(), GraphError> {
        self.graph.attach_stage(self.handle, stage)
    }

    /// Returns whether the stage was attached
    pub fn detach_stage(&self, stage: &StageRef) -> bool {
        self.graph.detach_stage(self.handle, stage)
    }

    pub fn stage_count(&self) -> usize {
        self.graph.stage_count(self.handle)
    }

    pub fn source(&self) -> &Arc<AudioSource> {
        &self.source
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.stop() {
                log_audio_error(&err, "EngineHandle::drop");
            }
        }
        self.graph.release(self.handle);
    }
}

fn spawn_processing_thread(
    mut channels: ProcessingChannels,
    graph: Arc<SignalGraph>,
    handle: GraphHandle,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, AudioError> {
    std::thread::Builder::new()
        .name("soundscope-processing".to_string())
        .spawn(move || {
            tracing::info!("[ProcessingThread] Starting processing loop");
            let mut failure: Option<GraphError> = None;

            loop {
                let drained = channels.drain(|block| {
                    if failure.is_some() {
                        return;
                    }
                    if let Err(err) = graph.dispatch(handle, block) {
                        failure = Some(err);
                    }
                });

                if let Some(err) = failure.take() {
                    log_graph_error(&err, "ProcessingThread");
                    break;
                }

                if drained == 0 {
                    // Shutdown is only honoured once the queue is empty
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            tracing::info!("[ProcessingThread] Processing loop exited");
        })
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to spawn processing thread: {}", e),
        })
}

/// [`CaptureDevice`] that runs an engine for the length of a recording
///
/// Acquiring starts the engine unless it is already running; releasing
/// stops it only if this device started it. The engine is held weakly, so a
/// session never keeps an otherwise dropped engine alive.
pub struct EngineCapture {
    engine: Weak<EngineHandle>,
    started_here: bool,
}

impl EngineCapture {
    pub fn new(engine: &Arc<EngineHandle>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            started_here: false,
        }
    }
}

impl CaptureDevice for EngineCapture {
    fn acquire(&mut self) -> Result<(), AudioError> {
        let engine = self.engine.upgrade().ok_or_else(|| AudioError::DeviceUnavailable {
            details: "audio engine has been dropped".to_string(),
        })?;
        match engine.start() {
            Ok(()) => {
                self.started_here = true;
                Ok(())
            }
            Err(AudioError::AlreadyRunning) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.started_here) {
            return;
        }
        // A dropped engine already stopped its backend
        if let Some(engine) = self.engine.upgrade() {
            if let Err(err) = engine.stop() {
                log_audio_error(&err, "EngineCapture::release");
            }
        }
    }
}
