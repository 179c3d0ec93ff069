//! Integration tests for the public soundscope API
//!
//! These exercise the pieces together the way an application wires them:
//! - Signal graph binding, fan-out and release
//! - Frame extraction, aggregation and classification
//! - Filter parameter handling
//! - Render loop cancellation
//! - The engine and a recording session running on the synthetic backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use soundscope::analysis::aggregator::{FeatureAggregator, WindowStats};
use soundscope::analysis::classifier::{Classify, RuleClassifier};
use soundscope::analysis::features::expected_frame_count;
use soundscope::config::{AggregatorConfig, ExtractorConfig, RenderConfig};
use soundscope::engine::{DesktopStubBackend, EngineCapture, SyntheticSignal};
use soundscope::graph::SpectrumAnalyzer;
use soundscope::recording::{RecordingStage, WAV_MIME_TYPE};
use soundscope::render::{ManualFrameClock, Painter, SpectrogramPainter, DEEP_BLUE};
use soundscope::{
    AppConfig, AudioSource, ContentLabel, EngineHandle, FeatureFrame, FilterConfig, FilterStage,
    FilterType, FrameExtractor, GraphError, RecordingSession, RecordingState, RenderLoop,
    SignalGraph, Stage, StageRef,
};

const SAMPLE_RATE: u32 = 16000;
const BLOCK: usize = 256;

/// Stage that counts the samples it was given
struct SampleCounter {
    seen: Arc<AtomicUsize>,
}

impl Stage for SampleCounter {
    fn name(&self) -> &'static str {
        "sample-counter"
    }

    fn process(&mut self, block: &[f32]) {
        self.seen.fetch_add(block.len(), Ordering::SeqCst);
    }
}

fn counter() -> (StageRef, Arc<AtomicUsize>) {
    let seen = Arc::new(AtomicUsize::new(0));
    let stage: StageRef = Arc::new(Mutex::new(SampleCounter {
        seen: Arc::clone(&seen),
    }));
    (stage, seen)
}

fn tone(frequency: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            amplitude * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin()
        })
        .collect()
}

fn stats(rms: f32, centroid: f32, zcr: f32, mfcc_std_dev: f32) -> WindowStats {
    WindowStats {
        mean_rms: rms,
        mean_energy: rms * rms,
        mean_spectral_centroid: centroid,
        mean_spectral_flatness: 0.2,
        mean_zcr: zcr,
        mfcc_std_dev,
        frame_count: 20,
    }
}

// ============================================================================
// Signal graph
// ============================================================================

#[test]
fn test_source_binds_at_most_once() {
    let graph = SignalGraph::new();
    let source = AudioSource::new(SAMPLE_RATE);

    let handle = graph.bind(&source).unwrap();
    assert!(matches!(
        graph.bind(&source),
        Err(GraphError::AlreadyBound { .. })
    ));

    // Releasing does not make the source bindable again
    assert!(graph.release(handle));
    assert!(matches!(
        graph.bind(&source),
        Err(GraphError::AlreadyBound { .. })
    ));
    assert!(source.is_bound());
}

#[test]
fn test_every_stage_sees_every_block_until_detached() {
    let graph = SignalGraph::new();
    let source = AudioSource::new(SAMPLE_RATE);
    let handle = graph.bind(&source).unwrap();

    let (first, first_seen) = counter();
    let (second, second_seen) = counter();
    graph.attach_stage(handle, Arc::clone(&first)).unwrap();
    graph.attach_stage(handle, Arc::clone(&second)).unwrap();

    let block = vec![0.1f32; BLOCK];
    assert_eq!(graph.dispatch(handle, &block).unwrap(), 2);
    assert!(graph.detach_stage(handle, &first));
    assert_eq!(graph.dispatch(handle, &block).unwrap(), 1);

    assert_eq!(first_seen.load(Ordering::SeqCst), BLOCK);
    assert_eq!(second_seen.load(Ordering::SeqCst), 2 * BLOCK);
}

#[test]
fn test_released_handle_rejects_stages_and_blocks() {
    let graph = SignalGraph::new();
    let source = AudioSource::new(SAMPLE_RATE);
    let handle = graph.bind(&source).unwrap();
    let (stage, seen) = counter();
    graph.attach_stage(handle, Arc::clone(&stage)).unwrap();

    assert!(graph.release(handle));
    assert!(!graph.release(handle));
    assert!(matches!(
        graph.attach_stage(handle, Arc::clone(&stage)),
        Err(GraphError::Released { .. })
    ));
    assert!(graph.dispatch(handle, &[0.0; 8]).is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    // A stale handle never reaches a binding that reused its slot
    let other = AudioSource::new(SAMPLE_RATE);
    let fresh = graph.bind(&other).unwrap();
    assert_eq!(fresh.slot(), handle.slot());
    assert!(!graph.is_live(handle));
    assert!(graph.is_live(fresh));
}

#[test]
fn test_dropped_source_stops_dispatch() {
    let graph = SignalGraph::new();
    let source = AudioSource::new(SAMPLE_RATE);
    let handle = graph.bind(&source).unwrap();
    drop(source);

    assert_eq!(
        graph.dispatch(handle, &[0.0; 8]),
        Err(GraphError::SourceDropped)
    );
}

// ============================================================================
// Feature extraction and classification
// ============================================================================

#[test]
fn test_frame_count_and_order_for_uneven_blocks() {
    let config = ExtractorConfig {
        buffer_size: 512,
        hop_size: 256,
        sample_rate: 44100,
    };
    let samples = tone(440.0, 0.5, 10_000, 44100);

    let frames: Vec<FeatureFrame> = FrameExtractor::new(&config)
        .frames(samples.chunks(300))
        .collect();

    assert_eq!(frames.len(), expected_frame_count(10_000, 512, 256));
    assert_eq!(frames.len(), 38);
    for (index, frame) in frames.iter().enumerate() {
        assert_eq!(frame.timestamp, index as u64);
    }
}

#[test]
fn test_silence_produces_finite_zero_rms_frames() {
    let mut extractor = FrameExtractor::with_sample_rate(44100);
    let frames: Vec<FeatureFrame> = extractor.process(&[0.0; 2048]).collect();

    assert!(!frames.is_empty());
    for frame in frames {
        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.energy, 0.0);
        assert!(frame.zcr.is_finite());
        assert!(frame.spectral_centroid.is_finite());
        assert!(frame.spectral_flatness.is_finite());
        assert!(frame.mfcc.iter().all(|c| c.is_finite()));
    }
}

#[test]
fn test_aggregator_triggers_every_ten_frames_after_the_first_window() {
    let mut aggregator = FeatureAggregator::new(&AggregatorConfig {
        window_size: 20,
        retain: 10,
    });

    let mut triggers = Vec::new();
    for i in 0..50u64 {
        if let Some(window) = aggregator.push(FeatureFrame::silent(i)) {
            assert_eq!(window.frame_count, 20);
            assert_eq!(aggregator.len(), 10);
            triggers.push(i);
        }
    }
    assert_eq!(triggers, vec![19, 29, 39, 49]);
}

#[test]
fn test_rule_priorities() {
    let classifier = RuleClassifier::new();

    // Silence wins over everything else
    assert_eq!(
        classifier.classify(&stats(0.005, 1500.0, 0.2, 6.0)),
        (ContentLabel::Silence, 0.9)
    );
    // Speech and music both match; speech is checked first
    assert_eq!(
        classifier.classify(&stats(0.2, 2500.0, 0.2, 6.0)),
        (ContentLabel::Speech, 0.8)
    );
    assert_eq!(
        classifier.classify(&stats(0.2, 2500.0, 0.05, 5.0)),
        (ContentLabel::Music, 0.75)
    );
    assert_eq!(
        classifier.classify(&stats(0.2, 1500.0, 0.05, 1.0)),
        (ContentLabel::Noise, 0.7)
    );
    assert_eq!(
        classifier.classify(&stats(0.2, 500.0, 0.05, 10.0)),
        (ContentLabel::Unknown, 0.5)
    );
}

#[test]
fn test_quiet_frames_aggregate_to_silence() {
    let mut aggregator = FeatureAggregator::new(&AggregatorConfig {
        window_size: 20,
        retain: 10,
    });
    let classifier = RuleClassifier::new();

    let mut window = None;
    for i in 0..20u64 {
        window = aggregator.push(FeatureFrame {
            rms: 0.005,
            ..FeatureFrame::silent(i)
        });
    }
    let window = window.expect("twentieth frame completes the window");
    assert_eq!(window.frame_count, 20);
    assert!((window.mean_rms - 0.005).abs() < 1e-6);
    assert_eq!(classifier.classify(&window), (ContentLabel::Silence, 0.9));
}

#[test]
fn test_rule_classifier_is_deterministic() {
    let classifier = RuleClassifier::new();
    let window = stats(0.15, 2200.0, 0.12, 4.0);
    let first = classifier.classify(&window);
    for _ in 0..10 {
        assert_eq!(classifier.classify(&window), first);
    }
}

// ============================================================================
// Filter
// ============================================================================

#[test]
fn test_filter_parameters_are_clamped() {
    let mut filter = FilterStage::new(FilterConfig::default(), 44100, &RenderConfig::default());
    filter.configure(FilterConfig {
        filter_type: FilterType::Peaking,
        frequency: 5.0,
        q: 100.0,
        gain: -90.0,
    });

    let config = filter.config();
    assert_eq!(config.filter_type, FilterType::Peaking);
    assert_eq!(config.frequency, 20.0);
    assert_eq!(config.q, 20.0);
    assert_eq!(config.gain, -40.0);
}

#[test]
fn test_lowpass_attenuates_high_tone() {
    let mut filter = FilterStage::new(
        FilterConfig {
            filter_type: FilterType::Lowpass,
            frequency: 500.0,
            q: 0.707,
            gain: 0.0,
        },
        SAMPLE_RATE,
        &RenderConfig::default(),
    );
    let input = tone(6000.0, 0.8, 4096, SAMPLE_RATE);
    let mut peak = 0.0f32;
    for (index, block) in input.chunks(BLOCK).enumerate() {
        filter.process(block);
        // Skip the onset transient
        if index >= 4 {
            peak = filter.output().iter().fold(peak, |m, s| m.max(s.abs()));
        }
    }
    assert!(peak < 0.1, "lowpass left peak {}", peak);
    assert!(filter.magnitude_response(6000.0) < -20.0);
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn test_spectrogram_loop_stops_painting_after_stop() {
    let mut render = RenderConfig::default();
    render.fft_size = 512;
    render.width = 16;
    render.height = 32;

    let mut analyzer = SpectrumAnalyzer::from_config(&render);
    let painter = SpectrogramPainter::new(analyzer.tap(), &render);
    let render_loop = RenderLoop::new(ManualFrameClock::new(), painter);

    render_loop.start();
    for block in tone(1000.0, 0.8, 4 * 512, SAMPLE_RATE).chunks(512) {
        analyzer.push(block);
        analyzer.update();
        render_loop.clock().tick();
    }
    render_loop.stop();
    for _ in 0..3 {
        render_loop.clock().tick();
    }

    render_loop.with_painter(|painter| {
        assert_eq!(painter.frames_painted(), 4);
        let canvas = painter.spectrogram();
        let column = canvas.width() - 1;
        assert!((0..canvas.height()).any(|y| canvas.pixel(column, y) != Some(DEEP_BLUE)));
    });
}

#[test]
fn test_painter_is_usable_outside_a_loop() {
    let render = RenderConfig {
        width: 8,
        height: 8,
        ..RenderConfig::default()
    };
    let analyzer = SpectrumAnalyzer::from_config(&render);
    let mut painter = SpectrogramPainter::new(analyzer.tap(), &render);
    painter.paint(Instant::now());
    assert_eq!(painter.frames_painted(), 1);
}

// ============================================================================
// Engine and recording on the synthetic backend
// ============================================================================

fn stub_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.extractor.sample_rate = SAMPLE_RATE;
    config.audio.block_size = BLOCK;
    config.audio.buffer_pool_size = 16;
    config.render.fft_size = 512;
    config
}

#[test]
fn test_engine_classifies_a_loud_tone_as_non_silent() {
    let backend = Arc::new(
        DesktopStubBackend::new(
            SAMPLE_RATE,
            BLOCK,
            SyntheticSignal::Tone {
                frequency: 2500.0,
                amplitude: 0.6,
            },
        )
        .with_max_blocks(60),
    );
    let engine = EngineHandle::with_backend(stub_config(), backend.clone()).unwrap();
    let mut frames = engine.subscribe_frames();

    engine.start().unwrap();
    assert!(engine.wait_for_blocks(60, Duration::from_secs(10)));
    engine.stop().unwrap();

    let mut count = 0;
    while let Ok(frame) = frames.try_recv() {
        assert!(frame.rms > 0.3);
        count += 1;
    }
    assert_eq!(count, expected_frame_count(60 * BLOCK, 512, 256));

    let result = engine.latest_classification().unwrap();
    assert_ne!(result.label, ContentLabel::Silence);
    assert!((0.0..=1.0).contains(&result.confidence));
    assert_eq!(backend.blocks_sent(), 60);

    let snapshot = engine.analyzer_tap().latest();
    assert!(snapshot.bins.iter().any(|&b| b > 0));
}

#[test]
fn test_recording_captures_engine_audio() {
    // Non-realtime: the stub only writes when the ring has room, so every block arrives
    let backend = Arc::new(
        DesktopStubBackend::new(
            SAMPLE_RATE,
            BLOCK,
            SyntheticSignal::Tone {
                frequency: 440.0,
                amplitude: 0.5,
            },
        )
        .with_max_blocks(30),
    );
    let engine = Arc::new(EngineHandle::with_backend(stub_config(), backend).unwrap());

    let mut session = RecordingSession::new(EngineCapture::new(&engine), SAMPLE_RATE);
    let stage: StageRef = Arc::new(Mutex::new(RecordingStage::new(session.sink())));
    engine.attach_stage(Arc::clone(&stage)).unwrap();

    session.start().unwrap();
    assert!(engine.is_running());
    assert!(engine.wait_for_blocks(30, Duration::from_secs(10)));
    session.stop().unwrap();
    assert!(!engine.is_running());
    assert!(engine.detach_stage(&stage));

    assert_eq!(session.state(), RecordingState::Stopped);
    let recorded = session.sample_count();
    assert_eq!(recorded, 30 * BLOCK);
    assert_eq!(session.chunk_count(), 30);

    let blob = session.blob().unwrap();
    assert_eq!(blob.mime_type, WAV_MIME_TYPE);
    let reader = hound::WavReader::new(std::io::Cursor::new(blob.bytes.clone())).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.len() as usize, recorded);
}
