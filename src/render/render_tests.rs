use super::*;
use crate::graph::SpectrumAnalyzer;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

/// Painter that only counts calls
struct CountingPainter {
    calls: Arc<AtomicUsize>,
}

impl Painter for CountingPainter {
    fn paint(&mut self, _now: Instant) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_loop() -> (RenderLoop<ManualFrameClock, CountingPainter>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let render_loop = RenderLoop::new(
        ManualFrameClock::new(),
        CountingPainter {
            calls: Arc::clone(&calls),
        },
    );
    (render_loop, calls)
}

#[test]
fn test_one_paint_per_tick() {
    let (render_loop, calls) = counting_loop();
    render_loop.start();
    assert!(render_loop.is_running());

    for expected in 1..=5 {
        render_loop.clock().tick();
        assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
    assert_eq!(render_loop.clock().pending(), 1);
}

#[test]
fn test_stop_cancels_pending_tick() {
    let (render_loop, calls) = counting_loop();
    render_loop.start();
    render_loop.clock().tick();
    render_loop.clock().tick();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    render_loop.stop();
    assert!(!render_loop.is_running());
    for _ in 0..5 {
        render_loop.clock().tick();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The cancelled tick did not reschedule itself
    assert_eq!(render_loop.clock().pending(), 0);
}

#[test]
fn test_restart_supersedes_previous_loop() {
    let (render_loop, calls) = counting_loop();
    render_loop.start();
    render_loop.start();
    assert_eq!(render_loop.clock().pending(), 2);

    render_loop.clock().tick();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(render_loop.clock().pending(), 1);

    render_loop.clock().tick();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dropped_loop_never_paints() {
    let calls = Arc::new(AtomicUsize::new(0));
    let clock = Arc::new(ManualFrameClock::new());

    struct SharedClock(Arc<ManualFrameClock>);
    impl FrameClock for SharedClock {
        fn request_frame(&self, callback: FrameCallback) {
            self.0.request_frame(callback);
        }
    }

    let render_loop = RenderLoop::new(
        SharedClock(Arc::clone(&clock)),
        CountingPainter {
            calls: Arc::clone(&calls),
        },
    );
    render_loop.start();
    drop(render_loop);

    clock.tick();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(clock.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interval_clock_loop_stops_within_one_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let clock = IntervalFrameClock::new(tokio::runtime::Handle::current(), 200);
    let render_loop = RenderLoop::new(
        clock,
        CountingPainter {
            calls: Arc::clone(&calls),
        },
    );

    render_loop.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    render_loop.stop();
    let at_stop = calls.load(Ordering::SeqCst);
    assert!(at_stop > 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), at_stop);
}

#[test]
fn test_spectrogram_scrolls_and_maps_magnitude() {
    let config = RenderConfig {
        width: 4,
        height: 8,
        fft_size: 64,
        smoothing: 0.0,
        gain: 1.0,
        offset: 0.0,
        ..RenderConfig::default()
    };
    let mut analyzer = SpectrumAnalyzer::from_config(&config);
    let mut painter = SpectrogramPainter::new(analyzer.tap(), &config);

    // Silence: rightmost column is the bottom of the ramp
    analyzer.push(&[0.0; 64]);
    analyzer.update();
    painter.paint(Instant::now());
    assert_eq!(painter.spectrogram().pixel(3, 0), Some(DEEP_BLUE));

    // Loud full-band click: rightmost column brightens, old column scrolls left
    let mut click = vec![0.0f32; 64];
    click[32] = 1.0;
    analyzer.push(&click);
    analyzer.update();
    painter.paint(Instant::now());

    assert_eq!(painter.frames_painted(), 2);
    assert_eq!(painter.spectrogram().pixel(2, 0), Some(DEEP_BLUE));
    assert_ne!(painter.spectrogram().pixel(3, 7), Some(DEEP_BLUE));
}

#[test]
fn test_gain_and_offset_boost() {
    let config = RenderConfig {
        width: 2,
        height: 2,
        fft_size: 64,
        gain: 0.0,
        offset: 1.0,
        ..RenderConfig::default()
    };
    let analyzer = SpectrumAnalyzer::from_config(&config);
    let mut painter = SpectrogramPainter::new(analyzer.tap(), &config);
    painter.paint(Instant::now());
    assert_eq!(painter.spectrogram().pixel(1, 1), Some(RED));

    painter.set_boost(0.0, 0.5);
    painter.paint(Instant::now());
    assert_eq!(painter.spectrogram().pixel(1, 1), Some(GREEN));
    assert_eq!(painter.spectrogram().pixel(0, 1), Some(RED));
}
