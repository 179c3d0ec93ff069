//! Frame clocks - sources of display refresh ticks
//!
//! A clock runs each requested callback once, on its next tick. Callbacks
//! that want another frame request again from inside the callback.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Callback run on the next tick with the tick time
pub type FrameCallback = Box<dyn FnOnce(Instant) + Send + 'static>;

pub trait FrameClock: Send + Sync {
    fn request_frame(&self, callback: FrameCallback);
}

/// Clock advanced explicitly by the host (or a test)
#[derive(Default)]
pub struct ManualFrameClock {
    pending: Mutex<Vec<FrameCallback>>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback requested before this tick; returns how many ran
    ///
    /// Callbacks requested while the tick runs wait for the next tick.
    pub fn tick(&self) -> usize {
        let due = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => {
                log::error!("[ManualFrameClock] Pending list poisoned");
                return 0;
            }
        };
        let now = Instant::now();
        let count = due.len();
        for callback in due {
            callback(now);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl FrameClock for ManualFrameClock {
    fn request_frame(&self, callback: FrameCallback) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(callback);
        }
    }
}

/// Clock ticking at a fixed rate on a tokio runtime
pub struct IntervalFrameClock {
    handle: tokio::runtime::Handle,
    period: Duration,
}

impl IntervalFrameClock {
    /// # Arguments
    /// * `handle` - Runtime the timer tasks are spawned on
    /// * `frame_rate` - Ticks per second (0 is treated as 1)
    pub fn new(handle: tokio::runtime::Handle, frame_rate: u32) -> Self {
        Self {
            handle,
            period: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameClock for IntervalFrameClock {
    fn request_frame(&self, callback: FrameCallback) {
        let period = self.period;
        self.handle.spawn(async move {
            tokio::time::sleep(period).await;
            callback(Instant::now());
        });
    }
}
