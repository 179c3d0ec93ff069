//! Capture backends feeding the engine core.

use crate::audio::CaptureChannels;
use crate::error::AudioError;

/// Context provided to capture backends when the engine starts.
///
/// The backend owns the capture half of the buffer pool for as long as it
/// runs; the engine's processing thread owns the other half.
pub struct BackendStartContext {
    pub capture: CaptureChannels,
}

/// Trait implemented by platform-specific capture backends.
///
/// A backend delivers mono blocks into [`BackendStartContext::capture`]
/// from `start` until `stop` returns.
pub trait AudioBackend: Send + Sync {
    fn start(&self, ctx: BackendStartContext) -> Result<(), AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
    /// Sample rate of delivered blocks
    fn sample_rate(&self) -> u32;
    fn is_running(&self) -> bool;
}

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalBackend;

mod desktop_stub;
pub use desktop_stub::{DesktopStubBackend, SyntheticSignal};
