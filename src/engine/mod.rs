//! Engine module housing the reusable audio core.
//!
//! This module exposes trait-based capture backends (`backend`) and the
//! `EngineHandle` orchestration layer (`core`) shared by the CLI and hosts.

pub mod backend;
pub mod core;

#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{AudioBackend, BackendStartContext, DesktopStubBackend, SyntheticSignal};
pub use self::core::{EngineCapture, EngineHandle, TelemetryEvent, TelemetryEventKind};
