// Error types for the soundscope core
//
// This module defines custom error types for the signal graph, audio capture
// and recording operations. Every error carries a stable numeric code so the
// UI shell can branch on it without parsing messages.

mod audio;
mod graph;
mod recording;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use graph::{log_graph_error, GraphError, GraphErrorCodes};
pub use recording::{log_recording_error, RecordingError, RecordingErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the host boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
