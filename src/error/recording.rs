// Recording error types and constants

use crate::error::{AudioError, ErrorCode};
use log::error;
use std::fmt;

/// Recording error code constants
///
/// Error code range: 4001-4004
pub struct RecordingErrorCodes {}

impl RecordingErrorCodes {
    /// No finalized blob is available for delivery
    pub const NOTHING_TO_DELIVER: i32 = 4001;

    /// Encoding the accumulated chunks failed
    pub const ENCODE_FAILED: i32 = 4002;

    /// The upload service rejected the blob
    pub const DELIVERY_FAILED: i32 = 4003;

    /// The capture device failed
    pub const CAPTURE_FAILED: i32 = 4004;
}

/// Log a recording error with structured context
pub fn log_recording_error(err: &RecordingError, context: &str) {
    error!(
        "Recording error in {}: code={}, component=RecordingSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Recording session errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingError {
    /// Delivery requested before the session was stopped
    NothingToDeliver,

    /// WAV encoding of the accumulated buffer failed
    EncodeFailed { reason: String },

    /// Upload/storage service returned an error
    DeliveryFailed { reason: String },

    /// The capture device could not be acquired
    Capture(AudioError),
}

impl ErrorCode for RecordingError {
    fn code(&self) -> i32 {
        match self {
            RecordingError::NothingToDeliver => RecordingErrorCodes::NOTHING_TO_DELIVER,
            RecordingError::EncodeFailed { .. } => RecordingErrorCodes::ENCODE_FAILED,
            RecordingError::DeliveryFailed { .. } => RecordingErrorCodes::DELIVERY_FAILED,
            RecordingError::Capture(_) => RecordingErrorCodes::CAPTURE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            RecordingError::NothingToDeliver => {
                "No finalized recording to deliver. Call stop() first.".to_string()
            }
            RecordingError::EncodeFailed { reason } => {
                format!("Failed to encode recording: {}", reason)
            }
            RecordingError::DeliveryFailed { reason } => {
                format!("Upload failed: {}", reason)
            }
            RecordingError::Capture(err) => format!("Capture failed: {}", err.message()),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RecordingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordingError::Capture(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AudioError> for RecordingError {
    fn from(err: AudioError) -> Self {
        RecordingError::Capture(err)
    }
}

impl From<hound::Error> for RecordingError {
    fn from(err: hound::Error) -> Self {
        RecordingError::EncodeFailed {
            reason: err.to_string(),
        }
    }
}
