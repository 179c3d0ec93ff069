// Signal graph error types and constants
//
// Both variants here are programmer errors: a caller re-binding a source or
// touching a released handle has a bug. They are surfaced to the caller and
// logged at error level, never retried.

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Signal graph error code constants
///
/// Error code range: 3001-3003
pub struct GraphErrorCodes {}

impl GraphErrorCodes {
    /// The audio source already has a processing graph bound to it
    pub const ALREADY_BOUND: i32 = 3001;

    /// The graph handle was released
    pub const RELEASED: i32 = 3002;

    /// The caller dropped the audio source before binding
    pub const SOURCE_DROPPED: i32 = 3003;
}

/// Log a graph error with structured context
pub fn log_graph_error(err: &GraphError, context: &str) {
    error!(
        "Graph error in {}: code={}, component=SignalGraph, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Signal graph errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The source already has an active (or past) binding
    AlreadyBound { source_id: u64 },

    /// The handle refers to a graph that has been released
    Released { slot: usize },

    /// The source is no longer alive
    SourceDropped,
}

impl ErrorCode for GraphError {
    fn code(&self) -> i32 {
        match self {
            GraphError::AlreadyBound { .. } => GraphErrorCodes::ALREADY_BOUND,
            GraphError::Released { .. } => GraphErrorCodes::RELEASED,
            GraphError::SourceDropped => GraphErrorCodes::SOURCE_DROPPED,
        }
    }

    fn message(&self) -> String {
        match self {
            GraphError::AlreadyBound { source_id } => format!(
                "Audio source {} is already bound to a processing graph",
                source_id
            ),
            GraphError::Released { slot } => {
                format!("Graph handle for slot {} has been released", slot)
            }
            GraphError::SourceDropped => "Audio source was dropped".to_string(),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GraphError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for GraphError {}
