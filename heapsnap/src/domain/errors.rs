//! Structured error types for heapsnap
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Address;
use thiserror::Error;

/// Failures while turning a trace into a heap graph
///
/// Everything except `Session` describes a stream that is internally
/// inconsistent; callers must treat it as total capture failure.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No heap dump found for {0}")]
    NoDumpFound(String),

    #[error("Heap dump for {0} started but never completed")]
    DumpIncomplete(String),

    #[error("{channel} blocks out of sequence: expected block {expected}, got {actual}")]
    SequenceGap { channel: &'static str, expected: u32, actual: u32 },

    #[error(
        "Not enough edge data: node {address} declared {declared} edges but only {consumed} were available"
    )]
    NotEnoughEdgeData { address: Address, declared: u32, consumed: u32 },

    #[error("Edge data left over after the last node: {remaining} unconsumed edges")]
    LeftoverEdges { remaining: usize },

    #[error("Node at {0} defined twice")]
    NodeRedefined(Address),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Failures of the tracing resource itself
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create trace session {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to enable provider {provider}: {reason}")]
    EnableFailed { provider: String, reason: String },

    #[error("Failed to dispose trace session: {0}")]
    DisposeFailed(String),

    #[error("Event delivery failed: {0}")]
    ProcessingFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reading or writing a recorded trace
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Malformed trace record on line {line}: {source}")]
    MalformedRecord { line: usize, source: serde_json::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dump_display() {
        let err = CaptureError::NoDumpFound("process PID:1234".to_string());
        assert_eq!(err.to_string(), "No heap dump found for process PID:1234");
    }

    #[test]
    fn test_sequence_gap_display() {
        let err = CaptureError::SequenceGap { channel: "node", expected: 2, actual: 3 };
        assert!(err.to_string().contains("expected block 2"));
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn test_session_error_converts() {
        let err: CaptureError = SessionError::DisposeFailed("busy".to_string()).into();
        assert!(err.to_string().contains("busy"));
    }
}
