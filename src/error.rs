// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Tickscope
//!
//! Every anomaly in the engine is recoverable and reported through an
//! explicit result. Nothing here is meant to terminate the process.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A channel id that is not in the registry
    #[error("Invalid channel reference: {0}")]
    InvalidChannelReference(String),

    /// A channel-group id with no registered channels
    #[error("Unknown channel group: {0}")]
    UnknownGroup(String),

    /// Average utilization requested over a group with no active channel
    #[error("No active channels in group: {0}")]
    EmptyActiveSet(String),

    /// Append older than the newest item in a window
    #[error("Out-of-order sample: {timestamp_ms} ms is older than {last_ms} ms")]
    OutOfOrderSample { last_ms: u64, timestamp_ms: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error points at an id the caller supplied.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidChannelReference(_) | EngineError::UnknownGroup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidChannelReference("dma.9".to_string());
        assert_eq!(err.to_string(), "Invalid channel reference: dma.9");

        let err = EngineError::EmptyActiveSet("dma".to_string());
        assert!(err.to_string().contains("dma"));
    }

    #[test]
    fn test_reference_errors() {
        assert!(EngineError::UnknownGroup("gpu".into()).is_reference_error());
        assert!(EngineError::InvalidChannelReference("x".into()).is_reference_error());
        assert!(!EngineError::InvalidConfig("bad".into()).is_reference_error());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::Json(_)));
    }
}
