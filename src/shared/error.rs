//! Shared Error Types
//!
//! Failures of the replica document and the wire codec, which can occur on
//! either side of the connection.
//!
//! # Usage
//!
//! ```rust
//! use xfcanvas::shared::error::ReplicaError;
//!
//! let error = ReplicaError::malformed_delta("unexpected end of buffer");
//! assert!(error.to_string().contains("unexpected end of buffer"));
//! ```
use thiserror::Error;

/// Errors produced while decoding or applying replica deltas
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReplicaError {
    /// The payload could not be decoded as a delta, or the decoded delta
    /// could not be integrated into the document.
    #[error("Malformed delta: {message}")]
    MalformedDelta {
        /// Decoder message
        message: String,
    },

    /// The payload could not be decoded as a logical clock snapshot
    #[error("Malformed state vector: {message}")]
    MalformedStateVector {
        /// Decoder message
        message: String,
    },
}

impl ReplicaError {
    /// Create a new malformed delta error
    pub fn malformed_delta(message: impl Into<String>) -> Self {
        Self::MalformedDelta {
            message: message.into(),
        }
    }

    /// Create a new malformed state vector error
    pub fn malformed_state_vector(message: impl Into<String>) -> Self {
        Self::MalformedStateVector {
            message: message.into(),
        }
    }
}
