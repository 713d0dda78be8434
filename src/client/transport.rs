//! # Sync Transport
//!
//! The seam between the replica manager and the network. The manager only
//! ever talks to a [`SyncTransport`]; [`HttpTransport`](super::http::HttpTransport)
//! implements it over the workspace endpoints, and the in-process loopback
//! transport used by tests implements it directly against a hub registry.

use crate::shared::{Delta, ReplicaError};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Push stream of deltas for one workspace
///
/// The first item is the server's full state. The stream ends when the
/// connection drops.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, TransportError>> + Send>>;

/// Failures talking to the sync server
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("undecodable payload: {0}")]
    Decode(#[from] ReplicaError),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn network(message: impl ToString) -> Self {
        Self::Network(message.to_string())
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Whether reconnecting later may succeed
    ///
    /// Client errors (rejected credentials, rejected payloads) will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Closed => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            TransportError::Decode(_) => false,
        }
    }
}

/// Result of a state-vector exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateExchange {
    /// Delta the requester is missing, empty when current
    pub missing: Delta,
    /// The server's state vector, when it reports one
    pub server_state_vector: Option<Vec<u8>>,
}

/// Client side of the sync protocol
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Exchange state vectors and fetch what this replica is missing
    async fn fetch_missing(&self, workspace_id: &str, state_vector: &[u8]) -> Result<StateExchange, TransportError>;

    /// Send one local delta to the server
    async fn send_update(&self, workspace_id: &str, delta: &[u8], session: Uuid) -> Result<(), TransportError>;

    /// Open the push stream; deltas produced by `session` are not echoed back
    async fn subscribe(&self, workspace_id: &str, session: Uuid) -> Result<DeltaStream, TransportError>;
}
