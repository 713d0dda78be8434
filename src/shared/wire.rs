//! Wire Types
//!
//! JSON bodies exchanged with the update and state endpoints, and the base64
//! codec used to carry binary deltas and state vectors inside them.
//!
//! # Endpoints
//!
//! - `POST /workspaces/{id}/updates` - [`UpdateRequest`] -> [`UpdateResponse`]
//! - `POST /workspaces/{id}/state`   - [`StateRequest`] -> [`StateResponse`]
//! - `GET  /workspaces/{id}/events`  - SSE, event [`DELTA_EVENT`], data = base64 delta

use crate::shared::error::ReplicaError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// SSE event name carrying a base64 delta
pub const DELTA_EVENT: &str = "delta-update";

/// Header naming the subscriber session that produced an update
pub const SESSION_HEADER: &str = "x-sync-session";

/// Encode bytes for transport
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 delta, rejecting payloads that are not valid base64
pub fn decode_delta(encoded: &str) -> Result<Vec<u8>, ReplicaError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| ReplicaError::malformed_delta(format!("invalid base64: {}", e)))
}

/// Decode a base64 state vector
pub fn decode_state_vector(encoded: &str) -> Result<Vec<u8>, ReplicaError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| ReplicaError::malformed_state_vector(format!("invalid base64: {}", e)))
}

/// Body of `POST /workspaces/{id}/updates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub update: String,
}

impl UpdateRequest {
    pub fn from_delta(delta: &[u8]) -> Self {
        Self {
            update: encode_base64(delta),
        }
    }

    pub fn delta(&self) -> Result<Vec<u8>, ReplicaError> {
        decode_delta(&self.update)
    }
}

/// Response of `POST /workspaces/{id}/updates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
}

/// Body of `POST /workspaces/{id}/state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRequest {
    pub state_vector: String,
}

impl StateRequest {
    pub fn from_state_vector(state_vector: &[u8]) -> Self {
        Self {
            state_vector: encode_base64(state_vector),
        }
    }

    pub fn state_vector(&self) -> Result<Vec<u8>, ReplicaError> {
        decode_state_vector(&self.state_vector)
    }
}

/// Response of `POST /workspaces/{id}/state`
///
/// `update` is omitted when the requester is already current. The server's
/// own state vector lets the requester push back anything the server lacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_vector: Option<String>,
}

impl StateResponse {
    pub fn new(missing: &[u8], server_state_vector: &[u8]) -> Self {
        Self {
            update: (!missing.is_empty()).then(|| encode_base64(missing)),
            state_vector: Some(encode_base64(server_state_vector)),
        }
    }

    /// Missing delta, empty when the requester was current
    pub fn delta(&self) -> Result<Vec<u8>, ReplicaError> {
        match &self.update {
            Some(update) if !update.is_empty() => decode_delta(update),
            _ => Ok(Vec::new()),
        }
    }

    pub fn server_state_vector(&self) -> Result<Option<Vec<u8>>, ReplicaError> {
        self.state_vector.as_deref().map(decode_state_vector).transpose()
    }
}
