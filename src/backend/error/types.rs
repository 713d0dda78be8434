/**
 * Backend Error Types
 *
 * Errors returned by HTTP handlers and middleware. Each variant maps to one
 * HTTP status code so handlers can use `?` on replica and persistence
 * results and let the conversion produce the response.
 *
 * # Status Mapping
 *
 * - `MalformedDelta` - 400, undecodable base64, delta or state vector
 * - `Unauthorized` - 401, missing or invalid bearer token
 * - `Persistence` - 500
 */

use crate::backend::persistence::PersistenceError;
use crate::shared::ReplicaError;
use axum::http::StatusCode;
use thiserror::Error;

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request carried bytes no replica can decode
    #[error(transparent)]
    MalformedDelta(#[from] ReplicaError),

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl BackendError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedDelta(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message placed in the response body
    pub fn message(&self) -> String {
        match self {
            Self::MalformedDelta(err) => err.to_string(),
            Self::Unauthorized { message } => message.clone(),
            // Database details stay in the logs
            Self::Persistence(_) => "Persistence failure".to_string(),
        }
    }
}
