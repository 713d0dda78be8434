/**
 * Workspace Sync Handlers
 *
 * - `POST /workspaces/{id}/updates` - merge a client delta and fan it out
 * - `POST /workspaces/{id}/state`   - return what a client's state vector lacks
 *
 * Both bodies carry base64 payloads. Anything that fails to decode is
 * answered with 400 and leaves the workspace untouched.
 */

use crate::backend::collab::registry::WorkspaceRegistry;
use crate::backend::error::BackendError;
use crate::backend::middleware::AuthUser;
use crate::shared::wire::SESSION_HEADER;
use crate::shared::{StateRequest, StateResponse, UpdateRequest, UpdateResponse};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Session id a client attached to its update, used to avoid echoing it back
pub fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

/// Handle `POST /workspaces/{id}/updates`
pub async fn handle_update(
    State(registry): State<Arc<WorkspaceRegistry>>,
    Path(workspace_id): Path<String>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
    Json(body): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, BackendError> {
    let delta = body.delta()?;
    let source = session_from_headers(&headers);

    let delivered = registry
        .apply_client_delta(&workspace_id, &delta, source)
        .await
        .map_err(|e| {
            tracing::warn!(
                "[Hub] Rejected delta from {} for {}: {}",
                user.subject,
                workspace_id,
                e
            );
            e
        })?;

    tracing::debug!(
        "[Hub] Merged {} byte delta into {} from {}, fanned out to {}",
        delta.len(),
        workspace_id,
        user.subject,
        delivered
    );
    Ok(Json(UpdateResponse { success: true }))
}

/// Handle `POST /workspaces/{id}/state`
pub async fn handle_state(
    State(registry): State<Arc<WorkspaceRegistry>>,
    Path(workspace_id): Path<String>,
    Json(body): Json<StateRequest>,
) -> Result<Json<StateResponse>, BackendError> {
    let state_vector = body.state_vector()?;
    let exchange = registry
        .compute_missing_delta(&workspace_id, &state_vector)
        .await?;

    tracing::debug!(
        "[Hub] State exchange for {}: {} bytes missing",
        workspace_id,
        exchange.missing.len()
    );
    Ok(Json(StateResponse::new(&exchange.missing, &exchange.state_vector)))
}

/// Handle `GET /health`
pub async fn handle_health(State(registry): State<Arc<WorkspaceRegistry>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "workspaces": registry.len().await,
    }))
}
