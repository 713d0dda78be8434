/**
 * Router Configuration
 *
 * Assembles every route into one axum router.
 *
 * # Routes
 *
 * - `GET  /health` - liveness, unauthenticated
 * - `GET  /workspaces/{id}/events` - SSE push stream
 * - `POST /workspaces/{id}/updates` - submit a delta
 * - `POST /workspaces/{id}/state` - state reconciliation
 *
 * The workspace routes sit behind the auth middleware. Tracing and CORS
 * layers wrap everything.
 */

use crate::backend::collab::{handle_health, handle_state, handle_update};
use crate::backend::middleware::auth_middleware;
use crate::backend::realtime::handle_workspace_events;
use crate::backend::server::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// CORS policy for the configured origins; any origin when none are given
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Create the axum router with all routes configured
pub fn create_router(app_state: AppState, cors_origins: &[String]) -> Router<()> {
    let workspace_routes = Router::new()
        .route("/workspaces/{workspace_id}/events", get(handle_workspace_events))
        .route("/workspaces/{workspace_id}/updates", post(handle_update))
        .route("/workspaces/{workspace_id}/state", post(handle_state))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handle_health))
        .merge(workspace_routes)
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "404 Not Found") })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
        .with_state(app_state)
}
