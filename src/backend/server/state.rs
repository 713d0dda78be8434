/**
 * Application State Management
 *
 * The `AppState` handed to every axum handler, plus the `FromRef`
 * implementations that let handlers extract only the part they need.
 *
 * # Example
 *
 * ```rust,ignore
 * async fn handler(State(registry): State<Arc<WorkspaceRegistry>>) {
 *     let room = registry.get_or_create("workspace").await;
 * }
 * ```
 */

use crate::backend::auth::AuthSettings;
use crate::backend::collab::WorkspaceRegistry;
use axum::extract::FromRef;
use std::sync::Arc;

/// Shared state of the HTTP server
#[derive(Clone)]
pub struct AppState {
    /// Live workspace replicas
    pub registry: Arc<WorkspaceRegistry>,

    /// Token settings for the auth middleware
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(registry: Arc<WorkspaceRegistry>, auth: AuthSettings) -> Self {
        Self { registry, auth }
    }
}

impl FromRef<AppState> for Arc<WorkspaceRegistry> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for AuthSettings {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth.clone()
    }
}
