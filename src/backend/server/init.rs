/**
 * Server Initialization
 *
 * Builds the application state and router from a [`ServerConfig`].
 *
 * # Initialization Steps
 *
 * 1. Connect to Postgres if `DATABASE_URL` is set, otherwise fall back to
 *    the in-memory workspace store. A configured database that cannot be
 *    reached stops startup.
 * 2. Create the workspace registry.
 * 3. Start the periodic sweep that persists live workspaces and evicts idle
 *    ones.
 * 4. Assemble the router.
 */

use crate::backend::auth::AuthSettings;
use crate::backend::collab::WorkspaceRegistry;
use crate::backend::persistence::{MemoryWorkspaceStore, PersistenceError, PgWorkspaceStore, WorkspaceStore};
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_database, ServerConfig};
use crate::backend::server::state::AppState;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Create the application state for a config and store
pub fn build_state(config: &ServerConfig, store: Arc<dyn WorkspaceStore>) -> AppState {
    let registry = Arc::new(WorkspaceRegistry::new(store, config.hub_config()));
    let auth = AuthSettings::new(&config.jwt_secret, config.auth_disabled);
    if config.auth_disabled {
        tracing::warn!("[Auth] Authentication is disabled");
    }
    AppState::new(registry, auth)
}

/// Periodically persist live workspaces and evict idle ones
pub fn spawn_sweeper(registry: Arc<WorkspaceRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = registry.sweep().await;
            tracing::debug!(
                "[Hub] Sweep scheduled {} passes, evicted {}",
                report.scheduled,
                report.evicted.len()
            );
        }
    })
}

/// Create and configure the axum application
pub async fn create_app(config: &ServerConfig) -> Result<Router<()>, PersistenceError> {
    tracing::info!("Initializing xfcanvas sync server");

    let store: Arc<dyn WorkspaceStore> = match load_database(config.database_url.as_deref()).await? {
        Some(pool) => Arc::new(PgWorkspaceStore::new(pool)),
        None => Arc::new(MemoryWorkspaceStore::new()),
    };

    let app_state = build_state(config, store);
    spawn_sweeper(app_state.registry.clone(), config.sweep_interval);
    tracing::info!(
        "Router configured with a {}s persistence sweep",
        config.sweep_interval.as_secs()
    );

    Ok(create_router(app_state, &config.cors_origins))
}
