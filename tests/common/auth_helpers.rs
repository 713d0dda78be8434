//! Authentication test helpers
//!
//! Builds a router over an in-memory store with a known JWT secret and
//! issues tokens signed with it.

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use std::sync::Arc;
use xfcanvas::backend::auth::create_token;
use xfcanvas::backend::collab::WorkspaceRegistry;
use xfcanvas::backend::persistence::MemoryWorkspaceStore;
use xfcanvas::backend::routes::create_router;
use xfcanvas::backend::server::{build_state, ServerConfig};

/// Secret shared by the test router and test tokens
pub const TEST_SECRET: &str = "integration-test-secret";

pub fn test_token(subject: &str) -> String {
    create_token(subject, Some(format!("{}@example.com", subject)), TEST_SECRET).expect("Failed to create test token")
}

pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: TEST_SECRET.to_string(),
        ..ServerConfig::default()
    }
}

/// Router plus the registry behind it
pub fn test_router() -> (Router, Arc<WorkspaceRegistry>) {
    let state = build_state(&test_server_config(), Arc::new(MemoryWorkspaceStore::new()));
    let registry = state.registry.clone();
    (create_router(state, &[]), registry)
}

/// JSON POST request, authenticated when `token` is given
pub fn json_post(uri: &str, body: &serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}
