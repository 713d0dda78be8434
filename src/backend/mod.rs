//! Backend Module
//!
//! Server side of workspace replication: an axum HTTP server hosting one
//! authoritative replica per live workspace, fanning merged deltas out to
//! SSE subscribers and reconciling replicas into Postgres.
//!
//! This module is only compiled when the `ssr` feature is enabled.
//!
//! # Architecture
//!
//! - **`server`** - Configuration, application state, initialization
//! - **`routes`** - Router assembly
//! - **`collab`** - Workspace registry (the broadcast hub) and endpoints
//! - **`realtime`** - SSE push stream
//! - **`persistence`** - Workspace stores and the reconciler
//! - **`auth`** - JWT validation
//! - **`middleware`** - Auth middleware
//! - **`error`** - Backend error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── main.rs         - Server binary
//! ├── server/         - Server initialization and state
//! ├── routes/         - Route configuration
//! ├── collab/         - Registry, rooms, handlers
//! ├── realtime/       - Push stream
//! ├── persistence/    - Stores, reconciler, queue
//! ├── auth/           - Tokens
//! ├── middleware/     - Request middleware
//! └── error/          - Error types
//! ```
//!
//! # Data Flow
//!
//! 1. A client posts a delta to `/workspaces/{id}/updates`.
//! 2. The registry merges it into the workspace replica and fans it out to
//!    every push subscriber, in merge order.
//! 3. The workspace's persistence queue schedules a reconciliation pass,
//!    which rewrites only the rows that changed.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Workspace registry and endpoints
pub mod collab;

/// Push stream
pub mod realtime;

/// Durable workspace storage
pub mod persistence;

/// Backend error types
pub mod error;

/// Token validation
pub mod auth;

/// Middleware for request processing
pub mod middleware;

pub use collab::{WorkspaceRegistry, WorkspaceRoom};
pub use error::BackendError;
pub use server::{create_app, AppState, ServerConfig};
