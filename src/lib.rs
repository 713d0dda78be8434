// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! XFCanvas - Main Library
//!
//! XFCanvas keeps a collaborative canvas workspace (screens and the
//! conversation points attached to them) consistent across every open
//! session and a server-held authoritative copy. Edits are CRDT deltas over
//! a `yrs` document, fanned out over server-sent events and projected into
//! relational storage in the background.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared between client and server
//!   - Replica document and typed workspace mutations
//!   - Origin tags, wire bodies, base64 codec
//!   - Error types and the sync configuration builder
//!
//! - **`backend`** - Server-side code (only compiled with `ssr` feature)
//!   - Axum server with the update, state and events endpoints
//!   - Workspace registry (broadcast hub) and per-workspace rooms
//!   - Persistence reconciler and bounded persistence queues
//!   - JWT authentication middleware
//!
//! - **`client`** - Client replica manager
//!   - Offline and pending queues, debounced flushing, reconnects
//!   - HTTP/SSE transport and an in-process loopback transport
//!   - SQLite cache for offline bootstrap
//!
//! # Feature Flags
//!
//! - **`ssr`** - Server build (enabled by default)
//!   - Axum server, JWT auth, tracing subscriber
//!   - Required for the `xfcanvas-server` binary and for `LoopbackTransport`
//!
//! # Usage
//!
//! ## Server-Side
//!
//! ```rust,no_run
//! # #[cfg(feature = "ssr")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use xfcanvas::backend::server::{create_app, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let app = create_app(&config).await?;
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Sync Protocol
//!
//! - `POST /workspaces/{id}/updates` - `{ update: base64 }` -> `{ success: true }`
//! - `POST /workspaces/{id}/state` - `{ stateVector: base64 }` -> `{ update?, stateVector }`
//! - `GET /workspaces/{id}/events` - SSE `delta-update` events, first one is the full state
//!
//! # Thread Safety
//!
//! - **Server**: rooms live behind `Arc` in a `RwLock`ed registry; each
//!   room serializes merges on its own `tokio::sync::Mutex`
//! - **Client**: the replica and queues sit behind one `parking_lot::Mutex`
//!   that is never held across an await point

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;

/// Client replica manager and transports
pub mod client;
