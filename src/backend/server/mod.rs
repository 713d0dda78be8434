//! Server Module
//!
//! Initialization and configuration of the axum HTTP server.
//!
//! - **`state`** - Application state structure and `FromRef` implementations
//! - **`config`** - Environment and file configuration, database loading
//! - **`init`** - State assembly, background sweep and app creation

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::ServerConfig;
pub use init::{build_state, create_app, spawn_sweeper};
pub use state::AppState;
