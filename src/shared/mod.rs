//! Shared Module
//!
//! This module contains types and data structures that are shared between
//! the client replica manager and the backend hub. The replica document is
//! used identically on both sides; the wire types describe the JSON bodies
//! the two exchange over HTTP.
//!
//! # Overview
//!
//! - **`replica`** - CRDT workspace document and typed mutations
//! - **`model`** - Materialized screens and conversation points
//! - **`origin`** - Tags describing where a delta came from
//! - **`wire`** - Endpoint bodies and the base64 codec
//! - **`error`** - Replica and validation errors
//! - **`config`** - Sync settings builder

/// Workspace model types
pub mod model;

/// Delta origin tags
pub mod origin;

/// CRDT replica document
pub mod replica;

/// Endpoint bodies and base64 codec
pub mod wire;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::ReplicaError;
pub use model::{Arrow, ConversationPoint, Position, ScreenEntry, WorkspaceSnapshot};
pub use origin::Origin;
pub use replica::{is_empty_delta, Delta, ReplicaDocument, WorkspaceMut};
pub use wire::{StateRequest, StateResponse, UpdateRequest, UpdateResponse};
