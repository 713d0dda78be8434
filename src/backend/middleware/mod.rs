//! Middleware Module
//!
//! HTTP middleware for the backend server.
//!
//! - **`auth`** - Bearer token check for the workspace routes

pub mod auth;

pub use auth::{auth_middleware, AuthUser, AuthenticatedUser};
