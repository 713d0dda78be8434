//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Hub and client fixtures bound through the loopback transport
//! - Router and token helpers for endpoint tests
//! - Custom assertion macros

pub mod assertions;
#[cfg(feature = "ssr")]
pub mod auth_helpers;
#[cfg(feature = "ssr")]
pub mod hub;

// Re-export commonly used utilities
#[cfg(feature = "ssr")]
pub use auth_helpers::*;
#[cfg(feature = "ssr")]
pub use hub::*;
