//! Route Configuration Module
//!
//! HTTP routes of the sync server. See [`router`] for the route table.

/// Main router creation
pub mod router;

pub use router::create_router;
