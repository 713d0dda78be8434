//! Real-time Module
//!
//! Server-Sent Events push stream for workspace deltas.

pub mod subscription;

pub use subscription::{handle_workspace_events, EventsQuery};
