//! Collaborative Workspace Module
//!
//! The broadcast hub: live workspace replicas, their push fan-out and the
//! update and state endpoints.
//!
//! - **`room`** - One live workspace: replica, broadcast, persistence worker
//! - **`registry`** - Explicit create/get/evict map of rooms
//! - **`handlers`** - HTTP handlers

pub mod handlers;
pub mod registry;
pub mod room;

pub use handlers::{handle_health, handle_state, handle_update};
pub use registry::{HubConfig, SweepReport, WorkspaceRegistry};
pub use room::{DeltaFrame, MissingDelta, RoomError, RoomSettings, RoomSubscription, WorkspaceRoom};
