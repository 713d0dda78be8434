//! # Client Module
//!
//! The client half of workspace replication: a [`ClientReplicaManager`]
//! holding the local replica, the transports it syncs through, and the
//! SQLite cache it bootstraps from.
//!
//! ## Structure
//!
//! ```text
//! client/
//! ├── manager.rs    # replica manager: queues, connect, flush, reconnect
//! ├── transport.rs  # SyncTransport trait and TransportError
//! ├── http.rs       # reqwest transport over the workspace endpoints
//! ├── sse.rs        # incremental text/event-stream decoder
//! ├── loopback.rs   # in-process transport bound to a hub registry (ssr)
//! ├── queue.rs      # offline / pending delta queues
//! ├── debounce.rs   # cancellable flush timer
//! ├── retry.rs      # reconnect backoff
//! ├── status.rs     # sync status surface
//! ├── cache.rs      # SQLite replica cache
//! └── config.rs     # client configuration
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfcanvas::client::{ClientConfig, ClientReplicaManager, HttpTransport, LocalCache};
//! use xfcanvas::shared::Position;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let cache = LocalCache::open(&LocalCache::default_path()).await?;
//! let transport = Arc::new(HttpTransport::new(config.clone()));
//!
//! let manager = ClientReplicaManager::new("workspace-1", transport, config.app().clone(), Some(cache));
//! manager.load_from_cache().await?;
//! manager.connect().await?;
//! manager.apply_local_mutation(|ws| ws.set_position("screen-1", Position::new(100.0, 200.0)));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod debounce;
pub mod http;
#[cfg(feature = "ssr")]
pub mod loopback;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod sse;
pub mod status;
pub mod transport;

use crate::shared::ReplicaError;
use thiserror::Error;

pub use cache::LocalCache;
pub use config::ClientConfig;
pub use debounce::DebounceTimer;
pub use http::HttpTransport;
#[cfg(feature = "ssr")]
pub use loopback::LoopbackTransport;
pub use manager::ClientReplicaManager;
pub use queue::DeltaQueue;
pub use retry::Backoff;
pub use status::{ConnectionState, SyncState, SyncStatus};
pub use transport::{DeltaStream, StateExchange, SyncTransport, TransportError};

/// Errors surfaced by the replica manager
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("state reconciliation failed: {message}")]
    Reconciliation { message: String },

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error("local cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("replica manager is closed")]
    Closed,

    #[error("connect cancelled by disconnect")]
    Cancelled,
}
