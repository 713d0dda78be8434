//! # Sync Status
//!
//! The status surface the replica manager publishes after every state
//! change. UI code watches it to show whether local edits have reached the
//! server.
//!
//! ## Derivation
//!
//! | Condition                                          | State     |
//! |----------------------------------------------------|-----------|
//! | an error is recorded                               | `Error`   |
//! | not connected                                      | `Offline` |
//! | not initialized, or queued / in-flight deltas      | `Syncing` |
//! | otherwise                                          | `Synced`  |

use serde::{Deserialize, Serialize};

/// Connection state of the push stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Coarse sync state shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    Syncing,
    Offline,
    Error,
}

/// Snapshot of the replica manager's sync progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub connection: ConnectionState,
    pub pending_count: usize,
    pub offline_count: usize,
    pub in_flight: bool,
    pub initialized: bool,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn derive(
        connection: ConnectionState,
        initialized: bool,
        pending_count: usize,
        offline_count: usize,
        in_flight: bool,
        last_error: Option<String>,
    ) -> Self {
        let state = if last_error.is_some() {
            SyncState::Error
        } else if connection != ConnectionState::Connected {
            SyncState::Offline
        } else if !initialized || pending_count > 0 || offline_count > 0 || in_flight {
            SyncState::Syncing
        } else {
            SyncState::Synced
        };

        Self {
            state,
            connection,
            pending_count,
            offline_count,
            in_flight,
            initialized,
            last_error,
        }
    }

    /// Whether every local edit has been acknowledged by the server
    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::derive(ConnectionState::Disconnected, false, 0, 0, false, None)
    }
}
