//! Delta origin tags
//!
//! Every delta that enters a replica is tagged with where it came from. Only
//! locally produced deltas are ever queued for transmission; everything else
//! is applied and dropped so that replicas never echo each other's changes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of a delta applied to a replica document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Produced by a mutation on this replica
    Local,
    /// Received over the push stream, or from a client POST on the server
    Remote,
    /// Returned by the state reconciliation endpoint
    RemoteSync,
    /// Restored from the local persistent cache
    Cache,
    /// Loaded from the durable relational snapshot
    Persistence,
}

impl Origin {
    /// Whether deltas with this origin must be sent to the peer
    pub fn is_local(self) -> bool {
        matches!(self, Origin::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Remote => "remote",
            Origin::RemoteSync => "remote-sync",
            Origin::Cache => "cache",
            Origin::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
