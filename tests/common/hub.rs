//! Hub and client fixtures
//!
//! A [`TestHub`] is a workspace registry over an in-memory store. Each
//! client it hands out gets its own loopback transport, so one client can be
//! taken offline while the others stay connected.

use std::sync::Arc;
use std::time::Duration;
use xfcanvas::backend::collab::{HubConfig, WorkspaceRegistry, WorkspaceRoom};
use xfcanvas::backend::persistence::MemoryWorkspaceStore;
use xfcanvas::client::{ClientReplicaManager, LocalCache, LoopbackTransport};
use xfcanvas::shared::{AppConfig, WorkspaceSnapshot};

/// Workspace used by most tests
pub const WORKSPACE: &str = "workspace-1";

/// Sync settings for tests: default debounce, no automatic reconnect
pub fn test_sync_config() -> AppConfig {
    AppConfig::builder()
        .auto_reconnect(false)
        .build()
        .expect("test config is valid")
}

/// Let debounce windows elapse and spawned tasks run
///
/// Meant for `start_paused` tests, where the sleep completes instantly once
/// every task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

/// A client replica manager plus the switch for its connectivity
pub struct TestClient {
    pub manager: ClientReplicaManager,
    pub transport: LoopbackTransport,
}

impl TestClient {
    pub fn go_offline(&self) {
        self.transport.set_online(false);
    }

    /// Restore connectivity and resync
    pub async fn reconnect(&self) {
        self.transport.set_online(true);
        crate::assert_ok!(self.manager.retry_sync().await, "reconnect failed");
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.manager.snapshot()
    }
}

pub struct TestHub {
    pub store: Arc<MemoryWorkspaceStore>,
    pub registry: Arc<WorkspaceRegistry>,
}

impl TestHub {
    pub fn new() -> Self {
        Self::with_store(MemoryWorkspaceStore::new(), HubConfig::default())
    }

    /// Hub whose store already holds `snapshot` for [`WORKSPACE`]
    pub async fn seeded(snapshot: &WorkspaceSnapshot) -> Self {
        let store = MemoryWorkspaceStore::seeded(WORKSPACE, snapshot)
            .await
            .expect("seeding the memory store");
        Self::with_store(store, HubConfig::default())
    }

    pub fn with_store(store: MemoryWorkspaceStore, config: HubConfig) -> Self {
        let store = Arc::new(store);
        let registry = Arc::new(WorkspaceRegistry::new(store.clone(), config));
        Self { store, registry }
    }

    pub fn client(&self) -> TestClient {
        self.client_with_cache(None)
    }

    pub fn client_with_cache(&self, cache: Option<LocalCache>) -> TestClient {
        let transport = LoopbackTransport::new(self.registry.clone());
        let manager = ClientReplicaManager::new(WORKSPACE, Arc::new(transport.clone()), test_sync_config(), cache);
        TestClient { manager, transport }
    }

    /// Client that has already completed its first connect
    pub async fn connected_client(&self) -> TestClient {
        let client = self.client();
        crate::assert_ok!(client.manager.connect().await, "initial connect failed");
        client
    }

    pub async fn room(&self) -> Arc<WorkspaceRoom> {
        self.registry.get_or_create(WORKSPACE).await
    }

    /// Authoritative content of [`WORKSPACE`]
    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        self.room().await.snapshot().await
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}
