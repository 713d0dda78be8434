/**
 * Workspace Registry
 *
 * The broadcast hub: one live [`WorkspaceRoom`] per workspace id, created on
 * first use and evicted explicitly once it has been persisted. Handlers never
 * hold rooms beyond a request except for push subscriptions, which keep the
 * room's broadcast receiver alive.
 *
 * # Lifecycle
 *
 * - `get_or_create` creates the room and loads its durable baseline.
 * - `evict` runs a final reconciliation pass and only then forgets the room,
 *   provided nothing was merged after that pass. The room is closed in the
 *   same step, and callers that still hold it resolve the workspace again.
 * - `sweep` is called periodically: it schedules a persistence pass for
 *   every room and evicts rooms that nobody subscribes to and that have been
 *   idle for longer than the configured timeout.
 */

use super::room::{MissingDelta, RoomError, RoomSettings, RoomSubscription, WorkspaceRoom};
use crate::backend::persistence::{PersistenceError, WorkspaceStore};
use crate::shared::ReplicaError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Registry-wide settings
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub room: RoomSettings,
    pub idle_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            room: RoomSettings::default(),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scheduled: usize,
    pub evicted: Vec<String>,
}

/// Map of live workspace rooms
pub struct WorkspaceRegistry {
    rooms: RwLock<HashMap<String, Arc<WorkspaceRoom>>>,
    store: Arc<dyn WorkspaceStore>,
    config: HubConfig,
}

impl WorkspaceRegistry {
    pub fn new(store: Arc<dyn WorkspaceStore>, config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkspaceStore> {
        &self.store
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Live room for `workspace_id`, if any
    pub async fn get(&self, workspace_id: &str) -> Option<Arc<WorkspaceRoom>> {
        self.rooms.read().await.get(workspace_id).cloned()
    }

    /// Live room for `workspace_id`, creating it on first use
    ///
    /// A newly created room loads its baseline before it is returned. If the
    /// load fails the room is still usable; its persistence worker retries
    /// the load before reconciling.
    pub async fn get_or_create(&self, workspace_id: &str) -> Arc<WorkspaceRoom> {
        if let Some(room) = self.get(workspace_id).await {
            return room;
        }

        let (room, created) = {
            let mut rooms = self.rooms.write().await;
            match rooms.get(workspace_id) {
                Some(room) => (Arc::clone(room), false),
                None => {
                    let room = WorkspaceRoom::spawn(workspace_id, Arc::clone(&self.store), &self.config.room);
                    rooms.insert(workspace_id.to_string(), Arc::clone(&room));
                    (room, true)
                }
            }
        };

        if created {
            tracing::info!("[Hub] Created workspace replica {}", workspace_id);
            if let Err(e) = room.ensure_baseline().await {
                tracing::warn!("[Hub] Baseline load failed for {}: {}", workspace_id, e);
            }
        }
        room
    }

    /// Persist a room one last time and drop it
    ///
    /// Returns `Ok(false)` when no such room was live, or when it merged new
    /// changes while the final pass ran; it then stays live for the next
    /// sweep. On failure the room stays registered so no merged state is lost.
    pub async fn evict(&self, workspace_id: &str) -> Result<bool, PersistenceError> {
        let Some(room) = self.get(workspace_id).await else {
            return Ok(false);
        };

        room.persist().await?;

        let mut rooms = self.rooms.write().await;
        let current = rooms.get(workspace_id).is_some_and(|live| Arc::ptr_eq(live, &room));
        if !current {
            return Ok(false);
        }
        if !room.close_if_persisted().await {
            tracing::debug!("[Hub] Workspace {} changed during its final pass, keeping it", workspace_id);
            return Ok(false);
        }
        rooms.remove(workspace_id);
        tracing::info!("[Hub] Evicted workspace replica {}", workspace_id);
        Ok(true)
    }

    /// Subscribe to a workspace's merged deltas
    pub async fn subscribe(&self, workspace_id: &str) -> RoomSubscription {
        loop {
            match self.get_or_create(workspace_id).await.subscribe().await {
                Ok(subscription) => return subscription,
                Err(e) => tracing::debug!("[Hub] {}, resolving again", e),
            }
        }
    }

    /// Merge a client delta into a workspace and fan it out
    pub async fn apply_client_delta(
        &self,
        workspace_id: &str,
        delta: &[u8],
        source: Option<Uuid>,
    ) -> Result<usize, ReplicaError> {
        loop {
            let room = self.get_or_create(workspace_id).await;
            match room.apply_client_delta(delta, source).await {
                Ok(delivered) => return Ok(delivered),
                Err(RoomError::Replica(e)) => return Err(e),
                Err(RoomError::Closed(_)) => {
                    tracing::debug!("[Hub] Workspace {} was evicted mid-request, resolving again", workspace_id);
                }
            }
        }
    }

    /// Delta a client with `state_vector` is missing
    pub async fn compute_missing_delta(
        &self,
        workspace_id: &str,
        state_vector: &[u8],
    ) -> Result<MissingDelta, ReplicaError> {
        self.get_or_create(workspace_id)
            .await
            .compute_missing_delta(state_vector)
            .await
    }

    pub async fn workspace_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Schedule persistence everywhere and evict idle rooms
    pub async fn sweep(&self) -> SweepReport {
        let rooms: Vec<Arc<WorkspaceRoom>> = self.rooms.read().await.values().cloned().collect();
        let mut report = SweepReport::default();

        for room in rooms {
            let idle = room.subscriber_count() == 0 && room.idle_for() >= self.config.idle_timeout;
            if idle {
                match self.evict(room.workspace_id()).await {
                    Ok(true) => report.evicted.push(room.workspace_id().to_string()),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!("[Hub] Could not evict {}: {}", room.workspace_id(), e);
                    }
                }
            } else {
                room.schedule_persist();
                report.scheduled += 1;
            }
        }

        if !report.evicted.is_empty() {
            tracing::info!("[Hub] Sweep evicted {} idle workspaces", report.evicted.len());
        }
        report
    }
}
