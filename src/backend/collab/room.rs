/**
 * Workspace Room
 *
 * Server-side state of one live workspace: the authoritative replica, the
 * broadcast channel feeding its push subscribers and the persistence worker
 * that reconciles it into the database.
 *
 * # Ordering
 *
 * Merging a client delta and publishing it happen under the replica lock,
 * so subscribers observe deltas in merge order and a new subscriber's
 * initial full state is exactly the state before its first pushed delta.
 *
 * # Baseline
 *
 * A room starts empty and fills itself from the store: from the encoded
 * replica state when one was written, otherwise from the durable rows. Until
 * that load succeeds the persistence worker refuses to reconcile: an
 * unloaded replica would make every stored row look deleted.
 *
 * # Closing
 *
 * Eviction closes a room only when its replica holds nothing beyond the
 * last persisted state. A closed room refuses merges and subscriptions so
 * callers still holding it go back to the registry for a fresh one.
 */

use crate::backend::persistence::{
    PersistenceError, PersistenceQueue, PersistenceStatsSnapshot, ReconcileReport, ScheduleOutcome,
    StoredWorkspace, WorkspaceStore,
};
use crate::shared::{Delta, Origin, ReplicaDocument, ReplicaError, WorkspaceSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

/// Errors from operations on a single room
#[derive(Debug, Error)]
pub enum RoomError {
    /// The room was evicted; resolve the workspace again
    #[error("workspace room {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

/// A merged delta as fanned out to push subscribers
#[derive(Debug, Clone)]
pub struct DeltaFrame {
    pub delta: Arc<Delta>,
    /// Subscriber session that produced the delta, if it declared one
    pub source: Option<Uuid>,
}

impl DeltaFrame {
    /// Whether the frame should be withheld from `session`
    pub fn is_echo_for(&self, session: Option<Uuid>) -> bool {
        matches!((self.source, session), (Some(source), Some(session)) if source == session)
    }
}

/// A fresh push subscription
pub struct RoomSubscription {
    /// Full encoded state at the moment of subscribing
    pub initial: Delta,
    pub receiver: broadcast::Receiver<DeltaFrame>,
}

/// Result of a state exchange against the room's replica
#[derive(Debug, Clone, PartialEq)]
pub struct MissingDelta {
    pub missing: Delta,
    pub state_vector: Vec<u8>,
}

/// Tunables applied to every room
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub broadcast_capacity: usize,
    pub persist_queue_depth: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            persist_queue_depth: 1,
        }
    }
}

/// One live workspace
pub struct WorkspaceRoom {
    workspace_id: String,
    replica: Mutex<ReplicaDocument>,
    sender: broadcast::Sender<DeltaFrame>,
    persistence: PersistenceQueue,
    baseline_loaded: AtomicBool,
    closed: AtomicBool,
    /// State vector of the replica state last written to the store
    persisted_clock: parking_lot::Mutex<Option<Vec<u8>>>,
    /// Serializes reconciliation passes
    persist_lock: Mutex<()>,
    last_activity: parking_lot::Mutex<Instant>,
    store: Arc<dyn WorkspaceStore>,
}

impl WorkspaceRoom {
    /// Create the room and start its persistence worker
    pub fn spawn(workspace_id: impl Into<String>, store: Arc<dyn WorkspaceStore>, settings: &RoomSettings) -> Arc<Self> {
        let workspace_id = workspace_id.into();
        let (persistence, receiver) = PersistenceQueue::bounded(settings.persist_queue_depth);
        let (sender, _) = broadcast::channel(settings.broadcast_capacity.max(1));

        Arc::new_cyclic(|weak: &Weak<WorkspaceRoom>| {
            tokio::spawn(run_persistence_worker(weak.clone(), receiver));
            Self {
                workspace_id,
                replica: Mutex::new(ReplicaDocument::new()),
                sender,
                persistence,
                baseline_loaded: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                persisted_clock: parking_lot::Mutex::new(None),
                persist_lock: Mutex::new(()),
                last_activity: parking_lot::Mutex::new(Instant::now()),
                store,
            }
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn is_baseline_loaded(&self) -> bool {
        self.baseline_loaded.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.is_closed() {
            return Err(RoomError::Closed(self.workspace_id.clone()));
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Load the stored workspace into the replica if that has not happened yet
    ///
    /// Stored replica state is merged like any peer's delta, so edits merged
    /// before the load finished are kept. The row projection only fills
    /// fields the replica lacks. The resulting delta is fanned out like any
    /// other change.
    pub async fn ensure_baseline(&self) -> Result<(), PersistenceError> {
        if self.is_baseline_loaded() {
            return Ok(());
        }

        let stored = self.store.load(&self.workspace_id).await?;
        let replica = self.replica.lock().await;
        if self.is_baseline_loaded() {
            return Ok(());
        }
        if let Some(stored) = stored {
            if let Some(delta) = self.restore(&replica, stored) {
                let _ = self.sender.send(DeltaFrame {
                    delta: Arc::new(delta),
                    source: None,
                });
            }
        }
        self.baseline_loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&self, replica: &ReplicaDocument, stored: StoredWorkspace) -> Option<Delta> {
        if let Some(state) = stored.state {
            match replica.apply_delta(&state, Origin::Persistence) {
                Ok(()) => {
                    *self.persisted_clock.lock() = ReplicaDocument::from_state(&state, Origin::Persistence)
                        .ok()
                        .map(|durable| durable.state_vector());
                    tracing::info!(
                        "[Hub] Restored workspace {} from {} bytes of stored state",
                        self.workspace_id,
                        state.len()
                    );
                    return Some(state);
                }
                Err(e) => {
                    tracing::warn!(
                        "[Hub] Stored state of workspace {} is unreadable, loading rows: {}",
                        self.workspace_id,
                        e
                    );
                }
            }
        }

        let delta = replica.apply_baseline(&stored.snapshot)?;
        tracing::info!(
            "[Hub] Loaded {} screens for workspace {}",
            stored.snapshot.screens.len(),
            self.workspace_id
        );
        Some(delta)
    }

    /// Subscribe to merged deltas, starting from the current full state
    pub async fn subscribe(&self) -> Result<RoomSubscription, RoomError> {
        let replica = self.replica.lock().await;
        self.ensure_open()?;
        let receiver = self.sender.subscribe();
        let initial = replica.encode_full_state();
        drop(replica);

        self.touch();
        tracing::debug!(
            "[Hub] New subscriber for {} ({} total)",
            self.workspace_id,
            self.subscriber_count()
        );
        Ok(RoomSubscription { initial, receiver })
    }

    /// Merge a client delta, fan it out and schedule persistence
    ///
    /// Returns the number of subscribers the delta was sent to.
    pub async fn apply_client_delta(&self, delta: &[u8], source: Option<Uuid>) -> Result<usize, RoomError> {
        let replica = self.replica.lock().await;
        self.ensure_open()?;
        replica.apply_delta(delta, Origin::Remote)?;
        let delivered = self
            .sender
            .send(DeltaFrame {
                delta: Arc::new(delta.to_vec()),
                source,
            })
            .unwrap_or(0);
        drop(replica);

        self.touch();
        self.schedule_persist();
        Ok(delivered)
    }

    /// Delta the holder of `state_vector` is missing, plus our own vector
    pub async fn compute_missing_delta(&self, state_vector: &[u8]) -> Result<MissingDelta, ReplicaError> {
        let replica = self.replica.lock().await;
        let missing = replica.missing_for(state_vector)?;
        let state_vector = replica.state_vector();
        drop(replica);

        self.touch();
        Ok(MissingDelta { missing, state_vector })
    }

    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        self.replica.lock().await.snapshot()
    }

    pub async fn encode_full_state(&self) -> Delta {
        self.replica.lock().await.encode_full_state()
    }

    pub fn schedule_persist(&self) -> ScheduleOutcome {
        self.persistence.schedule()
    }

    pub fn persistence_stats(&self) -> PersistenceStatsSnapshot {
        self.persistence.stats().snapshot()
    }

    /// Run one reconciliation pass now
    pub async fn persist(&self) -> Result<ReconcileReport, PersistenceError> {
        let _pass = self.persist_lock.lock().await;
        let result = self.reconcile_once().await;
        let stats = self.persistence.stats();
        match &result {
            Ok(report) => stats.record_success(report.total_writes()),
            Err(e) => stats.record_failure(e),
        }
        result
    }

    async fn reconcile_once(&self) -> Result<ReconcileReport, PersistenceError> {
        self.ensure_baseline().await?;

        let (snapshot, state, clock) = {
            let replica = self.replica.lock().await;
            let clock = replica.state_vector();
            let state = (!self.is_persisted(&replica)).then(|| replica.encode_full_state());
            (replica.snapshot(), state, clock)
        };

        let report = self
            .store
            .reconcile(&self.workspace_id, &snapshot, state.as_deref())
            .await?;
        if state.is_some() {
            *self.persisted_clock.lock() = Some(clock);
        }
        Ok(report)
    }

    fn is_persisted(&self, replica: &ReplicaDocument) -> bool {
        self.persisted_clock
            .lock()
            .as_deref()
            .is_some_and(|clock| replica.is_covered_by(clock))
    }

    /// Close the room if the store already holds everything it merged
    ///
    /// Returns `false`, leaving the room open, when changes arrived after the
    /// last persisted state.
    pub(crate) async fn close_if_persisted(&self) -> bool {
        let replica = self.replica.lock().await;
        if !self.is_persisted(&replica) {
            return false;
        }
        self.closed.store(true, Ordering::SeqCst);
        true
    }
}

/// Drain a room's persistence queue until the room is dropped
async fn run_persistence_worker(room: Weak<WorkspaceRoom>, mut receiver: mpsc::Receiver<()>) {
    while receiver.recv().await.is_some() {
        let Some(room) = room.upgrade() else {
            break;
        };
        match room.persist().await {
            Ok(report) if !report.is_noop() => {
                tracing::info!(
                    "[Persist] Workspace {}: {} writes",
                    room.workspace_id(),
                    report.total_writes()
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[Persist] Reconciliation failed for {}: {}", room.workspace_id(), e);
            }
        }
    }
}
