//! # Client Replica Manager
//!
//! Owns the local replica of one workspace and keeps it in sync with the
//! server through a [`SyncTransport`].
//!
//! ## Queues
//!
//! - **offline** - local deltas made before the first state exchange or while
//!   disconnected. Nothing is sent from it directly.
//! - **pending** - local deltas made while connected. Merged into one delta
//!   and sent when the debounce timer fires.
//!
//! ## Connect
//!
//! 1. Send our state vector, apply the returned delta as `RemoteSync`.
//! 2. Open the push stream (its first item is the full server state).
//! 3. Replace both queues with exactly what the server's state vector says
//!    it lacks, mark the replica initialized and flush immediately.
//!
//! Step 3 also covers edits restored from the local cache that never reached
//! the server, since those are part of the replica but in no queue.
//!
//! ## Failures
//!
//! A failed send puts the batch back at the head of the offline queue. A
//! failed send or a dropped stream marks the manager disconnected with an
//! error and, when enabled, schedules a reconnect with exponential backoff.
//! `retry_sync` reconnects immediately.

use super::cache::LocalCache;
use super::debounce::DebounceTimer;
use super::queue::DeltaQueue;
use super::retry::Backoff;
use super::status::{ConnectionState, SyncStatus};
use super::transport::{DeltaStream, SyncTransport, TransportError};
use super::ClientError;
use crate::shared::{is_empty_delta, AppConfig, Delta, Origin, ReplicaDocument, WorkspaceMut, WorkspaceSnapshot};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct ManagerState {
    replica: ReplicaDocument,
    connection: ConnectionState,
    initialized: bool,
    offline: DeltaQueue,
    pending: DeltaQueue,
    in_flight: bool,
    last_error: Option<String>,
    reconnect_attempt: u32,
    /// Bumped by `disconnect` and `close`; a connect started under an older
    /// epoch must not commit
    epoch: u64,
    closed: bool,
}

impl ManagerState {
    fn is_live(&self) -> bool {
        self.connection == ConnectionState::Connected && self.initialized
    }

    fn enqueue(&mut self, delta: Delta) {
        if self.is_live() {
            self.pending.push(delta);
        } else {
            self.offline.push(delta);
        }
    }

    /// Park everything unsent in the offline queue, oldest first
    fn park_pending(&mut self) {
        let mut pending = std::mem::take(&mut self.pending);
        self.offline.append(&mut pending);
    }

    fn status(&self) -> SyncStatus {
        SyncStatus::derive(
            self.connection,
            self.initialized,
            self.pending.len(),
            self.offline.len(),
            self.in_flight,
            self.last_error.clone(),
        )
    }
}

struct Inner {
    workspace_id: String,
    session: Uuid,
    config: AppConfig,
    backoff: Backoff,
    transport: Arc<dyn SyncTransport>,
    cache: Option<LocalCache>,
    state: Mutex<ManagerState>,
    status: watch::Sender<SyncStatus>,
    flush_timer: DebounceTimer,
    cache_timer: DebounceTimer,
    reconnect_timer: DebounceTimer,
    listener: Mutex<Option<JoinHandle<()>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

/// Local replica of one workspace plus its sync machinery
#[derive(Clone)]
pub struct ClientReplicaManager {
    inner: Arc<Inner>,
}

impl ClientReplicaManager {
    pub fn new(
        workspace_id: impl Into<String>,
        transport: Arc<dyn SyncTransport>,
        config: AppConfig,
        cache: Option<LocalCache>,
    ) -> Self {
        let state = ManagerState {
            replica: ReplicaDocument::new(),
            connection: ConnectionState::Disconnected,
            initialized: false,
            offline: DeltaQueue::new(),
            pending: DeltaQueue::new(),
            in_flight: false,
            last_error: None,
            reconnect_attempt: 0,
            epoch: 0,
            closed: false,
        };
        let (status, _) = watch::channel(state.status());

        Self {
            inner: Arc::new(Inner {
                workspace_id: workspace_id.into(),
                session: Uuid::new_v4(),
                backoff: Backoff::from_config(&config),
                config,
                transport,
                cache,
                state: Mutex::new(state),
                status,
                flush_timer: DebounceTimer::new(),
                cache_timer: DebounceTimer::new(),
                reconnect_timer: DebounceTimer::new(),
                listener: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.inner.workspace_id
    }

    /// Session id sent with updates so the server skips echoing them back
    pub fn session(&self) -> Uuid {
        self.inner.session
    }

    /// Merge the cached state for this workspace, if any
    pub async fn load_from_cache(&self) -> Result<bool, ClientError> {
        let Some(cache) = &self.inner.cache else {
            return Ok(false);
        };
        let Some(state) = cache.load(&self.inner.workspace_id).await? else {
            return Ok(false);
        };
        self.on_delta(&state, Origin::Cache)?;
        tracing::info!(
            "[Client] Restored {} bytes of cached state for workspace {}",
            state.len(),
            self.inner.workspace_id
        );
        Ok(true)
    }

    /// Apply a local edit; returns its delta, or `None` if nothing changed
    pub fn apply_local_mutation<F>(&self, f: F) -> Option<Delta>
    where
        F: FnOnce(&mut WorkspaceMut<'_, '_>),
    {
        let delta = {
            let mut state = self.inner.state.lock();
            let delta = state.replica.mutate(f)?;
            state.enqueue(delta.clone());
            self.inner.publish(&state);
            delta
        };
        self.inner.schedule_flush();
        self.inner.schedule_cache_write();
        Some(delta)
    }

    /// Apply a delta from any source
    ///
    /// Only `Origin::Local` deltas are queued for sending.
    pub fn on_delta(&self, delta: &[u8], origin: Origin) -> Result<(), ClientError> {
        if !origin.is_local() {
            return self.inner.apply_remote(delta, origin);
        }
        {
            let mut state = self.inner.state.lock();
            state.replica.apply_delta(delta, origin)?;
            if !is_empty_delta(delta) {
                state.enqueue(delta.to_vec());
            }
            self.inner.publish(&state);
        }
        self.inner.schedule_flush();
        self.inner.schedule_cache_write();
        Ok(())
    }

    /// Exchange state with the server, open the push stream and flush
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect().await
    }

    /// Drop the push stream; unsent deltas wait in the offline queue
    pub fn disconnect(&self) {
        self.inner.stop_listener();
        self.inner.flush_timer.cancel();
        self.inner.reconnect_timer.cancel();

        let mut state = self.inner.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        state.connection = ConnectionState::Disconnected;
        state.park_pending();
        self.inner.publish(&state);
        tracing::info!("[Sync] Disconnected from workspace {}", self.inner.workspace_id);
    }

    /// Clear the error state and reconnect or flush right away
    pub async fn retry_sync(&self) -> Result<(), ClientError> {
        self.inner.reconnect_timer.cancel();
        let connected = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            state.last_error = None;
            state.reconnect_attempt = 0;
            self.inner.publish(&state);
            state.connection == ConnectionState::Connected
        };

        if connected {
            self.flush().await
        } else {
            self.inner.connect().await
        }
    }

    /// Send the pending queue now instead of waiting for the debounce window
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.inner.flush_timer.cancel();
        self.inner.flush().await
    }

    /// Store the full replica state in the local cache now
    pub async fn write_cache(&self) -> Result<(), ClientError> {
        self.inner.cache_timer.cancel();
        self.inner.write_cache().await
    }

    /// Tear down the stream and timers and save the replica
    ///
    /// Queued deltas stay in the offline queue and are still part of the
    /// cached state.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.inner.stop_listener();
        self.inner.flush_timer.cancel();
        self.inner.reconnect_timer.cancel();
        self.inner.cache_timer.cancel();
        {
            let mut state = self.inner.state.lock();
            state.epoch = state.epoch.wrapping_add(1);
            state.closed = true;
            state.connection = ConnectionState::Disconnected;
            state.park_pending();
            self.inner.publish(&state);
        }
        self.inner.write_cache().await
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.inner.state.lock().replica.snapshot()
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.inner.state.lock().replica.state_vector()
    }

    pub fn encode_full_state(&self) -> Delta {
        self.inner.state.lock().replica.encode_full_state()
    }
}

impl Inner {
    fn publish(&self, state: &ManagerState) {
        self.status.send_replace(state.status());
    }

    fn apply_remote(self: &Arc<Self>, delta: &[u8], origin: Origin) -> Result<(), ClientError> {
        if is_empty_delta(delta) {
            return Ok(());
        }
        {
            let state = self.state.lock();
            state.replica.apply_delta(delta, origin)?;
            self.publish(&state);
        }
        self.schedule_cache_write();
        Ok(())
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let _connecting = self.connect_lock.lock().await;
        let (epoch, state_vector) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if state.connection == ConnectionState::Connected {
                return Ok(());
            }
            state.connection = ConnectionState::Connecting;
            self.publish(&state);
            (state.epoch, state.replica.state_vector())
        };
        tracing::info!("[Sync] Connecting to workspace {}", self.workspace_id);

        let exchange = match self.transport.fetch_missing(&self.workspace_id, &state_vector).await {
            Ok(exchange) => exchange,
            Err(e) => {
                let retryable = e.is_retryable();
                let error = ClientError::Reconciliation { message: e.to_string() };
                return Err(self.connect_failed(epoch, error, retryable));
            }
        };
        if let Err(e) = self.apply_remote(&exchange.missing, Origin::RemoteSync) {
            return Err(self.connect_failed(epoch, e, false));
        }

        let stream = match self.transport.subscribe(&self.workspace_id, self.session).await {
            Ok(stream) => stream,
            Err(e) => {
                let retryable = e.is_retryable();
                return Err(self.connect_failed(epoch, e.into(), retryable));
            }
        };

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if state.epoch != epoch {
                tracing::info!("[Sync] Connect to workspace {} cancelled by disconnect", self.workspace_id);
                return Err(ClientError::Cancelled);
            }
            match exchange.server_state_vector.as_deref().map(|sv| state.replica.missing_for(sv)) {
                Some(Ok(pushback)) => {
                    state.offline.clear();
                    state.pending.clear();
                    if !is_empty_delta(&pushback) {
                        state.pending.push(pushback);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("[Sync] Ignoring server state vector: {}", e);
                    state.park_pending();
                    let mut offline = std::mem::take(&mut state.offline);
                    state.pending.append(&mut offline);
                }
                None => {
                    state.park_pending();
                    let mut offline = std::mem::take(&mut state.offline);
                    state.pending.append(&mut offline);
                }
            }
            state.connection = ConnectionState::Connected;
            state.initialized = true;
            state.last_error = None;
            state.reconnect_attempt = 0;
            self.publish(&state);
        }

        let listener = tokio::spawn(run_listener(Arc::downgrade(self), stream));
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
        tracing::info!("[Sync] Connected to workspace {}", self.workspace_id);

        self.flush().await
    }

    fn connect_failed(self: &Arc<Self>, epoch: u64, error: ClientError, retryable: bool) -> ClientError {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return error;
            }
            state.connection = ConnectionState::Disconnected;
            state.last_error = Some(error.to_string());
            self.publish(&state);
        }
        tracing::warn!("[Sync] Connect to workspace {} failed: {}", self.workspace_id, error);
        if retryable {
            self.schedule_reconnect();
        }
        error
    }

    async fn flush(self: &Arc<Self>) -> Result<(), ClientError> {
        let batch = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if !state.is_live() || state.in_flight || state.pending.is_empty() {
                return Ok(());
            }
            state.in_flight = true;
            let batch = state.pending.drain();
            self.publish(&state);
            batch
        };

        let merged = match ReplicaDocument::merge_deltas(&batch) {
            Ok(merged) => merged,
            Err(e) => {
                let mut state = self.state.lock();
                state.in_flight = false;
                state.pending.push_front_all(batch);
                state.last_error = Some(e.to_string());
                self.publish(&state);
                return Err(e.into());
            }
        };

        let result = self
            .transport
            .send_update(&self.workspace_id, &merged, self.session)
            .await;

        match result {
            Ok(()) => {
                let more = {
                    let mut state = self.state.lock();
                    state.in_flight = false;
                    self.publish(&state);
                    !state.pending.is_empty()
                };
                tracing::debug!(
                    "[Sync] Flushed {} deltas ({} bytes) for workspace {}",
                    batch.len(),
                    merged.len(),
                    self.workspace_id
                );
                if more {
                    self.schedule_flush();
                }
                self.schedule_cache_write();
                Ok(())
            }
            Err(e) => {
                self.stop_listener();
                {
                    let mut state = self.state.lock();
                    state.in_flight = false;
                    state.connection = ConnectionState::Disconnected;
                    state.park_pending();
                    state.offline.push_front_all(vec![merged]);
                    state.last_error = Some(e.to_string());
                    self.publish(&state);
                }
                tracing::warn!("[Sync] Sending update for workspace {} failed: {}", self.workspace_id, e);
                if e.is_retryable() {
                    self.schedule_reconnect();
                }
                Err(e.into())
            }
        }
    }

    /// The push stream ended or failed
    fn connection_lost(self: &Arc<Self>, error: TransportError) {
        self.flush_timer.cancel();
        {
            let mut state = self.state.lock();
            if state.closed || state.connection == ConnectionState::Disconnected {
                return;
            }
            state.connection = ConnectionState::Disconnected;
            state.park_pending();
            state.last_error = Some(error.to_string());
            self.publish(&state);
        }
        tracing::warn!("[Sync] Push stream for workspace {} lost: {}", self.workspace_id, error);
        // a corrupt pushed frame is repaired by a fresh state exchange
        if error.is_retryable() || matches!(error, TransportError::Decode(_)) {
            self.schedule_reconnect();
        }
    }

    fn stop_listener(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        let ready = {
            let state = self.state.lock();
            state.is_live() && !state.pending.is_empty()
        };
        if !ready {
            return;
        }

        let weak = Arc::downgrade(self);
        self.flush_timer.schedule(self.config.debounce, async move {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.flush().await {
                    tracing::debug!("[Sync] Debounced flush failed: {}", e);
                }
            }
        });
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.auto_reconnect || self.reconnect_timer.is_pending() {
            return;
        }
        let attempt = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.reconnect_attempt = state.reconnect_attempt.saturating_add(1);
            state.reconnect_attempt
        };
        let delay = self.backoff.delay(attempt);
        tracing::info!(
            "[Sync] Reconnecting to workspace {} in {:?} (attempt {})",
            self.workspace_id,
            delay,
            attempt
        );

        let weak = Arc::downgrade(self);
        self.reconnect_timer.schedule(delay, async move {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.connect().await {
                    tracing::debug!("[Sync] Reconnect attempt failed: {}", e);
                }
            }
        });
    }

    fn schedule_cache_write(self: &Arc<Self>) {
        if self.cache.is_none() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.cache_timer.schedule(self.config.debounce, async move {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.write_cache().await {
                    tracing::warn!("[Client] Writing local cache failed: {}", e);
                }
            }
        });
    }

    async fn write_cache(&self) -> Result<(), ClientError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let state = self.state.lock().replica.encode_full_state();
        cache.store(&self.workspace_id, &state).await?;
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Apply pushed deltas until the stream ends
async fn run_listener(inner: Weak<Inner>, mut stream: DeltaStream) {
    while let Some(item) = stream.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match item {
            Ok(delta) => match inner.apply_remote(&delta, Origin::Remote) {
                Ok(()) => {}
                Err(ClientError::Replica(e)) => {
                    inner.connection_lost(TransportError::Decode(e));
                    return;
                }
                Err(e) => tracing::warn!("[Sync] Applying pushed delta failed: {}", e),
            },
            Err(e) => {
                inner.connection_lost(e);
                return;
            }
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.connection_lost(TransportError::Closed);
    }
}
