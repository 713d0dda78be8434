//! # Loopback Transport
//!
//! In-process [`SyncTransport`] bound directly to a hub
//! [`WorkspaceRegistry`]. It behaves like the HTTP transport without sockets:
//! the first pushed delta is the full state and the client's own deltas are
//! not echoed back. `set_online(false)` fails every call and ends open
//! streams, which is how tests simulate a dropped connection.

use super::transport::{DeltaStream, StateExchange, SyncTransport, TransportError};
use crate::backend::collab::{DeltaFrame, WorkspaceRegistry};
use crate::shared::ReplicaError;
use async_trait::async_trait;
use futures_util::stream;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Transport talking to a registry in the same process
#[derive(Clone)]
pub struct LoopbackTransport {
    registry: Arc<WorkspaceRegistry>,
    online: watch::Sender<bool>,
}

impl LoopbackTransport {
    pub fn new(registry: Arc<WorkspaceRegistry>) -> Self {
        let (online, _) = watch::channel(true);
        Self { registry, online }
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    /// Switch connectivity; going offline ends every open stream
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn ensure_online(&self) -> Result<(), TransportError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(TransportError::network("loopback offline"))
        }
    }
}

fn rejected(error: ReplicaError) -> TransportError {
    TransportError::status(400, error.to_string())
}

struct StreamState {
    initial: Option<Vec<u8>>,
    receiver: broadcast::Receiver<DeltaFrame>,
    online: watch::Receiver<bool>,
    session: Uuid,
}

#[async_trait]
impl SyncTransport for LoopbackTransport {
    async fn fetch_missing(&self, workspace_id: &str, state_vector: &[u8]) -> Result<StateExchange, TransportError> {
        self.ensure_online()?;
        let missing = self
            .registry
            .compute_missing_delta(workspace_id, state_vector)
            .await
            .map_err(rejected)?;
        Ok(StateExchange {
            missing: missing.missing,
            server_state_vector: Some(missing.state_vector),
        })
    }

    async fn send_update(&self, workspace_id: &str, delta: &[u8], session: Uuid) -> Result<(), TransportError> {
        self.ensure_online()?;
        self.registry
            .apply_client_delta(workspace_id, delta, Some(session))
            .await
            .map_err(rejected)?;
        Ok(())
    }

    async fn subscribe(&self, workspace_id: &str, session: Uuid) -> Result<DeltaStream, TransportError> {
        self.ensure_online()?;
        let subscription = self.registry.subscribe(workspace_id).await;
        let state = StreamState {
            initial: Some(subscription.initial),
            receiver: subscription.receiver,
            online: self.online.subscribe(),
            session,
        };

        let frames = stream::unfold(state, |mut state| async move {
            if let Some(initial) = state.initial.take() {
                return Some((Ok(initial), state));
            }
            loop {
                if !*state.online.borrow() {
                    return None;
                }
                tokio::select! {
                    changed = state.online.changed() => {
                        if changed.is_err() || !*state.online.borrow() {
                            return None;
                        }
                    }
                    frame = state.receiver.recv() => match frame {
                        Ok(frame) if frame.is_echo_for(Some(state.session)) => continue,
                        Ok(frame) => return Some((Ok(frame.delta.as_ref().clone()), state)),
                        Err(_) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(frames))
    }
}
