/**
 * Workspace Push Stream
 *
 * Server-Sent Events handler for `GET /workspaces/{id}/events`. Every event
 * is named `delta-update` and carries one base64-encoded delta:
 *
 * ```http
 * event: delta-update
 * data: AQLc8f...
 * ```
 *
 * # Stream Contents
 *
 * 1. The workspace's full state at subscription time.
 * 2. Every delta merged afterwards, in merge order, except those posted by
 *    the subscriber's own `session`.
 *
 * # Lagging
 *
 * A subscriber that falls behind the broadcast buffer has lost deltas. Its
 * stream is closed so the client reconnects and resyncs through the state
 * endpoint, rather than continuing with a gap.
 */

use crate::backend::collab::registry::WorkspaceRegistry;
use crate::backend::collab::room::DeltaFrame;
use crate::shared::wire::{encode_base64, DELTA_EVENT};
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

/// Query parameters of the event stream
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Session id the subscriber also sends with its updates
    pub session: Option<Uuid>,
}

fn delta_event(delta: &[u8]) -> Event {
    Event::default().event(DELTA_EVENT).data(encode_base64(delta))
}

/// Turn a broadcast receiver into a stream of SSE events
pub fn frame_events(
    workspace_id: String,
    receiver: broadcast::Receiver<DeltaFrame>,
    session: Option<Uuid>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold(receiver, move |mut rx| {
        let workspace_id = workspace_id.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(frame) if frame.is_echo_for(session) => continue,
                    Ok(frame) => return Some((Ok(delta_event(&frame.delta)), rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "[Hub] Subscriber of {} lagged by {} deltas, closing stream",
                            workspace_id,
                            skipped
                        );
                        return None;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("[Hub] Broadcast for {} closed", workspace_id);
                        return None;
                    }
                }
            }
        }
    })
}

/// Handle `GET /workspaces/{id}/events`
pub async fn handle_workspace_events(
    State(registry): State<Arc<WorkspaceRegistry>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = registry.subscribe(&workspace_id).await;
    tracing::info!(
        "[Hub] Subscriber joined {} (session: {:?})",
        workspace_id,
        query.session
    );

    let initial = delta_event(&subscription.initial);
    let events = stream::once(async move { Ok(initial) }).chain(frame_events(
        workspace_id,
        subscription.receiver,
        query.session,
    ));

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;

    #[tokio::test]
    async fn test_own_session_is_skipped() {
        let (sender, receiver) = broadcast::channel(8);
        let me = Uuid::new_v4();
        let mut events = pin!(frame_events("w".into(), receiver, Some(me)));

        sender
            .send(DeltaFrame {
                delta: Arc::new(vec![1]),
                source: Some(me),
            })
            .unwrap();
        sender
            .send(DeltaFrame {
                delta: Arc::new(vec![2]),
                source: None,
            })
            .unwrap();
        drop(sender);

        assert!(events.next().await.is_some());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_stream_ends() {
        let (sender, receiver) = broadcast::channel(1);
        let mut events = pin!(frame_events("w".into(), receiver, None));

        for byte in 0..3u8 {
            sender
                .send(DeltaFrame {
                    delta: Arc::new(vec![byte]),
                    source: None,
                })
                .unwrap();
        }

        assert!(events.next().await.is_none());
    }
}
