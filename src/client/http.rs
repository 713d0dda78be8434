//! # HTTP Transport
//!
//! [`SyncTransport`] over the workspace endpoints:
//!
//! - `POST /workspaces/{id}/state`   - state-vector exchange
//! - `POST /workspaces/{id}/updates` - send a local delta
//! - `GET  /workspaces/{id}/events`  - SSE push stream of `delta-update` events
//!
//! Requests carry the bearer token from [`ClientConfig`] when one is set, and
//! the manager's session id so the server does not echo our own deltas back.

use super::config::ClientConfig;
use super::sse::{SseDecoder, SseEvent};
use super::transport::{DeltaStream, StateExchange, SyncTransport, TransportError};
use crate::shared::wire::{decode_delta, DELTA_EVENT, SESSION_HEADER};
use crate::shared::{StateRequest, StateResponse, UpdateRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::VecDeque;
use std::pin::Pin;
use uuid::Uuid;

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// reqwest-backed sync transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn workspace_url(&self, workspace_id: &str, endpoint: &str) -> String {
        self.config
            .api_url(&format!("/workspaces/{}/{}", workspace_id, endpoint))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-success response into a `Status` error, keeping the server's message
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(TransportError::status(status.as_u16(), message))
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn fetch_missing(&self, workspace_id: &str, state_vector: &[u8]) -> Result<StateExchange, TransportError> {
        let request = self
            .client
            .post(self.workspace_url(workspace_id, "state"))
            .json(&StateRequest::from_state_vector(state_vector));

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(TransportError::network)?;
        let body: StateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(TransportError::network)?;

        Ok(StateExchange {
            missing: body.delta()?,
            server_state_vector: body.server_state_vector()?,
        })
    }

    async fn send_update(&self, workspace_id: &str, delta: &[u8], session: Uuid) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.workspace_url(workspace_id, "updates"))
            .header(SESSION_HEADER, session.to_string())
            .json(&UpdateRequest::from_delta(delta));

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(TransportError::network)?;
        check_status(response).await?;
        tracing::debug!("[Client] Sent {} byte delta for workspace {}", delta.len(), workspace_id);
        Ok(())
    }

    async fn subscribe(&self, workspace_id: &str, session: Uuid) -> Result<DeltaStream, TransportError> {
        let request = self
            .client
            .get(self.workspace_url(workspace_id, "events"))
            .query(&[("session", session.to_string())])
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(TransportError::network)?;
        let response = check_status(response).await?;
        tracing::info!("[Client] SSE stream established for workspace {}", workspace_id);

        let body: BodyStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(delta_events(body)))
    }
}

/// Decode `delta-update` events out of an SSE body
fn delta_events(body: BodyStream) -> impl Stream<Item = Result<Vec<u8>, TransportError>> + Send {
    let state = (body, SseDecoder::new(), VecDeque::<SseEvent>::new());

    stream::unfold(state, |(mut body, mut decoder, mut ready)| async move {
        loop {
            if let Some(event) = ready.pop_front() {
                if event.event != DELTA_EVENT {
                    continue;
                }
                let item = decode_delta(&event.data).map_err(TransportError::from);
                return Some((item, (body, decoder, ready)));
            }

            match body.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(&chunk)),
                Some(Err(e)) => {
                    return Some((Err(TransportError::network(e)), (body, decoder, ready)));
                }
                None => return None,
            }
        }
    })
}
