//! Workspace endpoints driven through the router

use crate::common::{json_post, test_router, test_token};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use xfcanvas::shared::wire::{decode_delta, encode_base64};
use xfcanvas::shared::{Origin, ReplicaDocument, StateResponse};

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sample_delta() -> Vec<u8> {
    ReplicaDocument::new()
        .mutate(|ws| ws.set_height("s1", 240.0))
        .unwrap()
}

#[tokio::test]
async fn test_update_requires_token() {
    let (app, _) = test_router();
    let body = json!({ "update": encode_base64(&sample_delta()) });

    let response = app
        .clone()
        .oneshot(json_post("/workspaces/w1/updates", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_post("/workspaces/w1/updates", &body, Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_query_token_is_refused_on_writes() {
    let (app, registry) = test_router();
    let token = test_token("alice");
    let body = json!({ "update": encode_base64(&sample_delta()) });

    let uri = format!("/workspaces/w1/updates?token={}", token);
    let response = app.oneshot(json_post(&uri, &body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(registry.get("w1").await.is_none());
}

#[tokio::test]
async fn test_update_merges_into_hub() {
    let (app, registry) = test_router();
    let token = test_token("alice");
    let body = json!({ "update": encode_base64(&sample_delta()) });

    let response = app
        .oneshot(json_post("/workspaces/w1/updates", &body, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let room = registry.get("w1").await.expect("room created by the update");
    assert_eq!(room.snapshot().await.screen("s1").and_then(|s| s.height), Some(240.0));
}

#[tokio::test]
async fn test_malformed_update_is_rejected() {
    let (app, registry) = test_router();
    let token = test_token("alice");

    let response = app
        .clone()
        .oneshot(json_post("/workspaces/w1/updates", &json!({ "update": "%%%" }), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // valid base64, not a delta
    let garbage = encode_base64(&[0xff, 0x01]);
    let response = app
        .oneshot(json_post("/workspaces/w1/updates", &json!({ "update": garbage }), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);

    let room = registry.get_or_create("w1").await;
    assert!(room.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_state_exchange_returns_missing_delta() {
    let (app, registry) = test_router();
    let token = test_token("bob");
    registry.apply_client_delta("w1", &sample_delta(), None).await.unwrap();

    let empty = ReplicaDocument::new();
    let body = json!({ "stateVector": encode_base64(&empty.state_vector()) });
    let response = app
        .clone()
        .oneshot(json_post("/workspaces/w1/state", &body, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let state: StateResponse = serde_json::from_value(json_body(response).await).unwrap();
    let missing = state.delta().unwrap();
    empty.apply_delta(&missing, Origin::RemoteSync).unwrap();
    assert_eq!(empty.snapshot().screen("s1").and_then(|s| s.height), Some(240.0));

    // now current: no update field
    let body = json!({ "stateVector": encode_base64(&empty.state_vector()) });
    let response = app
        .oneshot(json_post("/workspaces/w1/state", &body, Some(&token)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body.get("update").is_none());
    assert!(body.get("stateVector").is_some());
}

#[tokio::test]
async fn test_malformed_state_vector_is_rejected() {
    let (app, _) = test_router();
    let token = test_token("bob");
    let body = json!({ "stateVector": encode_base64(&[0xff, 0xff, 0xff]) });

    let response = app
        .oneshot(json_post("/workspaces/w1/state", &body, Some(&token)))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_events_start_with_full_state() {
    let (app, registry) = test_router();
    let token = test_token("carol");
    registry.apply_client_delta("w1", &sample_delta(), None).await.unwrap();

    let request = Request::builder()
        .uri(format!("/workspaces/w1/events?token={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = body.next().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.starts_with("event: delta-update\n"), "unexpected frame: {}", text);

    let data = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("data line");
    let replica = ReplicaDocument::new();
    replica.apply_delta(&decode_delta(data).unwrap(), Origin::Remote).unwrap();
    assert_eq!(replica.snapshot().screen("s1").and_then(|s| s.height), Some(240.0));
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = test_router();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}
