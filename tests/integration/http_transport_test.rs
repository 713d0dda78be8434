//! Client managers syncing through a real server socket

use crate::common::{test_router, test_token};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use xfcanvas::client::{ClientConfig, ClientError, ClientReplicaManager, HttpTransport, TransportError};
use xfcanvas::shared::{AppConfig, Position};

async fn spawn_server() -> SocketAddr {
    let (app, _) = test_router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn manager(addr: SocketAddr, token: Option<String>) -> ClientReplicaManager {
    let builder = AppConfig::builder()
        .server_url(format!("http://{}", addr))
        .debounce(Duration::from_millis(20))
        .auto_reconnect(false);
    let mut config = ClientConfig::with_builder(builder).unwrap();
    config.set_token(token);
    let app = config.app().clone();
    ClientReplicaManager::new("w-http", Arc::new(HttpTransport::new(config)), app, None)
}

/// Poll until `check` holds or two seconds pass
async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_edit_reaches_peer_over_sse() {
    let addr = spawn_server().await;
    let a = manager(addr, Some(test_token("alice")));
    let b = manager(addr, Some(test_token("bob")));
    a.connect().await.unwrap();
    b.connect().await.unwrap();

    a.apply_local_mutation(|ws| ws.set_position("s1", Position::new(100.0, 200.0)));

    let seen = eventually(|| b.snapshot().screen("s1").and_then(|s| s.position) == Some(Position::new(100.0, 200.0))).await;
    assert!(seen, "peer never received the move");
    assert!(eventually(|| a.status().is_synced()).await);
}

#[tokio::test]
async fn test_missing_token_is_not_retryable() {
    let addr = spawn_server().await;
    let client = manager(addr, None);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Reconciliation { .. }), "got {:?}", err);
    assert!(client.status().last_error.is_some());
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::with_builder(AppConfig::builder().server_url(format!("http://{}", addr))).unwrap();
    let transport = HttpTransport::new(config);
    let err = xfcanvas::client::SyncTransport::fetch_missing(&transport, "w", &[0])
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
    assert!(err.is_retryable());
}
