//! Client and hub sync scenarios over the loopback transport

use crate::common::{settle, TestHub};
use crate::{assert_converged, assert_ok};
use pretty_assertions::assert_eq;
use xfcanvas::client::{ConnectionState, SyncState};
use xfcanvas::shared::{Arrow, ConversationPoint, Position};

fn arrow(touchable: &str, target: &str) -> Arrow {
    Arrow {
        touchable_id: touchable.to_string(),
        target_screen_id: target.to_string(),
        start_point: Position::new(1.0, 2.0),
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_move_reaches_connected_peer() {
    let hub = TestHub::new();
    let a = hub.connected_client().await;
    let b = hub.connected_client().await;

    a.manager.apply_local_mutation(|ws| ws.upsert_screen("s1"));
    settle().await;
    assert!(b.snapshot().screen("s1").is_some());

    a.go_offline();
    settle().await;
    assert_eq!(a.manager.status().connection, ConnectionState::Disconnected);

    a.manager
        .apply_local_mutation(|ws| ws.set_position("s1", Position::new(100.0, 200.0)));
    settle().await;
    assert_eq!(b.snapshot().screen("s1").and_then(|s| s.position), None);

    a.reconnect().await;
    settle().await;

    assert_eq!(
        b.snapshot().screen("s1").and_then(|s| s.position),
        Some(Position::new(100.0, 200.0))
    );
    assert!(b.manager.status().is_synced());
    assert_converged!(a, b);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_offline_points_are_both_kept() {
    let hub = TestHub::new();
    let a = hub.client();
    let b = hub.client();

    a.manager.apply_local_mutation(|ws| {
        ws.put_conversation_point("s1", &ConversationPoint::new(2_000, "second").with_html("<p>b</p>"))
    });
    b.manager.apply_local_mutation(|ws| {
        ws.put_conversation_point("s1", &ConversationPoint::new(1_000, "first").with_html("<p>a</p>"))
    });

    assert_ok!(a.manager.connect().await);
    assert_ok!(b.manager.connect().await);
    settle().await;

    let points = hub.snapshot().await.screens["s1"].conversation_points.clone();
    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![1_000, 2_000]);
    assert_converged!(a, b);
    assert_eq!(a.snapshot(), hub.snapshot().await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_arrow_edits_resolve_to_one_list() {
    let hub = TestHub::new();
    let a = hub.connected_client().await;
    let b = hub.connected_client().await;

    a.manager
        .apply_local_mutation(|ws| ws.put_conversation_point("s1", &ConversationPoint::new(5, "p")));
    settle().await;

    a.go_offline();
    b.go_offline();
    settle().await;

    let from_a = vec![arrow("btn-a", "s2")];
    let from_b = vec![arrow("btn-b", "s3"), arrow("btn-c", "s4")];
    a.manager.apply_local_mutation(|ws| ws.set_arrows("s1", 5, &from_a));
    b.manager.apply_local_mutation(|ws| ws.set_arrows("s1", 5, &from_b));

    a.reconnect().await;
    b.reconnect().await;
    settle().await;

    let winner = hub.snapshot().await.screens["s1"].point(5).map(|p| p.arrows.clone());
    let winner = winner.expect("point survives");
    assert!(winner == from_a || winner == from_b, "arrow lists were mixed: {:?}", winner);
    assert_converged!(a, b);
}

#[tokio::test(start_paused = true)]
async fn test_all_offline_edits_reach_the_hub() {
    const EDITS: i64 = 25;
    let hub = TestHub::new();
    let client = hub.connected_client().await;

    client.go_offline();
    settle().await;
    for ts in 0..EDITS {
        client.manager.apply_local_mutation(|ws| {
            ws.put_conversation_point("s1", &ConversationPoint::new(ts, format!("prompt {}", ts)))
        });
    }
    assert_eq!(client.manager.status().offline_count, EDITS as usize);

    client.reconnect().await;
    settle().await;

    let screen = hub.snapshot().await.screens["s1"].clone();
    assert_eq!(screen.conversation_points.len(), EDITS as usize);
    let status = client.manager.status();
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.offline_count + status.pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_pulls_changes_made_while_offline() {
    let hub = TestHub::new();
    let a = hub.connected_client().await;
    let b = hub.connected_client().await;

    a.go_offline();
    settle().await;
    b.manager.apply_local_mutation(|ws| ws.set_height("s7", 480.0));
    b.manager.apply_local_mutation(|ws| ws.set_selected_index("s7", 3));
    settle().await;
    assert!(a.snapshot().screen("s7").is_none());

    a.reconnect().await;
    let screen = a.snapshot().screen("s7").cloned().expect("pulled by the state exchange");
    assert_eq!(screen.height, Some(480.0));
    assert_eq!(screen.selected_index, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_removal_propagates() {
    let hub = TestHub::new();
    let a = hub.connected_client().await;
    let b = hub.connected_client().await;

    a.manager.apply_local_mutation(|ws| {
        ws.put_conversation_point("s1", &ConversationPoint::new(1, "keep"));
        ws.put_conversation_point("s1", &ConversationPoint::new(2, "drop"));
        ws.upsert_screen("gone");
    });
    settle().await;

    b.manager.apply_local_mutation(|ws| {
        ws.remove_conversation_point("s1", 2);
        ws.remove_screen("gone");
    });
    settle().await;

    let snapshot = a.snapshot();
    assert!(snapshot.screen("gone").is_none());
    let timestamps: Vec<i64> = snapshot.screens["s1"]
        .conversation_points
        .iter()
        .map(|p| p.timestamp)
        .collect();
    assert_eq!(timestamps, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_status_tracks_connection_loss() {
    let hub = TestHub::new();
    let client = hub.connected_client().await;
    let mut status = client.manager.subscribe_status();
    assert!(status.borrow_and_update().is_synced());

    client.go_offline();
    settle().await;
    assert!(status.has_changed().unwrap_or(false));
    let current = status.borrow_and_update().clone();
    assert_eq!(current.connection, ConnectionState::Disconnected);
    assert_eq!(current.state, SyncState::Error);
    assert!(current.last_error.is_some());

    client.reconnect().await;
    assert!(client.manager.status().is_synced());
}
