//! Reconciliation of live workspaces into the relational store

use crate::common::{settle, TestHub, WORKSPACE};
use pretty_assertions::assert_eq;
use std::time::Duration;
use xfcanvas::backend::collab::HubConfig;
use xfcanvas::backend::persistence::{point_row_id, MemoryWorkspaceStore};
use xfcanvas::shared::{ConversationPoint, Origin, Position, ReplicaDocument, ScreenEntry, WorkspaceSnapshot};

fn evict_when_idle() -> HubConfig {
    HubConfig {
        idle_timeout: Duration::ZERO,
        ..HubConfig::default()
    }
}

fn populated_delta() -> Vec<u8> {
    ReplicaDocument::new()
        .mutate(|ws| {
            ws.set_position("s1", Position::new(10.0, 20.0));
            ws.put_conversation_point("s1", &ConversationPoint::new(1, "a").with_html("<p>1</p>"));
            ws.put_conversation_point("s1", &ConversationPoint::new(2, "b"));
            ws.put_conversation_point("s1", &ConversationPoint::new(3, "c").with_html("<p>3</p>"));
            ws.set_height("s2", 100.0);
        })
        .unwrap()
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let hub = TestHub::new();
    let room = hub.room().await;
    room.apply_client_delta(&populated_delta(), None).await.unwrap();

    room.persist().await.unwrap();
    assert!(hub.store.rows(WORKSPACE).await.workspace_exists);
    let writes = hub.store.write_count();
    assert!(writes > 0);

    let second = room.persist().await.unwrap();
    assert!(second.is_noop());
    assert_eq!(hub.store.write_count(), writes);
}

#[tokio::test]
async fn test_rows_match_durable_content() {
    let hub = TestHub::new();
    let room = hub.room().await;
    room.apply_client_delta(&populated_delta(), None).await.unwrap();
    room.persist().await.unwrap();

    let rows = hub.store.rows(WORKSPACE).await;
    assert!(rows.workspace_exists);
    let mut screen_ids: Vec<&str> = rows.screens.iter().map(|s| s.id.as_str()).collect();
    screen_ids.sort();
    assert_eq!(screen_ids, vec!["s1", "s2"]);

    let mut point_ids: Vec<String> = rows.points.iter().map(|p| p.id.clone()).collect();
    point_ids.sort();
    assert_eq!(point_ids, vec![point_row_id("s1", 1), point_row_id("s1", 3)]);

    // remove a screen and a durable point, then reconcile again
    let follow_up = {
        let replica = ReplicaDocument::from_state(&room.encode_full_state().await, Origin::Remote).unwrap();
        replica
            .mutate(|ws| {
                ws.remove_screen("s2");
                ws.remove_conversation_point("s1", 3);
            })
            .unwrap()
    };
    room.apply_client_delta(&follow_up, None).await.unwrap();
    room.persist().await.unwrap();

    let rows = hub.store.rows(WORKSPACE).await;
    assert_eq!(rows.screens.len(), 1);
    assert_eq!(rows.points.len(), 1);
    assert_eq!(rows.points[0].id, point_row_id("s1", 1));
    assert!(rows.points.iter().all(|p| rows.screens.iter().any(|s| s.id == p.screen_id)));
}

#[tokio::test]
async fn test_new_room_loads_durable_baseline() {
    let stored = WorkspaceSnapshot::new().with_screen(
        ScreenEntry::new("s1")
            .with_position(Position::new(5.0, 6.0))
            .with_point(ConversationPoint::new(42, "hello").with_html("<b>hi</b>")),
    );
    let hub = TestHub::seeded(&stored).await;

    let room = hub.room().await;
    assert!(room.is_baseline_loaded());
    assert_eq!(room.snapshot().await, stored);

    // the first pass only adds the encoded state next to the rows
    let report = room.persist().await.unwrap();
    assert!(report.state_written);
    assert_eq!(report.total_writes(), 1);
    assert!(hub.store.state(WORKSPACE).await.is_some());
    assert!(room.persist().await.unwrap().is_noop());
}

#[tokio::test]
async fn test_store_failure_leaves_live_replica_intact() {
    let hub = TestHub::new();
    let room = hub.room().await;
    hub.store.set_failing(true);

    room.apply_client_delta(&populated_delta(), None).await.unwrap();
    assert!(room.persist().await.is_err());
    assert_eq!(room.snapshot().await.screens.len(), 2);

    let stats = room.persistence_stats();
    assert!(stats.failures >= 1);
    assert!(stats.last_error.is_some());

    hub.store.set_failing(false);
    room.persist().await.unwrap();
    assert_eq!(hub.store.rows(WORKSPACE).await.screens.len(), 2);
    assert!(room.persistence_stats().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_merged_deltas_are_persisted_in_background() {
    let hub = TestHub::new();
    let client = hub.connected_client().await;

    client.manager.apply_local_mutation(|ws| {
        ws.put_conversation_point("s1", &ConversationPoint::new(9, "p").with_html("<i>x</i>"))
    });
    settle().await;

    let rows = hub.store.rows(WORKSPACE).await;
    assert_eq!(rows.points.len(), 1);
    assert!(hub.room().await.persistence_stats().runs >= 1);
}

#[tokio::test]
async fn test_sweep_evicts_idle_rooms_after_persisting() {
    let hub = TestHub::with_store(MemoryWorkspaceStore::new(), evict_when_idle());
    hub.registry
        .apply_client_delta(WORKSPACE, &populated_delta(), None)
        .await
        .unwrap();

    let report = hub.registry.sweep().await;
    assert_eq!(report.evicted, vec![WORKSPACE.to_string()]);
    assert!(hub.registry.is_empty().await);
    assert_eq!(hub.store.rows(WORKSPACE).await.screens.len(), 2);

    // a fresh room comes back from the store
    let snapshot = hub.snapshot().await;
    assert_eq!(snapshot.screens.len(), 2);
}

#[tokio::test]
async fn test_failed_eviction_keeps_room() {
    let hub = TestHub::new();
    hub.registry
        .apply_client_delta(WORKSPACE, &populated_delta(), None)
        .await
        .unwrap();
    hub.store.set_failing(true);

    assert!(hub.registry.evict(WORKSPACE).await.is_err());
    assert_eq!(hub.registry.len().await, 1);
    assert!(!hub.registry.evict("unknown").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_offline_edit_survives_eviction() {
    // client ids are random, so run the scenario several times
    for _ in 0..10 {
        let hub = TestHub::with_store(MemoryWorkspaceStore::new(), evict_when_idle());
        let client = hub.connected_client().await;

        client
            .manager
            .apply_local_mutation(|ws| ws.set_position("s1", Position::new(10.0, 10.0)));
        settle().await;
        client.go_offline();
        settle().await;

        assert_eq!(hub.registry.sweep().await.evicted, vec![WORKSPACE.to_string()]);

        client
            .manager
            .apply_local_mutation(|ws| ws.set_position("s1", Position::new(100.0, 200.0)));
        client.reconnect().await;
        settle().await;

        let expected = Some(Position::new(100.0, 200.0));
        assert_eq!(hub.snapshot().await.screen("s1").and_then(|s| s.position), expected);
        assert_eq!(client.snapshot().screen("s1").and_then(|s| s.position), expected);
    }
}

#[tokio::test]
async fn test_evicted_room_is_restored_with_history() {
    let hub = TestHub::with_store(MemoryWorkspaceStore::new(), evict_when_idle());
    let peer = ReplicaDocument::new();
    let first = peer.mutate(|ws| ws.set_height("s1", 1.0)).unwrap();
    hub.registry.apply_client_delta(WORKSPACE, &first, None).await.unwrap();
    assert!(hub.registry.evict(WORKSPACE).await.unwrap());

    // an edit the peer made on top of what the evicted room had seen
    let second = peer.mutate(|ws| ws.set_height("s1", 2.0)).unwrap();
    hub.registry.apply_client_delta(WORKSPACE, &second, None).await.unwrap();

    assert_eq!(hub.snapshot().await, peer.snapshot());
    let room = hub.room().await;
    assert!(room.compute_missing_delta(&peer.state_vector()).await.unwrap().missing.is_empty());
}
