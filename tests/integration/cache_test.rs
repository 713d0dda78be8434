//! Local cache on disk and offline bootstrap from it

use xfcanvas::client::LocalCache;
use xfcanvas::shared::{Origin, Position, ReplicaDocument};

#[tokio::test]
async fn test_cached_state_restores_replica() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replicas.db");

    let replica = ReplicaDocument::new();
    replica.mutate(|ws| ws.set_position("s1", Position::new(3.0, 4.0)));
    {
        let cache = LocalCache::open(&path).await.unwrap();
        cache.store("w1", &replica.encode_full_state()).await.unwrap();
    }

    let cache = LocalCache::open(&path).await.unwrap();
    let state = cache.load("w1").await.unwrap().expect("state was stored");
    let restored = ReplicaDocument::from_state(&state, Origin::Cache).unwrap();
    assert_eq!(restored.snapshot(), replica.snapshot());
    assert_eq!(cache.load("other").await.unwrap(), None);
}

#[cfg(feature = "ssr")]
mod with_hub {
    use crate::common::{settle, TestHub};
    use xfcanvas::client::{LocalCache, SyncState};
    use xfcanvas::shared::{ConversationPoint, Origin, ReplicaDocument};

    #[tokio::test]
    async fn test_offline_edits_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replicas.db");
        let hub = TestHub::new();

        // first session never reaches the server
        {
            let cache = LocalCache::open(&path).await.unwrap();
            let client = hub.client_with_cache(Some(cache));
            client.manager.apply_local_mutation(|ws| {
                ws.put_conversation_point("s1", &ConversationPoint::new(7, "draft").with_html("<p>d</p>"))
            });
            client.manager.close().await.unwrap();
        }
        assert!(hub.snapshot().await.is_empty());

        // second session restores from the cache and pushes on connect
        let cache = LocalCache::open(&path).await.unwrap();
        let client = hub.client_with_cache(Some(cache));
        assert!(client.manager.load_from_cache().await.unwrap());
        assert_eq!(client.manager.status().offline_count, 0);

        client.manager.connect().await.unwrap();
        settle().await;

        let screen = hub.snapshot().await.screens["s1"].clone();
        assert_eq!(screen.point(7).map(|p| p.prompt.as_str()), Some("draft"));
        assert_eq!(client.manager.status().state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_remote_changes_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replicas.db");
        let hub = TestHub::new();

        let writer = hub.connected_client().await;
        let cache = LocalCache::open(&path).await.unwrap();
        let reader = hub.client_with_cache(Some(cache.clone()));
        reader.manager.connect().await.unwrap();

        writer.manager.apply_local_mutation(|ws| ws.set_height("s3", 64.0));
        settle().await;

        let state = cache.load(reader.manager.workspace_id()).await.unwrap().expect("cache written");
        let restored = ReplicaDocument::from_state(&state, Origin::Cache).unwrap();
        assert_eq!(restored.snapshot().screen("s3").and_then(|s| s.height), Some(64.0));
    }
}
