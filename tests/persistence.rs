//! Snapshot persistence across store restarts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use docshelf::config::StorageConfig;
use docshelf::gateway::memory::{InMemoryGateway, Op};
use docshelf::models::Conversation;
use docshelf::persist::{
    MemorySnapshotStore, Snapshot, SnapshotStore, SqliteSnapshotStore, SNAPSHOT_VERSION,
};
use docshelf::{SyncError, SyncResult, SyncedStore};
use tempfile::TempDir;

const KEY: &str = "docshelf-store";

fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        library_id: "lib".to_string(),
        title: "t".to_string(),
        messages: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct BrokenStore;

#[async_trait]
impl SnapshotStore for BrokenStore {
    async fn read(&self, _key: &str) -> SyncResult<Option<(u32, String)>> {
        Ok(None)
    }

    async fn write(&self, _key: &str, _version: u32, _value: &str) -> SyncResult<()> {
        Err(SyncError::Storage("disk full".to_string()))
    }
}

#[tokio::test]
async fn test_restart_restores_cached_model() {
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());

    let gateway = InMemoryGateway::new();
    let lib_id = gateway.insert_library("Physics", None, Some("science"));
    gateway.insert_conversation(&lib_id, "Chat A");
    let store = SyncedStore::open(gateway, snapshots.clone(), KEY).await.unwrap();
    store.initialize().await.unwrap();
    store.set_current_library(store.library(&lib_id));

    // a fresh process with an unreachable backend
    let offline = InMemoryGateway::new();
    offline.fail(Op::ListLibraries);
    let restored = SyncedStore::open(offline, snapshots, KEY).await.unwrap();

    assert_eq!(restored.libraries().len(), 1);
    assert_eq!(restored.libraries()[0].tags, vec!["science"]);
    assert_eq!(restored.conversations().len(), 1);
    // selections are not persisted
    assert!(restored.current_library().is_none());
    assert!(restored.current_conversation().is_none());
    assert!(restored.gateway().calls().is_empty());

    assert!(restored.fetch_libraries().await.is_err());
    assert_eq!(restored.libraries().len(), 1);
}

#[tokio::test]
async fn test_legacy_snapshot_is_migrated_on_open() {
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let good = "0f8fad5b-d9cb-469f-a165-70867728950e";
    let state = Snapshot {
        libraries: Vec::new(),
        conversations: vec![conversation("local-42"), conversation(good)],
    };
    let legacy = serde_json::json!({ "version": 1, "state": state });
    snapshots.write(KEY, 1, &legacy.to_string()).await.unwrap();

    let store = SyncedStore::open(InMemoryGateway::new(), snapshots.clone(), KEY)
        .await
        .unwrap();
    let ids: Vec<String> = store.conversations().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![good.to_string()]);

    // the next save rewrites the record at the current version
    store.save().await.unwrap();
    let (version, _) = snapshots.read(KEY).await.unwrap().unwrap();
    assert_eq!(version, SNAPSHOT_VERSION);
}

#[tokio::test]
async fn test_storage_failure_does_not_fail_operations() {
    let gateway = InMemoryGateway::new();
    gateway.insert_library("A", None, None);
    let store = SyncedStore::open(gateway, Arc::new(BrokenStore), KEY)
        .await
        .unwrap();

    store.fetch_libraries().await.unwrap();
    assert_eq!(store.libraries().len(), 1);

    let err = store.save().await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));
    assert!(!err.is_remote());
}

#[tokio::test]
async fn test_sqlite_snapshot_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let config = StorageConfig {
        path: tmp.path().join("data").join("shelf.sqlite"),
        namespace: KEY.to_string(),
    };

    let sqlite = Arc::new(SqliteSnapshotStore::open(&config).await.unwrap());
    let gateway = InMemoryGateway::new();
    let lib_id = gateway.insert_library("Physics", None, None);
    gateway
        .insert_document(&lib_id, "mechanics.pdf", &["Newton", "Kepler"])
        .unwrap();
    let conv_id = gateway.insert_conversation(&lib_id, "Chat A");
    let store = SyncedStore::open(gateway, sqlite.clone(), KEY).await.unwrap();
    store.initialize().await.unwrap();
    drop(store);
    sqlite.close().await;

    let reopened = Arc::new(SqliteSnapshotStore::open(&config).await.unwrap());
    let restored = SyncedStore::open(InMemoryGateway::new(), reopened.clone(), KEY)
        .await
        .unwrap();

    let library = restored.library(&lib_id).unwrap();
    assert_eq!(library.documents.len(), 1);
    assert_eq!(library.documents[0].chunks.len(), 2);
    assert_eq!(restored.conversation(&conv_id).unwrap().title, "Chat A");
    reopened.close().await;
}

#[tokio::test]
async fn test_namespaces_are_independent() {
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
    let gateway = InMemoryGateway::new();
    gateway.insert_library("A", None, None);
    let store = SyncedStore::open(gateway, snapshots.clone(), "work").await.unwrap();
    store.fetch_libraries().await.unwrap();

    let other = SyncedStore::open(InMemoryGateway::new(), snapshots, "home")
        .await
        .unwrap();
    assert!(other.libraries().is_empty());
}
