//! Snapshot persistence and load-time migration.
//!
//! Only `{ libraries, conversations }` are persisted; selection state is
//! rebuilt at runtime. The snapshot is stored as one JSON record under a
//! namespace key together with its schema version:
//!
//! ```json
//! { "version": 2, "state": { "libraries": [...], "conversations": [...] } }
//! ```
//!
//! # Versions
//!
//! | Version | Change |
//! |---------|--------|
//! | 0, 1 | May contain locally-fabricated conversation ids |
//! | 2 | Conversation ids are canonical UUIDs confirmed by the backend |
//!
//! [`migrate`] is a pure function so each step can be tested without a
//! storage backend. Storage itself sits behind [`SnapshotStore`], with a
//! SQLite implementation for the CLI and an in-memory one for tests.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::config::StorageConfig;
use crate::db;
use crate::error::SyncResult;
use crate::migrate;
use crate::models::{Conversation, Library};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// The persisted projection of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    version: u32,
    state: Snapshot,
}

static UUID_PATTERN: OnceLock<Regex> = OnceLock::new();

/// True if `id` is a canonical hyphenated UUID (case-insensitive).
pub fn is_canonical_uuid(id: &str) -> bool {
    UUID_PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
                .expect("uuid pattern is valid")
        })
        .is_match(id)
}

/// Bring a snapshot written at `from_version` up to [`SNAPSHOT_VERSION`].
pub fn migrate(mut snapshot: Snapshot, from_version: u32) -> Snapshot {
    if from_version < 2 {
        let before = snapshot.conversations.len();
        snapshot
            .conversations
            .retain(|c| is_canonical_uuid(&c.id));
        let dropped = before - snapshot.conversations.len();
        if dropped > 0 {
            tracing::info!(dropped, "discarded conversations with non-canonical ids");
        }
    }
    snapshot
}

/// Durable key-value storage for serialized snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `(version, json)` for `key`, if present.
    async fn read(&self, key: &str) -> SyncResult<Option<(u32, String)>>;

    async fn write(&self, key: &str, version: u32, value: &str) -> SyncResult<()>;
}

/// Load and migrate the snapshot stored under `key`.
///
/// A missing record yields an empty snapshot. A record that cannot be
/// decoded, or that was written by a newer schema, is ignored with a
/// warning rather than failing startup.
pub async fn load_snapshot(store: &dyn SnapshotStore, key: &str) -> SyncResult<Snapshot> {
    let Some((version, raw)) = store.read(key).await? else {
        return Ok(Snapshot::default());
    };
    if version > SNAPSHOT_VERSION {
        tracing::warn!(
            version,
            supported = SNAPSHOT_VERSION,
            "snapshot written by a newer schema; starting empty"
        );
        return Ok(Snapshot::default());
    }
    match serde_json::from_str::<PersistedRecord>(&raw) {
        Ok(record) => Ok(migrate(record.state, version)),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable snapshot; starting empty");
            Ok(Snapshot::default())
        }
    }
}

/// Serialize and store `snapshot` under `key` at the current version.
pub async fn save_snapshot(
    store: &dyn SnapshotStore,
    key: &str,
    snapshot: &Snapshot,
) -> SyncResult<()> {
    let record = PersistedRecord {
        version: SNAPSHOT_VERSION,
        state: snapshot.clone(),
    };
    let raw = serde_json::to_string(&record)?;
    store.write(key, SNAPSHOT_VERSION, &raw).await
}

// ============ SQLite store ============

/// Snapshot store backed by the `kv_store` table.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Open (creating if needed) the database at `config.path`.
    pub async fn open(config: &StorageConfig) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn read(&self, key: &str) -> SyncResult<Option<(u32, String)>> {
        let row = sqlx::query("SELECT value, version FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| {
            let version: i64 = row.get("version");
            let value: String = row.get("value");
            // out of range reads as newer than anything we can decode
            (u32::try_from(version).unwrap_or(u32::MAX), value)
        }))
    }

    async fn write(&self, key: &str, version: u32, value: &str) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, version, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(version as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============ In-memory store ============

/// Snapshot store that lives only as long as the process.
#[derive(Default)]
pub struct MemorySnapshotStore {
    records: RwLock<HashMap<String, (u32, String)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self, key: &str) -> SyncResult<Option<(u32, String)>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn write(&self, key: &str, version: u32, value: &str) -> SyncResult<()> {
        self.records
            .write()
            .insert(key.to_string(), (version, value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn conv(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            library_id: "lib".to_string(),
            title: "t".to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lib(id: &str) -> Library {
        Library {
            id: id.to_string(),
            name: "n".to_string(),
            description: None,
            documents: Vec::new(),
            created_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_uuid_pattern() {
        assert!(is_canonical_uuid("123e4567-e89b-42d3-a456-426614174000"));
        assert!(is_canonical_uuid("123E4567-E89B-42D3-A456-426614174000"));
        assert!(!is_canonical_uuid("local-42"));
        assert!(!is_canonical_uuid("123e4567e89b42d3a456426614174000"));
        assert!(!is_canonical_uuid("{123e4567-e89b-42d3-a456-426614174000}"));
        assert!(!is_canonical_uuid(" 123e4567-e89b-42d3-a456-426614174000"));
    }

    #[test]
    fn test_migrate_from_v1_drops_local_ids() {
        let good = "0f8fad5b-d9cb-469f-a165-70867728950e";
        let snapshot = Snapshot {
            libraries: vec![lib("not-a-uuid-library")],
            conversations: vec![conv("local-42"), conv(good), conv("1700000000000")],
        };
        let migrated = migrate(snapshot, 1);
        assert_eq!(migrated.conversations.len(), 1);
        assert_eq!(migrated.conversations[0].id, good);
        // libraries are never filtered
        assert_eq!(migrated.libraries.len(), 1);
    }

    #[test]
    fn test_migrate_current_version_is_identity() {
        let snapshot = Snapshot {
            libraries: vec![],
            conversations: vec![conv("local-42")],
        };
        let migrated = migrate(snapshot.clone(), SNAPSHOT_VERSION);
        assert_eq!(migrated, snapshot);
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let store = MemorySnapshotStore::new();
        let snapshot = load_snapshot(&store, "ns").await.unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemorySnapshotStore::new();
        let snapshot = Snapshot {
            libraries: vec![lib("l1")],
            conversations: vec![conv("0f8fad5b-d9cb-469f-a165-70867728950e")],
        };
        save_snapshot(&store, "ns", &snapshot).await.unwrap();
        let loaded = load_snapshot(&store, "ns").await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(store.read("ns").await.unwrap().unwrap().0, SNAPSHOT_VERSION);
    }

    #[tokio::test]
    async fn test_load_legacy_record_runs_migration() {
        let store = MemorySnapshotStore::new();
        let legacy = PersistedRecord {
            version: 1,
            state: Snapshot {
                libraries: vec![],
                conversations: vec![conv("local-42")],
            },
        };
        store
            .write("ns", 1, &serde_json::to_string(&legacy).unwrap())
            .await
            .unwrap();
        let loaded = load_snapshot(&store, "ns").await.unwrap();
        assert!(loaded.conversations.is_empty());
    }

    #[tokio::test]
    async fn test_load_ignores_garbage_and_future_versions() {
        let store = MemorySnapshotStore::new();
        store.write("bad", 2, "{not json").await.unwrap();
        assert_eq!(load_snapshot(&store, "bad").await.unwrap(), Snapshot::default());

        let future = serde_json::json!({
            "version": 99,
            "state": { "libraries": [], "conversations": [] }
        });
        store.write("future", 99, &future.to_string()).await.unwrap();
        assert_eq!(load_snapshot(&store, "future").await.unwrap(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            path: tmp.path().join("data").join("shelf.sqlite"),
            namespace: "ns".to_string(),
        };
        let store = SqliteSnapshotStore::open(&config).await.unwrap();
        assert!(store.read("ns").await.unwrap().is_none());

        store.write("ns", 1, "first").await.unwrap();
        store.write("ns", 2, "second").await.unwrap();
        assert_eq!(
            store.read("ns").await.unwrap(),
            Some((2, "second".to_string()))
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_out_of_range_version_is_not_truncated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            path: tmp.path().join("shelf.sqlite"),
            namespace: "ns".to_string(),
        };
        let store = SqliteSnapshotStore::open(&config).await.unwrap();
        let snapshot = Snapshot {
            libraries: vec![lib("l1")],
            conversations: Vec::new(),
        };
        save_snapshot(&store, "ns", &snapshot).await.unwrap();

        // 2^32 + 2 would read as version 2 if truncated
        sqlx::query("UPDATE kv_store SET version = ? WHERE key = ?")
            .bind((1i64 << 32) + 2)
            .bind("ns")
            .execute(&store.pool)
            .await
            .unwrap();

        assert_eq!(store.read("ns").await.unwrap().unwrap().0, u32::MAX);
        assert_eq!(load_snapshot(&store, "ns").await.unwrap(), Snapshot::default());

        sqlx::query("UPDATE kv_store SET version = -1 WHERE key = ?")
            .bind("ns")
            .execute(&store.pool)
            .await
            .unwrap();
        assert_eq!(load_snapshot(&store, "ns").await.unwrap(), Snapshot::default());
        store.close().await;
    }
}
