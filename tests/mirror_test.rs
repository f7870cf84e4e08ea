// Tests for the mirrored backup path

use async_trait::async_trait;
use chatkeep::db::{ChatRecord, Database, Message, Role};
use chatkeep::store::mirror::backup_key;
use chatkeep::store::{BackupMirror, ChatStore, FileMirror, MemoryMirror, MirroredStore, SqliteStore};
use tempfile::TempDir;

fn sqlite(temp: &TempDir, name: &str) -> SqliteStore {
    let db = Database::open(temp.path().join(name)).into_option().unwrap();
    SqliteStore::new(db)
}

fn record(id: &str) -> ChatRecord {
    ChatRecord::new(
        id,
        vec![
            Message::new(Role::User, "hello"),
            Message::new(Role::Assistant, "hi"),
        ],
    )
    .with_url_id(id)
    .with_description("Greeting")
}

/// Mirror whose every operation fails
struct BrokenMirror;

#[async_trait]
impl BackupMirror for BrokenMirror {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("mirror offline")
    }

    async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("mirror offline")
    }

    async fn remove(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("mirror offline")
    }
}

#[tokio::test]
async fn test_put_writes_mirror() {
    let temp = TempDir::new().unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), MemoryMirror::new());

    store.put(&record("1")).await.unwrap();

    let text = store.mirror().get(&backup_key("1")).await.unwrap().unwrap();
    let mirrored: ChatRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(mirrored, record("1"));
}

#[tokio::test]
async fn test_primary_miss_recovers_from_mirror() {
    let temp = TempDir::new().unwrap();
    let mirror = MemoryMirror::new();
    let backup = record("42");
    mirror
        .set(&backup_key("42"), &serde_json::to_string(&backup).unwrap())
        .await
        .unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), mirror);

    assert!(store.inner().get("42").await.unwrap().is_none());

    let found = store.resolve("42").await.unwrap().unwrap();
    assert_eq!(found, backup);

    // Self-healed into the primary store
    assert_eq!(store.inner().get("42").await.unwrap(), Some(backup));
}

#[tokio::test]
async fn test_get_also_consults_mirror() {
    let temp = TempDir::new().unwrap();
    let mirror = MemoryMirror::new();
    mirror
        .set(&backup_key("7"), &serde_json::to_string(&record("7")).unwrap())
        .await
        .unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), mirror);

    assert!(store.get("7").await.unwrap().is_some());
    assert!(store.get("8").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_removes_mirror_entry() {
    let temp = TempDir::new().unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), MemoryMirror::new());
    store.put(&record("1")).await.unwrap();

    store.delete_by_id("1").await.unwrap();

    assert!(store.mirror().is_empty().await);
    assert!(store.resolve("1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mirror_failures_are_not_propagated() {
    let temp = TempDir::new().unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), BrokenMirror);

    store.put(&record("1")).await.unwrap();
    assert_eq!(store.get("1").await.unwrap(), Some(record("1")));
    assert!(store.get("2").await.unwrap().is_none());
    store.delete_by_id("1").await.unwrap();
}

#[tokio::test]
async fn test_file_mirror_survives_lost_database() {
    let temp = TempDir::new().unwrap();
    let backup_dir = temp.path().join("backup");

    let first = MirroredStore::new(sqlite(&temp, "first.db"), FileMirror::new(&backup_dir));
    first.put(&record("3")).await.unwrap();
    assert!(backup_dir.join("chat_backup_3.json").exists());

    // A fresh primary store sharing the same backup directory
    let second = MirroredStore::new(sqlite(&temp, "second.db"), FileMirror::new(&backup_dir));
    let recovered = second.resolve("3").await.unwrap().unwrap();
    assert_eq!(recovered, record("3"));
    assert_eq!(second.inner().get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_composite_operations_go_through_mirror() {
    let temp = TempDir::new().unwrap();
    let store = MirroredStore::new(sqlite(&temp, "h.db"), MemoryMirror::new());
    store.put(&record("1")).await.unwrap();

    let url_id = store.duplicate("1").await.unwrap();
    let copy = store.resolve(&url_id).await.unwrap().unwrap();

    assert!(store.mirror().get(&backup_key(&copy.id)).await.unwrap().is_some());
    assert_eq!(store.mirror().len().await, 2);
}
