//! SQLite-backed chat store

use async_trait::async_trait;

use super::ChatStore;
use crate::db::{ChatRecord, ChatRepository, Database, Snapshot, SnapshotRepository};
use crate::error::StoreResult;

pub struct SqliteStore {
    chats: ChatRepository,
    snapshots: SnapshotRepository,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            chats: ChatRepository::new(db.clone()),
            snapshots: SnapshotRepository::new(db),
        }
    }

    pub fn db(&self) -> &Database {
        self.chats.db()
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn get_all(&self) -> StoreResult<Vec<ChatRecord>> {
        self.chats.list().await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ChatRecord>> {
        self.chats.get(id).await
    }

    async fn get_by_url_id(&self, url_id: &str) -> StoreResult<Option<ChatRecord>> {
        self.chats.get_by_url_id(url_id).await
    }

    async fn next_id(&self) -> StoreResult<String> {
        self.chats.next_id().await
    }

    async fn next_url_id(&self, candidate: &str) -> StoreResult<String> {
        self.chats.next_url_id(candidate).await
    }

    async fn put(&self, record: &ChatRecord) -> StoreResult<()> {
        self.chats.put(record).await
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        self.chats.delete_with_snapshot(id).await
    }

    async fn get_snapshot(&self, chat_id: &str) -> StoreResult<Option<Snapshot>> {
        self.snapshots.get(chat_id).await
    }

    async fn put_snapshot(&self, chat_id: &str, snapshot: &Snapshot) -> StoreResult<()> {
        self.snapshots.put(chat_id, snapshot).await
    }

    async fn delete_snapshot(&self, chat_id: &str) -> StoreResult<()> {
        self.snapshots.delete(chat_id).await
    }
}
