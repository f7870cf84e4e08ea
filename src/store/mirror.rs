//! Secondary backup path
//!
//! A [`MirroredStore`] copies every chat it writes to a [`BackupMirror`] and
//! reads from the mirror only when the primary store has nothing. The mirror
//! is advisory: its failures are logged and never returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ChatStore;
use crate::db::{ChatRecord, Snapshot};
use crate::error::StoreResult;

/// Key under which a chat is mirrored
pub fn backup_key(chat_id: &str) -> String {
    format!("chat_backup_{}", chat_id)
}

/// String key-value surface used as the backup target
#[async_trait]
pub trait BackupMirror: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// One JSON file per key in a directory
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl BackupMirror for FileMirror {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process mirror
#[derive(Default)]
pub struct MemoryMirror {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl BackupMirror for MemoryMirror {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Decorates a [`ChatStore`] with a best-effort mirror
pub struct MirroredStore<S, M> {
    inner: S,
    mirror: M,
}

impl<S: ChatStore, M: BackupMirror> MirroredStore<S, M> {
    pub fn new(inner: S, mirror: M) -> Self {
        Self { inner, mirror }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    async fn write_mirror(&self, record: &ChatRecord) {
        let result = match serde_json::to_string(record) {
            Ok(text) => self.mirror.set(&backup_key(&record.id), &text).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => debug!("Mirrored chat {}", record.id),
            Err(e) => warn!("Failed to mirror chat {}: {}", record.id, e),
        }
    }

    /// Mirror lookup plus write-back into the primary store
    async fn recover(&self, id: &str) -> Option<ChatRecord> {
        let text = match self.mirror.get(&backup_key(id)).await {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read mirror for chat {}: {}", id, e);
                return None;
            }
        };

        let record: ChatRecord = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding unreadable mirror entry for chat {}: {}", id, e);
                return None;
            }
        };

        info!("Chat {} recovered from mirror", id);
        match self.inner.put(&record).await {
            Ok(()) => info!("Chat {} restored to primary store", record.id),
            Err(e) => warn!("Failed to restore chat {} to primary store: {}", record.id, e),
        }

        Some(record)
    }
}

#[async_trait]
impl<S: ChatStore, M: BackupMirror> ChatStore for MirroredStore<S, M> {
    async fn get_all(&self) -> StoreResult<Vec<ChatRecord>> {
        self.inner.get_all().await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ChatRecord>> {
        match self.inner.get(id).await {
            Ok(Some(chat)) => return Ok(Some(chat)),
            Ok(None) => {}
            Err(e) => warn!("Primary read failed for chat {}: {}", id, e),
        }
        Ok(self.recover(id).await)
    }

    async fn get_by_url_id(&self, url_id: &str) -> StoreResult<Option<ChatRecord>> {
        self.inner.get_by_url_id(url_id).await
    }

    async fn next_id(&self) -> StoreResult<String> {
        self.inner.next_id().await
    }

    async fn next_url_id(&self, candidate: &str) -> StoreResult<String> {
        self.inner.next_url_id(candidate).await
    }

    async fn put(&self, record: &ChatRecord) -> StoreResult<()> {
        self.inner.put(record).await?;
        self.write_mirror(record).await;
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        self.inner.delete_by_id(id).await?;
        if let Err(e) = self.mirror.remove(&backup_key(id)).await {
            warn!("Failed to remove mirror entry for chat {}: {}", id, e);
        }
        Ok(())
    }

    async fn get_snapshot(&self, chat_id: &str) -> StoreResult<Option<Snapshot>> {
        self.inner.get_snapshot(chat_id).await
    }

    async fn put_snapshot(&self, chat_id: &str, snapshot: &Snapshot) -> StoreResult<()> {
        self.inner.put_snapshot(chat_id, snapshot).await
    }

    async fn delete_snapshot(&self, chat_id: &str) -> StoreResult<()> {
        self.inner.delete_snapshot(chat_id).await
    }

    async fn resolve(&self, id: &str) -> StoreResult<Option<ChatRecord>> {
        match self.inner.resolve(id).await {
            Ok(Some(chat)) => return Ok(Some(chat)),
            Ok(None) => {}
            Err(e) => warn!("Primary lookup failed for chat {}: {}", id, e),
        }
        Ok(self.recover(id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_mirror_sanitizes_keys() {
        let mirror = FileMirror::new("/tmp/backup");
        assert_eq!(
            mirror.path_for("chat_backup_../x"),
            PathBuf::from("/tmp/backup/chat_backup____x.json")
        );
    }
}
