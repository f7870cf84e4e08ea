//! Chat store abstraction
//!
//! [`ChatStore`] exposes the primitive CRUD and id-allocation operations; the
//! composite operations (fork, duplicate, create) are provided methods built
//! on top of them so that decorators such as [`MirroredStore`] only need to
//! intercept the primitives.

pub mod mirror;
pub mod sqlite;

use async_trait::async_trait;

use crate::db::{ChatMetadata, ChatRecord, Message, Snapshot};
pub use crate::error::{StoreError, StoreResult};
pub use mirror::{BackupMirror, FileMirror, MemoryMirror, MirroredStore};
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// All chats, newest first
    async fn get_all(&self) -> StoreResult<Vec<ChatRecord>>;

    async fn get(&self, id: &str) -> StoreResult<Option<ChatRecord>>;

    async fn get_by_url_id(&self, url_id: &str) -> StoreResult<Option<ChatRecord>>;

    /// Highest numeric id plus one. Two sessions calling this before either
    /// writes will receive the same value.
    async fn next_id(&self) -> StoreResult<String>;

    async fn next_url_id(&self, candidate: &str) -> StoreResult<String>;

    /// Upsert by primary id
    async fn put(&self, record: &ChatRecord) -> StoreResult<()>;

    /// Remove a chat and its snapshot
    async fn delete_by_id(&self, id: &str) -> StoreResult<()>;

    async fn get_snapshot(&self, chat_id: &str) -> StoreResult<Option<Snapshot>>;

    async fn put_snapshot(&self, chat_id: &str, snapshot: &Snapshot) -> StoreResult<()>;

    async fn delete_snapshot(&self, chat_id: &str) -> StoreResult<()>;

    /// Look a chat up by primary id, falling back to url id
    async fn resolve(&self, id: &str) -> StoreResult<Option<ChatRecord>> {
        if let Some(chat) = self.get(id).await? {
            return Ok(Some(chat));
        }
        self.get_by_url_id(id).await
    }

    /// Like [`resolve`](Self::resolve) but absence is an error
    async fn require(&self, id: &str) -> StoreResult<ChatRecord> {
        self.resolve(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// New chat from the prefix ending at `message_id` (inclusive). Returns the new url id.
    async fn fork_at(&self, id: &str, message_id: &str) -> StoreResult<String> {
        let chat = self.require(id).await?;

        let idx = chat
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        let description = match chat.description.as_deref() {
            Some(d) if !d.is_empty() => format!("{} (fork)", d),
            _ => "Forked chat".to_string(),
        };

        let messages = chat.messages[..=idx].to_vec();
        self.create_from_messages(&description, messages, None).await
    }

    /// Copy of a chat's transcript under a new id. Returns the new url id.
    async fn duplicate(&self, id: &str) -> StoreResult<String> {
        let chat = self.require(id).await?;

        let description = format!(
            "{} (copy)",
            chat.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("Chat")
        );
        self.create_from_messages(&description, chat.messages, None).await
    }

    /// Allocate ids, store the chat stamped with the current time, return its url id
    async fn create_from_messages(
        &self,
        description: &str,
        messages: Vec<Message>,
        metadata: Option<ChatMetadata>,
    ) -> StoreResult<String> {
        let id = self.next_id().await?;
        let url_id = self.next_url_id(&id).await?;

        let record = ChatRecord::new(id, messages)
            .with_url_id(url_id.clone())
            .with_description(description)
            .with_metadata(metadata);
        self.put(&record).await?;

        tracing::info!("Created chat {} ({})", record.id, url_id);
        Ok(url_id)
    }

    async fn update_description(&self, id: &str, description: &str) -> StoreResult<()> {
        if description.trim().is_empty() {
            return Err(StoreError::EmptyDescription);
        }

        let mut chat = self.require(id).await?;
        chat.description = Some(description.to_string());
        self.put(&chat).await
    }

    async fn update_metadata(&self, id: &str, metadata: Option<ChatMetadata>) -> StoreResult<()> {
        let mut chat = self.require(id).await?;
        chat.metadata = metadata;
        self.put(&chat).await
    }
}
