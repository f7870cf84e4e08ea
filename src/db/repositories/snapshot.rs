//! Snapshot repository

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::StoreResult;

/// A single entry of captured project state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileEntry {
    File {
        content: String,
        #[serde(rename = "isBinary", default)]
        is_binary: bool,
    },
    Folder,
}

impl FileEntry {
    pub fn text(content: impl Into<String>) -> Self {
        FileEntry::File {
            content: content.into(),
            is_binary: false,
        }
    }
}

/// Absolute path -> entry
pub type FileMap = BTreeMap<String, FileEntry>;

/// Project file state tied to a point in a chat
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Id of the message the snapshot corresponds to
    pub chat_index: String,
    #[serde(default)]
    pub files: FileMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Snapshot {
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

pub struct SnapshotRepository {
    db: Database,
}

impl SnapshotRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, chat_id: &str) -> StoreResult<Option<Snapshot>> {
        let conn = self.db.lock().await;
        let text: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM snapshots WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(text.map(|t| serde_json::from_str(&t)).transpose()?)
    }

    pub async fn put(&self, chat_id: &str, snapshot: &Snapshot) -> StoreResult<()> {
        let text = serde_json::to_string(snapshot)?;
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO snapshots (chat_id, snapshot) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET snapshot = excluded.snapshot",
            params![chat_id, text],
        )?;

        tracing::debug!(
            "Saved snapshot for chat {} ({} entries)",
            chat_id,
            snapshot.files.len()
        );
        Ok(())
    }

    /// Delete a snapshot; an absent snapshot is not an error
    pub async fn delete(&self, chat_id: &str) -> StoreResult<()> {
        let conn = self.db.lock().await;
        conn.execute("DELETE FROM snapshots WHERE chat_id = ?1", params![chat_id])?;
        Ok(())
    }
}
