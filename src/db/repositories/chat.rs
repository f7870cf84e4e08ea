//! Chat repository

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Annotation flag: message is never persisted
pub const NO_STORE: &str = "no-store";
/// Annotation flag: message is not rendered
pub const HIDDEN: &str = "hidden";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Either plain string flags (`"no-store"`, `"hidden"`) or objects with a `type` key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<Value>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.annotations.iter().any(|a| a.as_str() == Some(flag))
    }

    /// First object annotation whose `type` equals `kind`
    pub fn annotation(&self, kind: &str) -> Option<&Value> {
        self.annotations
            .iter()
            .find(|a| a.get("type").and_then(Value::as_str) == Some(kind))
    }
}

/// External git/deploy linkage, opaque to the store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    #[serde(default)]
    pub git_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlify_site_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    #[serde(default)]
    pub url_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub messages: Vec<Message>,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Option<ChatMetadata>,
}

impl ChatRecord {
    /// New record stamped with the current time
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            url_id: None,
            description: None,
            messages,
            timestamp: now_timestamp(),
            metadata: None,
        }
    }

    pub fn with_url_id(mut self, url_id: impl Into<String>) -> Self {
        self.url_id = Some(url_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Option<ChatMetadata>) -> Self {
        self.metadata = metadata;
        self
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Whether `value` parses as a date, accepting RFC 3339, RFC 2822, and bare
/// ISO-8601 date or date-time forms.
pub fn is_valid_timestamp(value: &str) -> bool {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).is_ok()
        || DateTime::parse_from_rfc2822(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

struct RawChat {
    id: String,
    url_id: Option<String>,
    description: Option<String>,
    messages: String,
    timestamp: String,
    metadata: Option<String>,
}

impl RawChat {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url_id: row.get(1)?,
            description: row.get(2)?,
            messages: row.get(3)?,
            timestamp: row.get(4)?,
            metadata: row.get(5)?,
        })
    }
}

impl TryFrom<RawChat> for ChatRecord {
    type Error = StoreError;

    fn try_from(raw: RawChat) -> StoreResult<Self> {
        let metadata = match raw.metadata {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };

        Ok(ChatRecord {
            id: raw.id,
            url_id: raw.url_id,
            description: raw.description,
            messages: serde_json::from_str(&raw.messages)?,
            timestamp: raw.timestamp,
            metadata,
        })
    }
}

const SELECT_CHAT: &str =
    "SELECT id, url_id, description, messages, timestamp, metadata FROM chats";

pub struct ChatRepository {
    db: Database,
}

impl ChatRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the database reference
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// List all chats, newest first
    pub async fn list(&self) -> StoreResult<Vec<ChatRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!("{} ORDER BY timestamp DESC", SELECT_CHAT))?;

        let rows = stmt
            .query_map([], RawChat::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ChatRecord::try_from).collect()
    }

    /// Get a chat by primary id
    pub async fn get(&self, id: &str) -> StoreResult<Option<ChatRecord>> {
        let conn = self.db.lock().await;
        Self::query_one(&conn, "id", id)
    }

    /// Get a chat by its url id
    pub async fn get_by_url_id(&self, url_id: &str) -> StoreResult<Option<ChatRecord>> {
        let conn = self.db.lock().await;
        Self::query_one(&conn, "url_id", url_id)
    }

    fn query_one(conn: &Connection, column: &str, key: &str) -> StoreResult<Option<ChatRecord>> {
        let mut stmt = conn.prepare(&format!("{} WHERE {} = ?1", SELECT_CHAT, column))?;
        let raw = stmt.query_row(params![key], RawChat::from_row).optional()?;

        raw.map(ChatRecord::try_from).transpose()
    }

    /// Next primary id: highest numeric id plus one, "1" for an empty table
    pub async fn next_id(&self) -> StoreResult<String> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM chats")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let highest = ids
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let next = highest
            .checked_add(1)
            .ok_or_else(|| StoreError::Conflict("chat id space exhausted".to_string()))?
            .to_string();
        tracing::debug!("Next chat id: {} (from {} existing)", next, ids.len());
        Ok(next)
    }

    /// `candidate` if unused as a url id, else the smallest free `candidate-N` (N >= 2)
    pub async fn next_url_id(&self, candidate: &str) -> StoreResult<String> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare("SELECT url_id FROM chats WHERE url_id IS NOT NULL")?;
        let taken = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<std::collections::HashSet<_>, _>>()?;

        if !taken.contains(candidate) {
            return Ok(candidate.to_string());
        }

        let mut n = 2u64;
        while taken.contains(&format!("{}-{}", candidate, n)) {
            n += 1;
        }

        let url_id = format!("{}-{}", candidate, n);
        tracing::debug!("Url id {} taken, using {}", candidate, url_id);
        Ok(url_id)
    }

    /// Insert or replace a chat by primary id
    pub async fn put(&self, record: &ChatRecord) -> StoreResult<()> {
        if !is_valid_timestamp(&record.timestamp) {
            return Err(StoreError::InvalidTimestamp(record.timestamp.clone()));
        }

        let messages = serde_json::to_string(&record.messages)?;
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.db.lock().await;
        let result = conn.execute(
            "INSERT INTO chats (id, url_id, description, messages, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                url_id = excluded.url_id,
                description = excluded.description,
                messages = excluded.messages,
                timestamp = excluded.timestamp,
                metadata = excluded.metadata",
            params![
                record.id,
                record.url_id,
                record.description,
                messages,
                record.timestamp,
                metadata,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!(
                    "Saved chat {} ({} messages)",
                    record.id,
                    record.messages.len()
                );
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Conflict(format!(
                    "url id {} already belongs to another chat",
                    record.url_id.as_deref().unwrap_or("-")
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a chat together with its snapshot
    pub async fn delete_with_snapshot(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        let chats = tx.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
        let snapshots = tx.execute("DELETE FROM snapshots WHERE chat_id = ?1", params![id])?;
        tx.commit()?;

        tracing::debug!(
            "Deleted chat {} (chat rows: {}, snapshot rows: {})",
            id,
            chats,
            snapshots
        );
        Ok(())
    }
}
