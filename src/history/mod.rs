//! Per-session chat history controller
//!
//! [`ChatHistory`] binds one session to one chat: it loads the transcript and
//! snapshot, reconciles them into the message list shown to the user, and
//! writes later turns back to the store. Store failures become notifications;
//! none of the session operations abort on a persistence error.

pub mod notify;
pub mod project_commands;
pub mod workbench;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::repositories::chat::{now_timestamp, HIDDEN, NO_STORE};
use crate::db::{ChatMetadata, ChatRecord, FileEntry, Message, Role, Snapshot};
use crate::store::{ChatStore, StoreError};

pub use notify::{Level, LogNotifier, Notifier, RecordingNotifier};
pub use workbench::{Artifact, DirectoryWorkbench, Workbench};

/// Session-scoped identity of the bound chat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub chat_id: Option<String>,
    pub url_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<ChatMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Reconciling,
    Ready,
    /// Load failed; the controller moves on to `Ready` right after recording it
    Error(String),
}

/// Downloadable transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatExport {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub description: Option<String>,
    pub export_date: String,
}

impl ChatExport {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize chat export")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Not a chat export document")
    }

    /// Suggested download name
    pub fn file_name(&self) -> String {
        format!("chat-{}.json", self.export_date.replace(':', "-"))
    }
}

/// Per-id result of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BulkDeleteOutcome {
    pub fn total(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn summary(&self) -> String {
        format!("Deleted {} of {} chats", self.deleted.len(), self.total())
    }
}

pub struct ChatHistory {
    store: Option<Arc<dyn ChatStore>>,
    workbench: Arc<dyn Workbench>,
    notifier: Arc<dyn Notifier>,
    persistence_expected: bool,
    warned_unavailable: bool,
    context: SessionContext,
    state: LoadState,
    last_error: Option<String>,
    restore_error: Option<String>,
    restored_entries: usize,
    initial_messages: Vec<Message>,
    navigation: Option<String>,
}

impl ChatHistory {
    pub fn new(
        store: Option<Arc<dyn ChatStore>>,
        workbench: Arc<dyn Workbench>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            workbench,
            notifier,
            persistence_expected: true,
            warned_unavailable: false,
            context: SessionContext::default(),
            state: LoadState::Uninitialized,
            last_error: None,
            restore_error: None,
            restored_entries: 0,
            initial_messages: Vec::new(),
            navigation: None,
        }
    }

    /// When persistence was switched off on purpose, its absence is not reported
    pub fn with_persistence_expected(mut self, expected: bool) -> Self {
        self.persistence_expected = expected;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Why the last load could not write the snapshot back, if it failed
    pub fn restore_error(&self) -> Option<&str> {
        self.restore_error.as_deref()
    }

    /// Snapshot entries written to the workbench by the last load
    pub fn restored_entries(&self) -> usize {
        self.restored_entries
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Messages to render, including any synthetic restore turns
    pub fn initial_messages(&self) -> &[Message] {
        &self.initial_messages
    }

    /// Route the UI should show after the last create/duplicate/import
    pub fn navigation(&self) -> Option<&str> {
        self.navigation.as_deref()
    }

    fn set_state(&mut self, state: LoadState) {
        debug!("History state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// The store, or `None` after reporting unavailability once
    fn store(&mut self) -> Option<Arc<dyn ChatStore>> {
        if self.store.is_none() && self.persistence_expected && !self.warned_unavailable {
            self.warned_unavailable = true;
            warn!("Chat persistence is unavailable");
            self.notifier.error("Chat persistence is unavailable");
        }
        self.store.clone()
    }

    /// Bind the session to `id` (primary or url id) and build the initial message list
    pub async fn load(&mut self, id: Option<&str>) {
        let Some(store) = self.store() else {
            self.set_state(LoadState::Ready);
            return;
        };

        let Some(id) = id else {
            self.set_state(LoadState::Ready);
            return;
        };

        self.set_state(LoadState::Loading);
        self.last_error = None;
        self.restore_error = None;
        self.restored_entries = 0;
        let (chat, snapshot) = tokio::join!(store.resolve(id), store.get_snapshot(id));

        let loaded = match (chat, snapshot) {
            (Ok(chat), Ok(snapshot)) => Ok((chat, snapshot)),
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        match loaded {
            Ok((Some(chat), snapshot)) if !chat.messages.is_empty() => {
                // A url-id lookup has to fetch the snapshot by the primary id
                let snapshot = match snapshot {
                    Some(s) => Some(s),
                    None if chat.id != id => store.get_snapshot(&chat.id).await.unwrap_or_else(|e| {
                        warn!("Failed to load snapshot for chat {}: {}", chat.id, e);
                        None
                    }),
                    None => None,
                };
                self.reconcile(chat, snapshot).await;
            }
            Ok(_) => {
                debug!("Chat {} not found or empty, starting fresh", id);
                self.initial_messages.clear();
            }
            Err(e) => {
                warn!("Failed to load chat {}: {}", id, e);
                self.notifier.error(&format!("Failed to load chat: {}", e));
                self.last_error = Some(e.to_string());
                self.set_state(LoadState::Error(e.to_string()));
            }
        }

        self.set_state(LoadState::Ready);
    }

    async fn reconcile(&mut self, chat: ChatRecord, snapshot: Option<Snapshot>) {
        self.set_state(LoadState::Reconciling);
        let mut messages = chat.messages;

        if let Some(snapshot) = snapshot.filter(Snapshot::has_files) {
            let commands = project_commands::detect(&snapshot.files, self.workbench.workdir());
            let mut restored = vec![
                Message::new(Role::User, "Restore project from snapshot")
                    .with_annotation(NO_STORE)
                    .with_annotation(HIDDEN),
                Message::new(Role::Assistant, project_commands::to_actions(&commands))
                    .with_annotation(NO_STORE)
                    .with_annotation(HIDDEN),
            ];
            restored.extend(messages);
            messages = restored;

            let outcome = self.restore_snapshot(&snapshot).await;
            match outcome {
                Ok(written) => self.restored_entries = written,
                Err(e) => {
                    warn!("Failed to restore snapshot for chat {}: {:#}", chat.id, e);
                    self.notifier.error("Failed to restore project files");
                    self.restore_error = Some(format!("{:#}", e));
                }
            }
        }

        info!(
            "Loaded chat {} ({} messages)",
            chat.id,
            messages.len()
        );
        self.initial_messages = messages;
        self.context = SessionContext {
            chat_id: Some(chat.id),
            url_id: chat.url_id,
            description: chat.description,
            metadata: chat.metadata,
        };
    }

    /// Write snapshot files into the workbench: folders first, then files.
    /// Entries outside the workdir are skipped. Returns the number written.
    pub async fn restore_snapshot(&self, snapshot: &Snapshot) -> Result<usize> {
        let workdir = self.workbench.workdir();
        let entries: Vec<(&str, &FileEntry)> = snapshot
            .files
            .iter()
            .filter_map(|(path, entry)| match workdir_relative(workdir, path) {
                Some(relative) => Some((relative, entry)),
                None => {
                    warn!("Skipping snapshot entry outside {}: {}", workdir, path);
                    None
                }
            })
            .collect();

        for (relative, entry) in &entries {
            if matches!(entry, FileEntry::Folder) {
                self.workbench.mkdir(relative).await?;
            }
        }

        for (relative, entry) in &entries {
            if let FileEntry::File { content, is_binary } = entry {
                self.workbench.write_file(relative, content, *is_binary).await?;
            }
        }

        debug!("Restored {} snapshot entries", entries.len());
        Ok(entries.len())
    }

    /// Persist the session's transcript and capture a snapshot of the workbench.
    /// Returns whether the transcript was written.
    pub async fn store_message_history(&mut self, messages: Vec<Message>) -> bool {
        let Some(store) = self.store() else {
            return false;
        };

        let messages: Vec<Message> = messages.into_iter().filter(|m| !m.has_flag(NO_STORE)).collect();
        let Some(last) = messages.last() else {
            debug!("Nothing to store");
            return false;
        };
        let last_id = last.id.clone();

        let chat_summary = if last.role == Role::Assistant {
            last.annotation("chatSummary")
                .and_then(|a| a.get("summary"))
                .and_then(|s| s.as_str())
                .map(str::to_string)
        } else {
            None
        };

        let artifact = self.workbench.first_artifact().await;

        if self.context.url_id.is_none() {
            if let Some(artifact) = &artifact {
                match store.next_url_id(&artifact.id).await {
                    Ok(url_id) => {
                        self.navigation = Some(format!("/chat/{}", url_id));
                        self.context.url_id = Some(url_id);
                    }
                    Err(e) => {
                        self.report_save_failure(&e);
                        return false;
                    }
                }
            }
        }

        if self.context.description.is_none() {
            if let Some(artifact) = artifact.as_ref().filter(|a| !a.title.is_empty()) {
                self.context.description = Some(artifact.title.clone());
            }
        }

        let chat_id = match self.context.chat_id.clone() {
            Some(id) => id,
            None => match store.next_id().await {
                Ok(id) => {
                    debug!("Allocated chat id {}", id);
                    self.context.chat_id = Some(id.clone());
                    id
                }
                Err(e) => {
                    self.report_save_failure(&e);
                    return false;
                }
            },
        };

        let record = ChatRecord {
            id: chat_id.clone(),
            url_id: self.context.url_id.clone(),
            description: self.context.description.clone(),
            messages,
            timestamp: now_timestamp(),
            metadata: self.context.metadata.clone(),
        };

        if let Err(e) = store.put(&record).await {
            self.report_save_failure(&e);
            return false;
        }
        debug!("Stored {} messages for chat {}", record.messages.len(), chat_id);

        self.take_snapshot(store.as_ref(), &chat_id, last_id, chat_summary)
            .await;
        true
    }

    async fn take_snapshot(
        &self,
        store: &dyn ChatStore,
        chat_id: &str,
        chat_index: String,
        summary: Option<String>,
    ) {
        let files = match self.workbench.files().await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to read workbench files: {:#}", e);
                self.notifier.error("Failed to save chat snapshot.");
                return;
            }
        };

        let snapshot = Snapshot {
            chat_index,
            files,
            summary,
        };
        if let Err(e) = store.put_snapshot(chat_id, &snapshot).await {
            warn!("Failed to save snapshot for chat {}: {}", chat_id, e);
            self.notifier.error("Failed to save chat snapshot.");
        }
    }

    fn report_save_failure(&self, e: &StoreError) {
        warn!("Failed to save chat history: {}", e);
        self.notifier
            .error(&format!("Failed to save chat history: {}", e));
    }

    /// Duplicate `id` and navigate to the copy
    pub async fn duplicate_current_chat(&mut self, id: &str) -> Option<String> {
        let store = self.store()?;

        match store.duplicate(id).await {
            Ok(url_id) => {
                self.navigate_to(&url_id);
                self.notifier.success("Chat duplicated successfully");
                Some(url_id)
            }
            Err(e) => {
                warn!("Failed to duplicate chat {}: {}", id, e);
                self.notifier.error("Failed to duplicate chat");
                None
            }
        }
    }

    /// Fork `id` at `message_id` and navigate to the fork
    pub async fn fork_chat(&mut self, id: &str, message_id: &str) -> Option<String> {
        let store = self.store()?;

        match store.fork_at(id, message_id).await {
            Ok(url_id) => {
                self.navigate_to(&url_id);
                self.notifier.success("Chat forked successfully");
                Some(url_id)
            }
            Err(e) => {
                warn!("Failed to fork chat {} at {}: {}", id, message_id, e);
                self.notifier.error(&format!("Failed to fork chat: {}", e));
                None
            }
        }
    }

    pub async fn import_chat(
        &mut self,
        description: &str,
        messages: Vec<Message>,
        metadata: Option<ChatMetadata>,
    ) -> Option<String> {
        let store = self.store()?;

        let result = if description.trim().is_empty() {
            Err(StoreError::EmptyDescription)
        } else {
            store.create_from_messages(description, messages, metadata).await
        };

        match result {
            Ok(url_id) => {
                self.navigate_to(&url_id);
                self.notifier.success("Chat imported successfully");
                Some(url_id)
            }
            Err(e) => {
                warn!("Failed to import chat: {}", e);
                self.notifier.error(&format!("Failed to import chat: {}", e));
                None
            }
        }
    }

    /// Import a document produced by [`export_chat`](Self::export_chat)
    pub async fn import_export(&mut self, export: ChatExport) -> Option<String> {
        let description = export
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "Imported chat".to_string());
        self.import_chat(&description, export.messages, None).await
    }

    /// Stored transcript of `id` (or the bound chat) as an export document
    pub async fn export_chat(&mut self, id: Option<&str>) -> Result<ChatExport> {
        let store = self.store().ok_or(StoreError::Unavailable)?;
        let id = id
            .map(str::to_string)
            .or_else(|| self.context.url_id.clone())
            .or_else(|| self.context.chat_id.clone())
            .context("No chat selected for export")?;

        let chat = store.require(&id).await?;
        Ok(ChatExport {
            messages: chat.messages,
            description: chat.description,
            export_date: now_timestamp(),
        })
    }

    /// All stored chats; empty when persistence is unavailable
    pub async fn list_chats(&mut self) -> Vec<ChatRecord> {
        let Some(store) = self.store() else {
            return Vec::new();
        };

        match store.get_all().await {
            Ok(chats) => chats,
            Err(e) => {
                warn!("Failed to list chats: {}", e);
                self.notifier.error("Failed to load chat history");
                Vec::new()
            }
        }
    }

    pub async fn delete_chat(&mut self, id: &str) -> Result<()> {
        let store = self.store().ok_or(StoreError::Unavailable)?;
        store.delete_by_id(id).await?;
        info!("Deleted chat {}", id);

        if self.context.chat_id.as_deref() == Some(id) {
            self.context = SessionContext::default();
            self.initial_messages.clear();
            self.navigation = Some("/".to_string());
        }
        Ok(())
    }

    /// Delete each id in turn, tracking per-id failures
    pub async fn delete_chats(&mut self, ids: &[String]) -> BulkDeleteOutcome {
        let mut outcome = BulkDeleteOutcome::default();

        for id in ids {
            match self.delete_chat(id).await {
                Ok(()) => outcome.deleted.push(id.clone()),
                Err(e) => {
                    warn!("Failed to delete chat {}: {:#}", id, e);
                    outcome.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        if outcome.failed.is_empty() {
            let n = outcome.deleted.len();
            self.notifier.success(&format!(
                "{} chat{} deleted successfully",
                n,
                if n == 1 { "" } else { "s" }
            ));
        } else {
            self.notifier.warning(&format!(
                "{}. {} failed.",
                outcome.summary(),
                outcome.failed.len()
            ));
        }
        outcome
    }

    pub async fn rename_chat(&mut self, id: &str, description: &str) -> Result<()> {
        let store = self.store().ok_or(StoreError::Unavailable)?;
        store.update_description(id, description).await?;

        if self.context.chat_id.as_deref() == Some(id) || self.context.url_id.as_deref() == Some(id) {
            self.context.description = Some(description.to_string());
        }
        Ok(())
    }

    /// Replace the bound chat's metadata
    pub async fn update_chat_metadata(&mut self, metadata: ChatMetadata) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        let Some(id) = self.context.chat_id.clone() else {
            return false;
        };

        match store.update_metadata(&id, Some(metadata.clone())).await {
            Ok(()) => {
                self.context.metadata = Some(metadata);
                true
            }
            Err(e) => {
                warn!("Failed to update metadata for chat {}: {}", id, e);
                self.notifier.error("Failed to update chat metadata");
                false
            }
        }
    }

    fn navigate_to(&mut self, url_id: &str) {
        let target = format!("/chat/{}", url_id);
        debug!("Navigating to {}", target);
        self.navigation = Some(target);
    }
}

/// `path` relative to `workdir`, or `None` when it lies outside it
fn workdir_relative<'a>(workdir: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(workdir.trim_end_matches('/'))?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workdir_relative_respects_boundaries() {
        assert_eq!(workdir_relative("/home/project", "/home/project/src/a.js"), Some("src/a.js"));
        assert_eq!(workdir_relative("/home/project/", "/home/project/a"), Some("a"));
        assert_eq!(workdir_relative("/home/project", "/home/projectX/a"), None);
        assert_eq!(workdir_relative("/home/project", "/home/project"), None);
        assert_eq!(workdir_relative("/", "/a/b"), Some("a/b"));
    }
}
