//! Database module

pub mod schema;
pub mod connection;
pub mod repositories;

pub use connection::{Database, Opened};
pub use repositories::chat::{ChatMetadata, ChatRecord, ChatRepository, Message, Role};
pub use repositories::snapshot::{FileEntry, FileMap, Snapshot, SnapshotRepository};
