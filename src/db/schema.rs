//! SQL schema definitions
//!
//! Each entry in [`MIGRATIONS`] moves the database one `user_version` forward.
//! Steps are additive: later versions never touch tables created earlier.

/// Version 1: chat transcripts
pub const CHATS_V1: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    url_id TEXT,
    description TEXT,
    messages TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    metadata TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_url_id ON chats(url_id);
CREATE INDEX IF NOT EXISTS idx_chats_timestamp ON chats(timestamp);
"#;

/// Version 2: project snapshots, one per chat
pub const SNAPSHOTS_V2: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    chat_id TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL
);
"#;

pub const MIGRATIONS: &[&str] = &[CHATS_V1, SNAPSHOTS_V2];

/// Latest schema version
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;
