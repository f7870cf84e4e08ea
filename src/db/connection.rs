//! Database connection management
//!
//! One synchronous rusqlite connection is shared behind a tokio mutex by every
//! clone of [`Database`]. Each operation holds the lock only for its own
//! statements, so there is no multi-operation isolation.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::schema::{MIGRATIONS, SCHEMA_VERSION};
use crate::error::StoreResult;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

/// Outcome of opening the history database.
///
/// Opening never fails the caller: a database that cannot be created is
/// reported as `Unavailable` and persistence becomes a no-op upstream.
pub enum Opened {
    Available(Database),
    Unavailable(String),
}

impl Opened {
    pub fn into_option(self) -> Option<Database> {
        match self {
            Opened::Available(db) => Some(db),
            Opened::Unavailable(_) => None,
        }
    }
}

impl Database {
    /// Open (creating on first use) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Opened {
        let path = path.as_ref();
        match Self::try_open(path) {
            Ok(db) => Opened::Available(db),
            Err(e) => {
                warn!("History database unavailable at {:?}: {}", path, e);
                Opened::Unavailable(e.to_string())
            }
        }
    }

    fn try_open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn, path.to_string_lossy().to_string())
    }

    fn init(conn: Connection, path: String) -> StoreResult<Self> {
        migrate(&conn)?;
        info!("History database opened at {} (schema v{})", path, SCHEMA_VERSION);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Get a locked connection
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Get the database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current schema version as recorded in the database
    pub async fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.lock().await;
        Ok(user_version(&conn)?)
    }

    /// Check if database is accessible
    pub async fn health_check(&self) -> bool {
        let conn = self.lock().await;
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}

fn user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration step above the stored `user_version`.
pub(crate) fn migrate(conn: &Connection) -> StoreResult<()> {
    let current = user_version(conn)?;

    for (idx, step) in MIGRATIONS.iter().enumerate() {
        let version = idx as u32 + 1;
        if version <= current {
            continue;
        }
        debug!("Upgrading history schema to v{}", version);
        conn.execute_batch(step)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::CHATS_V1;

    #[test]
    fn upgrade_from_v1_keeps_chats() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CHATS_V1).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute(
            "INSERT INTO chats (id, url_id, messages, timestamp) VALUES ('1', '1', '[]', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();

        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let snapshots: i64 = conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .unwrap();
        assert_eq!(snapshots, 0);
    }
}
