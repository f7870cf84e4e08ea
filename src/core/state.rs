//! Application state

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{Database, Opened};
use crate::history::{ChatHistory, LogNotifier, Workbench};
use crate::store::{ChatStore, FileMirror, MirroredStore, SqliteStore};

pub struct AppState {
    pub config: Config,
    /// `None` when persistence is disabled or the database could not be opened
    pub store: Option<Arc<dyn ChatStore>>,
}

impl AppState {
    /// Open the configured store. Never fails on an unusable database.
    pub fn open(config: Config) -> Result<Self> {
        if !config.persistence.enabled {
            info!("Chat persistence disabled by configuration");
            return Ok(Self {
                config,
                store: None,
            });
        }

        let db_path = config.resolve_db_path()?;
        let store: Option<Arc<dyn ChatStore>> = match Database::open(&db_path) {
            Opened::Available(db) => {
                let sqlite = SqliteStore::new(db);
                if config.persistence.mirror {
                    let mirror = FileMirror::new(config.resolve_backup_dir()?);
                    Some(Arc::new(MirroredStore::new(sqlite, mirror)))
                } else {
                    Some(Arc::new(sqlite))
                }
            }
            Opened::Unavailable(reason) => {
                warn!("Continuing without chat persistence: {}", reason);
                None
            }
        };

        Ok(Self { config, store })
    }

    /// A history controller for one session
    pub fn history(&self, workbench: Arc<dyn Workbench>) -> ChatHistory {
        ChatHistory::new(self.store.clone(), workbench, Arc::new(LogNotifier))
            .with_persistence_expected(self.config.persistence.enabled)
    }
}
