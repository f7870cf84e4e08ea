//! CLI commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::core::AppState;
use crate::db::{Message, Snapshot};
use crate::deploy::{self, NetlifyClient};
use crate::history::{ChatExport, DirectoryWorkbench, Workbench};
use crate::store::{ChatStore, StoreError};

#[derive(Parser)]
#[command(name = "chatkeep")]
#[command(about = "Local chat history and project snapshot store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.chatkeep/config.yml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database path, overriding the config file
    #[arg(long, global = true)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all chats
    List,

    /// Print a chat's transcript
    Show {
        /// Chat id or url id
        id: String,
    },

    /// Create a chat, optionally from an export or a JSON message array
    New {
        description: String,

        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Fork a chat at a message
    Fork {
        id: String,
        message_id: String,
    },

    /// Duplicate a chat
    Duplicate {
        id: String,
    },

    /// Change a chat's description
    Rename {
        id: String,
        description: String,
    },

    /// Delete one or more chats
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Export a chat to JSON
    Export {
        id: String,

        /// Output file (default: chat-<date>.json in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import a chat export
    Import {
        file: PathBuf,
    },

    /// Capture a directory as the chat's project snapshot
    Snapshot {
        id: String,

        #[arg(long)]
        dir: PathBuf,
    },

    /// Restore a chat's project snapshot into a directory
    Restore {
        id: String,

        #[arg(long)]
        dir: PathBuf,
    },

    /// Deploy a chat's build output
    Deploy {
        id: String,

        /// Project directory
        #[arg(long)]
        dir: PathBuf,

        /// Build output directory, relative to the project
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
}

fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    if let Ok(export) = ChatExport::from_json(&raw) {
        return Ok(export.messages);
    }
    serde_json::from_str(&raw).context("Expected a chat export or a JSON array of messages")
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.database {
        config.database_path = db;
    }

    let state = AppState::open(config)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(execute(cli.command, state))
}

async fn execute(command: Commands, state: AppState) -> Result<()> {
    let workbench: Arc<dyn Workbench> = match &command {
        Commands::Restore { dir, .. } | Commands::Snapshot { dir, .. } => {
            Arc::new(DirectoryWorkbench::new(dir.clone()))
        }
        _ => Arc::new(DirectoryWorkbench::new(std::env::current_dir()?)),
    };
    let mut history = state.history(workbench.clone());

    match command {
        Commands::List => {
            let chats = history.list_chats().await;

            if chats.is_empty() {
                println!("No chats found");
            } else {
                for chat in chats {
                    println!(
                        "[{}] {} - {} ({} messages) - {}",
                        chat.id,
                        chat.url_id.as_deref().unwrap_or("-"),
                        chat.description.as_deref().unwrap_or("-"),
                        chat.messages.len(),
                        chat.timestamp
                    );
                }
            }
            Ok(())
        }

        Commands::Show { id } => {
            let store = state.store.as_ref().ok_or(StoreError::Unavailable)?;
            let chat = store.require(&id).await?;

            println!("{} ({})", chat.description.as_deref().unwrap_or("-"), chat.id);
            for message in chat.messages {
                println!("[{}] {}: {}", message.id, message.role.as_str(), message.content);
            }
            Ok(())
        }

        Commands::New { description, from } => {
            let messages = match from {
                Some(path) => read_messages(&path)?,
                None => Vec::new(),
            };

            let url_id = history
                .import_chat(&description, messages, None)
                .await
                .context("Failed to create chat")?;
            println!("Created chat: {}", url_id);
            Ok(())
        }

        Commands::Fork { id, message_id } => {
            let url_id = history
                .fork_chat(&id, &message_id)
                .await
                .context("Failed to fork chat")?;
            println!("Forked chat: {}", url_id);
            Ok(())
        }

        Commands::Duplicate { id } => {
            let url_id = history
                .duplicate_current_chat(&id)
                .await
                .context("Failed to duplicate chat")?;
            println!("Duplicated chat: {}", url_id);
            Ok(())
        }

        Commands::Rename { id, description } => {
            history.rename_chat(&id, &description).await?;
            println!("Renamed chat: {}", id);
            Ok(())
        }

        Commands::Delete { ids } => {
            let outcome = history.delete_chats(&ids).await;
            println!("{}", outcome.summary());
            for (id, error) in &outcome.failed {
                println!("  {}: {}", id, error);
            }
            Ok(())
        }

        Commands::Export { id, output } => {
            let export = history.export_chat(Some(&id)).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(export.file_name()));

            std::fs::write(&path, export.to_json_pretty()?)
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("Exported chat {} to {}", id, path.display());
            Ok(())
        }

        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let export = ChatExport::from_json(&raw)?;

            let url_id = history
                .import_export(export)
                .await
                .context("Failed to import chat")?;
            println!("Imported chat: {}", url_id);
            Ok(())
        }

        Commands::Snapshot { id, .. } => {
            let store = state.store.as_ref().ok_or(StoreError::Unavailable)?;
            let chat = store.require(&id).await?;

            let snapshot = Snapshot {
                chat_index: chat.messages.last().map(|m| m.id.clone()).unwrap_or_default(),
                files: workbench.files().await?,
                summary: None,
            };
            store.put_snapshot(&chat.id, &snapshot).await?;
            println!("Captured {} entries for chat {}", snapshot.files.len(), chat.id);
            Ok(())
        }

        Commands::Restore { id, dir } => {
            history.load(Some(&id)).await;
            if let Some(error) = history.last_error() {
                anyhow::bail!("Failed to load chat {}: {}", id, error);
            }

            if let Some(error) = history.restore_error() {
                anyhow::bail!("Failed to restore project for chat {}: {}", id, error);
            }

            if history.restored_entries() == 0 {
                println!(
                    "Loaded {} messages; chat {} has no project snapshot",
                    history.initial_messages().len(),
                    id
                );
            } else {
                println!(
                    "Loaded {} messages, restored {} entries to {}",
                    history.initial_messages().len(),
                    history.restored_entries(),
                    dir.display()
                );
            }
            Ok(())
        }

        Commands::Deploy { id, dir, build_dir } => {
            let store = state.store.as_ref().ok_or(StoreError::Unavailable)?;
            let token = state
                .config
                .deploy
                .resolve_token()
                .context("No deploy token configured (set NETLIFY_TOKEN or deploy.token)")?;
            let client = NetlifyClient::new(state.config.deploy.api_url.clone(), token);

            let build = deploy::find_build_dir(&dir, build_dir.as_deref())
                .context("Could not find build output directory")?;
            let result = deploy::deploy_directory(
                store.as_ref(),
                &client,
                &id,
                &build,
                &state.config.deploy.poll_config(),
            )
            .await?;

            println!(
                "Deployed to site {}: {}",
                result.site_id,
                result.site_url.as_deref().unwrap_or("-")
            );
            Ok(())
        }
    }
}
