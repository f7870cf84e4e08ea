//! Workbench collaborator
//!
//! The workbench owns the live project files. The history controller reads
//! them to take snapshots and writes them back when a chat is reopened.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::db::{FileEntry, FileMap};

/// The first build artifact produced in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub title: String,
}

#[async_trait]
pub trait Workbench: Send + Sync {
    async fn first_artifact(&self) -> Option<Artifact>;

    /// Current project files keyed by absolute path
    async fn files(&self) -> Result<FileMap>;

    /// Project root; snapshot paths under it are written relative to it
    fn workdir(&self) -> &str;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn write_file(&self, path: &str, content: &str, is_binary: bool) -> Result<()>;
}

/// Workbench over a plain directory. Snapshot paths are `<workdir>/<relative>`.
pub struct DirectoryWorkbench {
    root: PathBuf,
    workdir: String,
    artifact: Option<Artifact>,
}

impl DirectoryWorkbench {
    pub const DEFAULT_WORKDIR: &'static str = "/home/project";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: Self::DEFAULT_WORKDIR.to_string(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.artifact = Some(Artifact {
            id: id.into(),
            title: title.into(),
        });
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workbench-relative path onto the directory. Paths that would
    /// leave the root are refused.
    fn local_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!("Refusing path outside the project: {}", path);
        }
        Ok(self.root.join(relative))
    }

    fn collect<'a>(&'a self, dir: PathBuf, files: &'a mut FileMap) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory {:?}", dir))?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let relative = path
                    .strip_prefix(&self.root)
                    .context("Entry outside workbench root")?
                    .to_string_lossy()
                    .replace('\\', "/");
                let key = format!("{}/{}", self.workdir, relative);

                if entry.file_type().await?.is_dir() {
                    files.insert(key, FileEntry::Folder);
                    self.collect(path, files).await?;
                } else {
                    let bytes = tokio::fs::read(&path).await?;
                    let entry = match String::from_utf8(bytes) {
                        Ok(text) => FileEntry::text(text),
                        Err(e) => FileEntry::File {
                            content: base64::engine::general_purpose::STANDARD
                                .encode(e.into_bytes()),
                            is_binary: true,
                        },
                    };
                    files.insert(key, entry);
                }
            }

            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl Workbench for DirectoryWorkbench {
    async fn first_artifact(&self) -> Option<Artifact> {
        self.artifact.clone()
    }

    async fn files(&self) -> Result<FileMap> {
        let mut files = FileMap::new();
        if tokio::fs::metadata(&self.root).await.is_err() {
            return Ok(files);
        }
        self.collect(self.root.clone(), &mut files).await?;
        debug!("Collected {} workbench entries from {:?}", files.len(), self.root);
        Ok(files)
    }

    fn workdir(&self) -> &str {
        &self.workdir
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.local_path(path)?)
            .await
            .with_context(|| format!("Failed to create {}", path))
    }

    async fn write_file(&self, path: &str, content: &str, is_binary: bool) -> Result<()> {
        let target = self.local_path(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = if is_binary {
            base64::engine::general_purpose::STANDARD
                .decode(content)
                .with_context(|| format!("Invalid binary content for {}", path))?
        } else {
            content.as_bytes().to_vec()
        };

        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path))
    }
}
