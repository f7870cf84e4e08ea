//! Deploying a chat's build output to a static host
//!
//! The flow is: pick the build directory, zip it, upload it to the chat's
//! site (creating one on first deploy), poll until the deploy settles, then
//! remember the site id in the chat metadata for the next deploy.

pub mod netlify;
pub mod poll;

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;

use crate::store::ChatStore;
pub use netlify::{Deploy, NetlifyClient, Site};
pub use poll::{poll_until, PollConfig, PollError};

/// Directories probed, in order, when no build directory is given
pub const COMMON_OUTPUT_DIRS: &[&str] = &["dist", "build", "out", "output", ".next", "public"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub site_id: String,
    pub deploy_id: String,
    pub site_url: Option<String>,
}

/// First existing build directory: `preferred` if given, then the common ones
pub fn find_build_dir(project_root: &Path, preferred: Option<&Path>) -> Option<PathBuf> {
    let candidates = preferred
        .map(|p| project_root.join(p))
        .into_iter()
        .chain(COMMON_OUTPUT_DIRS.iter().map(|d| project_root.join(d)));

    for dir in candidates {
        if dir.is_dir() {
            debug!("Using build directory {:?}", dir);
            return Some(dir);
        }
        debug!("Directory {:?} doesn't exist, trying next option", dir);
    }
    None
}

fn add_dir(
    writer: &mut zip::ZipWriter<Cursor<Vec<u8>>>,
    root: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> Result<usize> {
    let mut count = 0;
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {:?}", dir))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            count += add_dir(writer, root, &path, options)?;
        } else {
            let name = path
                .strip_prefix(root)
                .context("Entry outside build directory")?
                .to_string_lossy()
                .replace('\\', "/");
            writer.start_file(name, options)?;
            writer.write_all(&std::fs::read(&path)?)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Zip every file under `dir`, paths relative to it
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let count = add_dir(&mut writer, dir, dir, options)?;
    if count == 0 {
        anyhow::bail!("Build directory {:?} is empty", dir);
    }

    let archive = writer.finish()?.into_inner();
    debug!("Zipped {} files ({} bytes)", count, archive.len());
    Ok(archive)
}

/// Deploy `build_dir` for chat `chat_id`, reusing the chat's site when it has one
pub async fn deploy_directory(
    store: &dyn ChatStore,
    client: &NetlifyClient,
    chat_id: &str,
    build_dir: &Path,
    poll: &PollConfig,
) -> Result<DeployResult> {
    let chat = store.require(chat_id).await?;
    let mut metadata = chat.metadata.clone().unwrap_or_default();

    let site_id = match metadata.netlify_site_id.clone() {
        Some(id) => id,
        None => {
            let name = format!("chatkeep-{}-{}", chat.id, chrono::Utc::now().timestamp_millis());
            client.create_site(&name).await?.id
        }
    };

    let dir = build_dir.to_path_buf();
    let archive = tokio::task::spawn_blocking(move || zip_directory(&dir))
        .await
        .context("Archive task panicked")??;

    let deploy = client.deploy_zip(&site_id, archive).await?;
    let deploy = client.wait_for_deploy(&site_id, &deploy.id, poll).await?;

    if metadata.netlify_site_id.as_deref() != Some(site_id.as_str()) {
        metadata.netlify_site_id = Some(site_id.clone());
        if let Err(e) = store.update_metadata(&chat.id, Some(metadata)).await {
            warn!("Failed to remember site {} for chat {}: {}", site_id, chat.id, e);
        }
    }

    info!("Deployed chat {} to site {}", chat.id, site_id);
    Ok(DeployResult {
        site_id,
        deploy_id: deploy.id.clone(),
        site_url: deploy.public_url().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prefers_explicit_build_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("site")).unwrap();
        std::fs::create_dir_all(temp.path().join("dist")).unwrap();

        let found = find_build_dir(temp.path(), Some(Path::new("site"))).unwrap();
        assert_eq!(found, temp.path().join("site"));

        let fallback = find_build_dir(temp.path(), Some(Path::new("missing"))).unwrap();
        assert_eq!(fallback, temp.path().join("dist"));
    }

    #[test]
    fn no_build_dir() {
        let temp = TempDir::new().unwrap();
        assert!(find_build_dir(temp.path(), None).is_none());
    }

    #[test]
    fn zips_nested_files() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("assets")).unwrap();
        std::fs::write(temp.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(temp.path().join("assets/app.js"), "console.log(1)").unwrap();

        let archive = zip_directory(temp.path()).unwrap();
        let mut reader = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut names: Vec<String> = (0..reader.len())
            .map(|i| reader.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["assets/app.js", "index.html"]);
    }

    #[test]
    fn empty_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(zip_directory(temp.path()).is_err());
    }
}
