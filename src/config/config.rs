//! Chatkeep configuration management
//! Handles loading and saving the YAML config file

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deploy::{NetlifyClient, PollConfig};

/// Chatkeep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// History database path
    #[serde(default = "default_db_path")]
    pub database_path: String,

    /// Directory holding mirrored chat backups
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub deploy: DeployConfig,
}

fn default_db_path() -> String {
    "~/.chatkeep/history.db".to_string()
}

fn default_backup_dir() -> String {
    "~/.chatkeep/backup".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            backup_dir: default_backup_dir(),
            persistence: PersistenceConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

/// Persistence switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Store chats at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Mirror every saved chat into `backup_dir`
    #[serde(default = "default_true")]
    pub mirror: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mirror: true,
        }
    }
}

/// Static-hosting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// API token; `NETLIFY_TOKEN` takes precedence when set
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_api_url() -> String {
    NetlifyClient::DEFAULT_API_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    60
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl DeployConfig {
    pub fn poll_config(&self) -> PollConfig {
        let interval = Duration::from_millis(self.poll_interval_ms);
        PollConfig {
            max_attempts: self.max_attempts,
            interval,
            error_interval: interval + interval / 2,
        }
    }

    pub fn resolve_token(&self) -> Option<String> {
        std::env::var("NETLIFY_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

impl Config {
    /// Load config from the default location or specified path
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&raw).context("Failed to parse config file")?;

        debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    fn config_path(path: Option<&str>) -> Result<PathBuf> {
        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        if let Ok(env_path) = std::env::var("CHATKEEP_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".chatkeep").join("config.yml"))
    }

    /// Resolve database path (expand ~)
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.database_path)
    }

    /// Resolve backup directory (expand ~)
    pub fn resolve_backup_dir(&self) -> Result<PathBuf> {
        expand_home(&self.backup_dir)
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().context("Cannot find home directory")?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        let path_str = path.to_string_lossy().to_string();

        let config = Config::load(Some(&path_str)).unwrap();
        assert!(path.exists());
        assert!(config.persistence.enabled);
        assert_eq!(config.deploy.max_attempts, 60);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "database_path: /tmp/h.db\npersistence:\n  mirror: false\n").unwrap();

        let config = Config::load(Some(&path.to_string_lossy())).unwrap();
        assert_eq!(config.database_path, "/tmp/h.db");
        assert!(config.persistence.enabled);
        assert!(!config.persistence.mirror);
        assert_eq!(config.resolve_db_path().unwrap(), PathBuf::from("/tmp/h.db"));
    }

    #[test]
    fn poll_config_from_deploy_settings() {
        let deploy = DeployConfig {
            poll_interval_ms: 1000,
            max_attempts: 30,
            ..DeployConfig::default()
        };
        let poll = deploy.poll_config();
        assert_eq!(poll.max_attempts, 30);
        assert_eq!(poll.interval, Duration::from_secs(1));
        assert_eq!(poll.error_interval, Duration::from_millis(1500));
    }
}
