use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::transfer::document::UserIdentity;
use crate::transfer::types::{DEFAULT_TIMEOUT_MS, TransferOptions};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Local identity; transfers to team fail without one
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Bound on each remote call
    pub timeout_ms: u64,
    pub skip_server_sync: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            skip_server_sync: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn documents_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("documents")
    }

    /// Holds the metadata index and the durable transfer log
    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("state")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentityConfig {
    pub user_id: String,
    pub display_name: String,
}

impl From<&IdentityConfig> for UserIdentity {
    fn from(c: &IdentityConfig) -> Self {
        UserIdentity::new(c.user_id.clone(), c.display_name.clone())
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Default options for transfers and startup recovery
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::default()
            .with_timeout_ms(self.transfer.timeout_ms)
            .with_skip_server_sync(self.transfer.skip_server_sync)
    }
}
