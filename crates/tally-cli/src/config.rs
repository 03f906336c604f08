use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tally_core::pending::DEFAULT_TTL_MINUTES;
use tally_core::storage::Party;

#[derive(Debug, Serialize, Deserialize)]
pub struct TallyConfig {
    pub ledger: LedgerSection,
    #[serde(default)]
    pub pending: PendingSection,
    /// Sender id → party, for the chat identity gate.
    #[serde(default)]
    pub parties: HashMap<String, Party>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerSection {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingSection {
    pub ttl_minutes: i64,
}

impl Default for PendingSection {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_ledger_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("tally.db"))
}

pub fn read_config(path: &Path) -> anyhow::Result<TallyConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("tally"));
        }
    }
    Ok(home_dir()?.join(".config").join("tally"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("tally"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("tally"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}
