use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub host: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub refresh_interval_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub purge_interval_secs: Option<u64>,

    // Sections
    pub github: Option<GitHubFileConfig>,
    pub dispatcher: Option<DispatcherFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GitHubFileConfig {
    pub token: Option<String>,
    pub orgs: Option<Vec<String>>,
    pub url: Option<String>,
    pub per_page: Option<u32>,
    pub timeout_sec: Option<u64>,
    pub max_pulls_per_repo: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatcherFileConfig {
    pub max_workers: Option<usize>,
    pub max_queue: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
