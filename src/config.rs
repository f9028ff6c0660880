use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sync::ProviderKind;
use crate::sync::coordinator::RemoteIdStore;

const DEFAULT_LOG_FILTER: &str = "promptbox=info";
const SYNC_CONFIG_FILE: &str = "sync.toml";

/// Process settings loaded from environment variables.
pub struct Config {
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("PROMPTBOX_HOME").ok().as_deref(),
            std::env::var("PROMPTBOX_LOG").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(home: Option<&str>, log_filter: Option<&str>) -> Self {
        let data_dir = home
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".promptbox")
            });

        let log_filter = log_filter
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Config {
            data_dir,
            log_filter,
        }
    }

    pub fn sync_config_path(&self) -> PathBuf {
        self.data_dir.join(SYNC_CONFIG_FILE)
    }
}

/// Contents of `sync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ProviderKind>,
    /// Upper bound for each provider call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist: Option<GistConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_api: Option<HttpApiConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GistConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SyncConfig {
    /// A missing file means nothing is configured yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sync config: {}", path.display()))?;
        let config: SyncConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse sync config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config dir: {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize sync config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write sync config: {}", path.display()))?;
        Ok(())
    }

    pub fn configured_kinds(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        if self.gist.is_some() {
            kinds.push(ProviderKind::Gist);
        }
        if self.http_api.is_some() {
            kinds.push(ProviderKind::HttpApi);
        }
        kinds
    }

    /// The explicit `active` choice, or the only configured provider.
    pub fn active_provider(&self) -> Option<ProviderKind> {
        if self.active.is_some() {
            return self.active;
        }
        match self.configured_kinds().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// `sync.toml` on disk. Learned gist ids are written back here.
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SyncConfig> {
        SyncConfig::load(&self.path)
    }

    pub fn save(&self, config: &SyncConfig) -> Result<()> {
        config.save(&self.path)
    }
}

#[async_trait]
impl RemoteIdStore for ConfigFile {
    async fn remember_remote_id(&self, provider: &str, remote_id: &str) -> Result<()> {
        if provider != ProviderKind::Gist.as_str() {
            return Ok(());
        }
        let mut config = self.load()?;
        let gist = config.gist.get_or_insert_with(GistConfig::default);
        if gist.gist_id.as_deref() == Some(remote_id) {
            return Ok(());
        }
        gist.gist_id = Some(remote_id.to_string());
        self.save(&config)?;
        tracing::info!(gist_id = remote_id, path = %self.path.display(), "Saved gist id");
        Ok(())
    }
}
