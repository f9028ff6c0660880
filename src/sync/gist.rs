use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    ConnectionCheck, DownloadResult, ProviderError, ProviderKind, SnapshotMetadata,
    SnapshotVersion, SyncProvider, UploadResult, ensure_success,
};
use crate::config::GistConfig;
use crate::prompts::PromptRecord;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "promptbox-sync";
const ACCEPT: &str = "application/vnd.github.v3+json";

pub const BACKUP_FILE: &str = "prompts-backup.json";
pub const BACKUP_FORMAT_VERSION: &str = "1.0";
const GIST_DESCRIPTION: &str = "Prompt collection backup";

/// Document stored inside the backup file of the gist.
#[derive(Debug, Serialize, Deserialize)]
struct BackupDocument {
    #[serde(default)]
    prompts: Vec<PromptRecord>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    version: Option<SnapshotVersion>,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

/// Keeps the collection in a single private GitHub gist.
///
/// The gist is created on the first upload and updated in place afterwards.
/// Persisting the learned id across runs is the caller's job; it is reported
/// in `UploadResult::remote_id`.
pub struct GistProvider {
    http_client: Arc<Client>,
    token: String,
    gist_id: RwLock<Option<String>>,
    api_base: String,
}

impl GistProvider {
    pub fn new(http_client: Arc<Client>, config: &GistConfig) -> Result<Self, ProviderError> {
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::MissingConfig("gist.token"))?;
        let gist_id = config
            .gist_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from);

        Ok(Self {
            http_client,
            token: token.to_string(),
            gist_id: RwLock::new(gist_id),
            api_base: GITHUB_API.to_string(),
        })
    }

    /// Point the provider at a different API root (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn gist_id(&self) -> Option<String> {
        self.gist_id.read().await.clone()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
    }

    async fn fetch_file_content(&self, file: GistFile) -> Result<String, ProviderError> {
        if !file.truncated {
            if let Some(content) = file.content {
                return Ok(content);
            }
        }

        let raw_url = file
            .raw_url
            .ok_or_else(|| ProviderError::Malformed("gist file has no content or raw_url".into()))?;
        let resp = self
            .authorized(self.http_client.get(&raw_url))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to fetch raw gist file", e))?;
        let resp = ensure_success(resp).await?;
        resp.text()
            .await
            .map_err(|e| ProviderError::unreachable("failed to read raw gist file", e))
    }
}

#[async_trait]
impl SyncProvider for GistProvider {
    fn name(&self) -> &str {
        "GitHub Gist"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gist
    }

    async fn upload(&self, records: &[PromptRecord]) -> Result<UploadResult, ProviderError> {
        let document = BackupDocument {
            prompts: records.to_vec(),
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            version: Some(SnapshotVersion::Label(BACKUP_FORMAT_VERSION.to_string())),
        };
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| ProviderError::malformed("failed to serialize backup", e))?;
        let payload = serde_json::json!({
            "description": GIST_DESCRIPTION,
            "public": false,
            "files": {
                BACKUP_FILE: { "content": content }
            }
        });

        let existing = self.gist_id().await;
        let request = match &existing {
            Some(id) => self
                .http_client
                .patch(format!("{}/gists/{id}", self.api_base)),
            None => self.http_client.post(format!("{}/gists", self.api_base)),
        };

        let resp = self
            .authorized(request)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to upload gist", e))?;
        let resp = ensure_success(resp).await?;
        let gist: GistResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse gist response", e))?;

        if existing.is_none() {
            tracing::info!(gist_id = %gist.id, "Created backup gist");
            *self.gist_id.write().await = Some(gist.id.clone());
        }

        Ok(UploadResult {
            remote_id: Some(gist.id),
            url: gist.html_url,
            version: None,
            message: Some(format!("uploaded {} prompts", records.len())),
            updated_at: gist.updated_at,
        })
    }

    async fn download(&self) -> Result<DownloadResult, ProviderError> {
        let Some(id) = self.gist_id().await else {
            return Ok(DownloadResult::empty());
        };

        let resp = self
            .authorized(self.http_client.get(format!("{}/gists/{id}", self.api_base)))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to fetch gist", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::warn!(gist_id = %id, "Backup gist not found, treating as empty");
            return Ok(DownloadResult::empty());
        }
        let resp = ensure_success(resp).await?;
        let mut gist: GistResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse gist", e))?;

        let Some(file) = gist.files.remove(BACKUP_FILE) else {
            return Ok(DownloadResult::empty());
        };
        let content = self.fetch_file_content(file).await?;
        let document: BackupDocument = serde_json::from_str(&content)
            .map_err(|e| ProviderError::malformed("failed to parse backup file", e))?;

        Ok(DownloadResult {
            records: document.prompts,
            metadata: SnapshotMetadata {
                timestamp: document.timestamp,
                version: document.version,
            },
        })
    }

    async fn test_connection(&self) -> Result<ConnectionCheck, ProviderError> {
        let resp = self
            .authorized(self.http_client.get(format!("{}/user", self.api_base)))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to reach GitHub", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(ConnectionCheck {
                ok: false,
                detail: format!("token invalid or lacks gist permission ({status})"),
            });
        }
        let user: GithubUser = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse GitHub user", e))?;
        Ok(ConnectionCheck {
            ok: true,
            detail: format!("authenticated as {}", user.login),
        })
    }
}
