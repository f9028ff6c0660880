use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    ConnectionCheck, DownloadResult, ProviderError, ProviderKind, SnapshotMetadata,
    SnapshotVersion, SyncProvider, UploadResult, ensure_success,
};
use crate::config::HttpApiConfig;
use crate::prompts::PromptRecord;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest<'a> {
    user_id: &'a str,
    prompts: &'a [PromptRecord],
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptsResponse {
    #[serde(default)]
    prompts: Vec<PromptRecord>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    version: Option<i64>,
}

/// One row of the server's append-only sync log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub version: i64,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Syncs against any server speaking the `/api/sync` + `/api/prompts/{user}`
/// protocol. Every upload becomes a new server-side version; downloads only
/// ever see the latest one.
pub struct HttpApiProvider {
    http_client: Arc<Client>,
    endpoint: String,
    user_id: String,
    api_key: Option<String>,
}

impl HttpApiProvider {
    pub fn new(http_client: Arc<Client>, config: &HttpApiConfig) -> Result<Self, ProviderError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ProviderError::MissingConfig("http_api.endpoint"))?;
        let user_id = config
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ProviderError::MissingConfig("http_api.user_id"))?;
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(String::from);

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Recent versions recorded by the server. Not part of the sync cycle.
    pub async fn sync_history(&self) -> Result<Vec<SyncHistoryEntry>, ProviderError> {
        let resp = self
            .authorized(self.http_client.get(self.url("/api/sync/history")))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to fetch sync history", e))?;
        let resp = ensure_success(resp).await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse sync history", e))
    }
}

#[async_trait]
impl SyncProvider for HttpApiProvider {
    fn name(&self) -> &str {
        "Custom API"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::HttpApi
    }

    async fn upload(&self, records: &[PromptRecord]) -> Result<UploadResult, ProviderError> {
        let body = SyncRequest {
            user_id: &self.user_id,
            prompts: records,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let resp = self
            .authorized(self.http_client.post(self.url("/api/sync")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to upload prompts", e))?;
        let resp = ensure_success(resp).await?;
        let result: SyncResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse sync response", e))?;

        tracing::debug!(version = ?result.version, "Server accepted upload");
        Ok(UploadResult {
            remote_id: None,
            url: None,
            version: result.version,
            message: result.message,
            updated_at: None,
        })
    }

    async fn download(&self) -> Result<DownloadResult, ProviderError> {
        let user = utf8_percent_encode(&self.user_id, NON_ALPHANUMERIC).to_string();
        let resp = self
            .authorized(self.http_client.get(self.url(&format!("/api/prompts/{user}"))))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to download prompts", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(DownloadResult::empty());
        }
        let resp = ensure_success(resp).await?;
        let data: PromptsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed("failed to parse prompts response", e))?;

        Ok(DownloadResult {
            records: data.prompts,
            metadata: SnapshotMetadata {
                timestamp: data.updated_at,
                version: data.version.map(SnapshotVersion::Counter),
            },
        })
    }

    async fn test_connection(&self) -> Result<ConnectionCheck, ProviderError> {
        let resp = self
            .authorized(self.http_client.get(self.url("/api/health")))
            .send()
            .await
            .map_err(|e| ProviderError::unreachable("failed to reach server", e))?;

        let status = resp.status();
        Ok(if status.is_success() {
            ConnectionCheck {
                ok: true,
                detail: format!("connected to {}", self.endpoint),
            }
        } else {
            ConnectionCheck {
                ok: false,
                detail: format!("server responded with {status}"),
            }
        })
    }
}
