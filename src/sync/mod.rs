pub mod coordinator;
pub mod error;
pub mod gist;
pub mod http_api;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::prompts::PromptRecord;

pub use error::{ProviderError, SyncError};

/// A remote medium the whole prompt collection can be pushed to and read
/// back from.
///
/// Implementations keep exactly one remote object per configuration and
/// overwrite it on every upload.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Push the full collection, replacing the remote snapshot.
    async fn upload(&self, records: &[PromptRecord]) -> Result<UploadResult, ProviderError>;

    /// Fetch the latest remote snapshot. "Nothing stored yet" is an empty
    /// result, not an error.
    async fn download(&self) -> Result<DownloadResult, ProviderError>;

    /// Probe credentials and reachability without touching stored data.
    async fn test_connection(&self) -> Result<ConnectionCheck, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Gist,
    HttpApi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gist => "gist",
            ProviderKind::HttpApi => "http-api",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadResult {
    /// Identifier of the remote object, when the medium assigns one.
    pub remote_id: Option<String>,
    pub url: Option<String>,
    /// Server-side version counter, surfaced for observability only.
    pub version: Option<i64>,
    pub message: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadResult {
    pub records: Vec<PromptRecord>,
    pub metadata: SnapshotMetadata,
}

impl DownloadResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotMetadata {
    pub timestamp: Option<String>,
    pub version: Option<SnapshotVersion>,
}

/// Gist snapshots carry a format label ("1.0"), the HTTP server a counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotVersion {
    Counter(i64),
    Label(String),
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotVersion::Counter(n) => write!(f, "{n}"),
            SnapshotVersion::Label(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub detail: String,
}

/// Construct every provider configured in `config`, keyed by kind name.
///
/// Fails on the first section that is missing a required field.
pub fn build_providers(
    config: &SyncConfig,
    http_client: Arc<reqwest::Client>,
) -> Result<Vec<(ProviderKind, Arc<dyn SyncProvider>)>, ProviderError> {
    let mut providers: Vec<(ProviderKind, Arc<dyn SyncProvider>)> = Vec::new();
    if let Some(gist_config) = &config.gist {
        let provider = gist::GistProvider::new(http_client.clone(), gist_config)?;
        providers.push((ProviderKind::Gist, Arc::new(provider)));
    }
    if let Some(http_config) = &config.http_api {
        let provider = http_api::HttpApiProvider::new(http_client.clone(), http_config)?;
        providers.push((ProviderKind::HttpApi, Arc::new(provider)));
    }
    Ok(providers)
}

/// Pull a readable message out of an error response body. JSON bodies with
/// a `message` or `error` field use that field, anything else is returned
/// trimmed.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turn a non-success response into `ProviderError::Status`.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(error_message(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_message(r#"{"error":"token invalid"}"#), "token invalid");
        assert_eq!(error_message("  plain failure \n"), "plain failure");
        assert_eq!(error_message(""), "no response body");
    }

    #[test]
    fn test_snapshot_version_untagged() {
        let counter: SnapshotVersion = serde_json::from_str("7").unwrap();
        assert_eq!(counter, SnapshotVersion::Counter(7));
        let label: SnapshotVersion = serde_json::from_str(r#""1.0""#).unwrap();
        assert_eq!(label.to_string(), "1.0");
    }

    #[test]
    fn test_build_providers_from_config() {
        let config: SyncConfig = toml::from_str(
            r#"
            [gist]
            token = "ghp_abc"
            [http_api]
            endpoint = "https://x.dev"
            user_id = "alice"
        "#,
        )
        .unwrap();
        let providers = build_providers(&config, Arc::new(reqwest::Client::new())).unwrap();
        let kinds: Vec<ProviderKind> = providers.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![ProviderKind::Gist, ProviderKind::HttpApi]);
        assert_eq!(providers[0].1.name(), "GitHub Gist");
        assert_eq!(providers[1].1.kind(), ProviderKind::HttpApi);
    }

    #[test]
    fn test_build_providers_rejects_incomplete_section() {
        let config: SyncConfig = toml::from_str(
            r#"
            [http_api]
            endpoint = "https://x.dev"
        "#,
        )
        .unwrap();
        let err = build_providers(&config, Arc::new(reqwest::Client::new()))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::MissingConfig("http_api.user_id")));
    }

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(ProviderKind::HttpApi.to_string(), "http-api");
        let kind: ProviderKind = serde_json::from_str(r#""gist""#).unwrap();
        assert_eq!(kind, ProviderKind::Gist);
    }
}
