use std::time::Duration;

/// Errors from sync provider operations.
///
/// Every variant carries enough text to be shown to a user as-is.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("missing required config: {0}")]
    MissingConfig(&'static str),

    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed remote data: {0}")]
    Malformed(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub(crate) fn unreachable(context: &str, err: reqwest::Error) -> Self {
        ProviderError::Unreachable(format!("{context}: {err}"))
    }

    pub(crate) fn malformed(context: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Malformed(format!("{context}: {err}"))
    }
}

/// Why a sync cycle did not complete.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("a sync is already in progress")]
    AlreadySyncing,

    #[error("no active sync provider")]
    NoActiveProvider,

    #[error("upload failed: {0}")]
    Upload(#[source] ProviderError),

    #[error("download failed: {0}")]
    Download(#[source] ProviderError),

    #[error("failed to apply remote snapshot: {0:#}")]
    Apply(anyhow::Error),
}
