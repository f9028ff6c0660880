use anyhow::Result;
use async_trait::async_trait;

use super::PromptRecord;

/// Durable storage for the whole prompt collection as a single blob.
#[async_trait]
pub trait PromptRepository: Send + Sync {
    /// Everything persisted so far, or an empty collection on first run.
    async fn load(&self) -> Result<Vec<PromptRecord>>;
    /// Overwrite the persisted collection with `records`.
    async fn save(&self, records: &[PromptRecord]) -> Result<()>;
}
