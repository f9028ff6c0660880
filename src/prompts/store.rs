use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::RwLock;

use super::repository::PromptRepository;
use super::{HistoryEntry, PromptRecord};

/// The authoritative in-process prompt collection.
///
/// Every mutation writes the full collection through the repository before
/// it becomes visible in memory. If the write fails, the call returns the
/// error and the store keeps its previous contents.
pub struct PromptStore {
    repository: Arc<dyn PromptRepository>,
    records: RwLock<Vec<PromptRecord>>,
}

impl PromptStore {
    pub fn new(repository: Arc<dyn PromptRepository>) -> Self {
        Self {
            repository,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Replace the in-memory collection with whatever the repository holds.
    pub async fn load(&self) -> Result<()> {
        let loaded = self
            .repository
            .load()
            .await
            .context("failed to load prompts")?;
        *self.records.write().await = loaded;
        Ok(())
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Vec<PromptRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<PromptRecord> {
        self.records.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn history_version(&self, id: &str, version: u32) -> Option<HistoryEntry> {
        self.records
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.version(version))
            .cloned()
    }

    pub async fn add(&self, title: &str, content: &str, category: &str) -> Result<PromptRecord> {
        let record = PromptRecord::new(title, content, category, Utc::now());

        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.push(record.clone());
        self.persist(&next).await?;
        *records = next;

        tracing::debug!(prompt_id = %record.id, "Added prompt");
        Ok(record)
    }

    /// Returns `Ok(None)` when no record has this id.
    pub async fn update(
        &self,
        id: &str,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<Option<PromptRecord>> {
        let mut records = self.records.write().await;
        let Some(index) = records.iter().position(|p| p.id == id) else {
            return Ok(None);
        };

        let mut next = records.clone();
        next[index].apply_edit(title, content, category, Utc::now());
        let updated = next[index].clone();
        self.persist(&next).await?;
        *records = next;

        tracing::debug!(prompt_id = %id, version = updated.latest_version(), "Updated prompt");
        Ok(Some(updated))
    }

    /// Returns whether a record was actually removed. A miss does not touch
    /// the persisted collection.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        if !records.iter().any(|p| p.id == id) {
            return Ok(false);
        }

        let next: Vec<PromptRecord> = records.iter().filter(|p| p.id != id).cloned().collect();
        self.persist(&next).await?;
        *records = next;

        tracing::debug!(prompt_id = %id, "Deleted prompt");
        Ok(true)
    }

    /// Wholesale replacement used by sync reconciliation. No validation and
    /// no merge: callers must already have resolved conflicts.
    pub async fn replace_all(&self, incoming: Vec<PromptRecord>) -> Result<()> {
        let mut records = self.records.write().await;
        self.persist(&incoming).await?;
        tracing::info!(
            previous = records.len(),
            count = incoming.len(),
            "Replaced prompt collection"
        );
        *records = incoming;
        Ok(())
    }

    async fn persist(&self, records: &[PromptRecord]) -> Result<()> {
        self.repository
            .save(records)
            .await
            .context("failed to persist prompts")
    }
}
