use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::PromptRecord;
use super::repository::PromptRepository;

const PROMPTS_FILE: &str = "prompts.json";

/// Stores the collection as one JSON array at `<base_dir>/prompts.json`.
pub struct FilePromptRepository {
    base_dir: PathBuf,
}

impl FilePromptRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn prompts_file(&self) -> PathBuf {
        self.base_dir.join(PROMPTS_FILE)
    }
}

#[async_trait]
impl PromptRepository for FilePromptRepository {
    async fn load(&self) -> Result<Vec<PromptRecord>> {
        let path = self.prompts_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read prompts file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<PromptRecord> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse prompts file: {}", path.display()))?;
        tracing::info!(count = records.len(), "Loaded prompts");
        Ok(records)
    }

    async fn save(&self, records: &[PromptRecord]) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("failed to create data dir: {}", self.base_dir.display()))?;

        let path = self.prompts_file();
        let content = serde_json::to_string_pretty(records).context("failed to serialize prompts")?;

        // Atomic write via temp file + rename
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("failed to write prompts file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("failed to replace prompts file: {}", path.display()))?;
        Ok(())
    }
}
