pub mod file_repository;
pub mod query;
pub mod repository;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved prompt plus every content revision it has gone through.
///
/// Field names serialize in camelCase because this is also the shape peers
/// exchange through the sync providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Full content snapshots, oldest first. `history[i].version == i + 1`.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl PromptRecord {
    /// Build a fresh record with a new id and its version 1 snapshot.
    pub fn new(title: &str, content: &str, category: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            created_at: now,
            updated_at: now,
            history: vec![HistoryEntry {
                content: content.to_string(),
                timestamp: now,
                version: 1,
            }],
        }
    }

    /// Apply an edit. A history entry is appended only when the content
    /// actually changes; `updated_at` always moves to `now`.
    pub fn apply_edit(&mut self, title: &str, content: &str, category: &str, now: DateTime<Utc>) {
        if self.content != content {
            self.history.push(HistoryEntry {
                content: content.to_string(),
                timestamp: now,
                version: self.next_version(),
            });
        }
        self.title = title.to_string();
        self.content = content.to_string();
        self.category = category.to_string();
        self.updated_at = now;
    }

    pub fn next_version(&self) -> u32 {
        self.history.len() as u32 + 1
    }

    pub fn latest_version(&self) -> u32 {
        self.history.last().map(|h| h.version).unwrap_or(0)
    }

    pub fn version(&self, version: u32) -> Option<&HistoryEntry> {
        self.history.iter().find(|h| h.version == version)
    }

    /// History for display, newest version first.
    pub fn history_newest_first(&self) -> Vec<&HistoryEntry> {
        let mut entries: Vec<&HistoryEntry> = self.history.iter().collect();
        entries.sort_by(|a, b| b.version.cmp(&a.version));
        entries
    }

    pub fn has_dense_history(&self) -> bool {
        !self.history.is_empty()
            && self
                .history
                .iter()
                .enumerate()
                .all(|(i, h)| h.version as usize == i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_record_seeds_version_one() {
        let now = Utc::now();
        let record = PromptRecord::new("Greeting", "Say hello", "misc", now);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].version, 1);
        assert_eq!(record.history[0].content, "Say hello");
        assert_eq!(record.created_at, now);
        assert_eq!(record.updated_at, now);
        assert!(record.has_dense_history());
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = PromptRecord::new("a", "a", "", now);
        let b = PromptRecord::new("a", "a", "", now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_title_only_edit_keeps_history() {
        let now = Utc::now();
        let mut record = PromptRecord::new("Old", "body", "", now);
        let later = now + Duration::seconds(5);
        record.apply_edit("New", "body", "work", later);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.title, "New");
        assert_eq!(record.category, "work");
        assert_eq!(record.updated_at, later);
        assert_eq!(record.created_at, now);
    }

    #[test]
    fn test_content_edit_appends_version() {
        let now = Utc::now();
        let mut record = PromptRecord::new("t", "v1", "", now);
        record.apply_edit("t", "v2", "", now + Duration::seconds(1));
        record.apply_edit("t", "v3", "", now + Duration::seconds(2));
        assert_eq!(record.latest_version(), 3);
        assert_eq!(record.version(2).unwrap().content, "v2");
        assert!(record.has_dense_history());

        let newest: Vec<u32> = record.history_newest_first().iter().map(|h| h.version).collect();
        assert_eq!(newest, vec![3, 2, 1]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = PromptRecord::new("t", "c", "", Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["history"][0]["version"], 1);
    }

    #[test]
    fn test_missing_category_defaults_empty() {
        let json = r#"{
            "id": "1",
            "title": "t",
            "content": "c",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "history": [{"content": "c", "timestamp": "2024-01-01T00:00:00Z", "version": 1}]
        }"#;
        let record: PromptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.category, "");
        assert_eq!(record.history.len(), 1);
    }
}
