use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::PromptRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    UpdatedDesc,
    UpdatedAsc,
    CreatedDesc,
    CreatedAsc,
    TitleAsc,
    TitleDesc,
}

impl SortOrder {
    pub const ALL: [SortOrder; 6] = [
        SortOrder::UpdatedDesc,
        SortOrder::UpdatedAsc,
        SortOrder::CreatedDesc,
        SortOrder::CreatedAsc,
        SortOrder::TitleAsc,
        SortOrder::TitleDesc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::UpdatedDesc => "updated-desc",
            SortOrder::UpdatedAsc => "updated-asc",
            SortOrder::CreatedDesc => "created-desc",
            SortOrder::CreatedAsc => "created-asc",
            SortOrder::TitleAsc => "title-asc",
            SortOrder::TitleDesc => "title-desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortOrder::ALL
            .into_iter()
            .find(|order| order.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = SortOrder::ALL.iter().map(|o| o.as_str()).collect();
                format!("unknown sort order '{s}' (expected one of: {})", valid.join(", "))
            })
    }
}

/// Search, category filter and ordering over a snapshot of the collection.
#[derive(Debug, Clone, Default)]
pub struct PromptQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort: SortOrder,
}

impl PromptQuery {
    pub fn apply(&self, records: &[PromptRecord]) -> Vec<PromptRecord> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let category = self.category.as_deref().filter(|c| !c.is_empty());

        let mut matched: Vec<PromptRecord> = records
            .iter()
            .filter(|p| match &needle {
                Some(q) => {
                    p.title.to_lowercase().contains(q)
                        || p.content.to_lowercase().contains(q)
                        || p.category.to_lowercase().contains(q)
                }
                None => true,
            })
            .filter(|p| category.is_none_or(|c| p.category == c))
            .cloned()
            .collect();

        match self.sort {
            SortOrder::UpdatedDesc => matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            SortOrder::UpdatedAsc => matched.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
            SortOrder::CreatedDesc => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::CreatedAsc => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::TitleAsc => matched.sort_by(|a, b| title_order(a, b)),
            SortOrder::TitleDesc => matched.sort_by(|a, b| title_order(b, a)),
        }
        matched
    }
}

/// Case-insensitive, with the raw title breaking ties so the order is total.
fn title_order(a: &PromptRecord, b: &PromptRecord) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.title.cmp(&b.title))
}

/// Distinct non-blank categories, sorted.
pub fn categories(records: &[PromptRecord]) -> Vec<String> {
    records
        .iter()
        .map(|p| p.category.trim())
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
