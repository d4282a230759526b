//! Common types and utilities shared across models.

use serde::{Deserialize, Serialize};

/// Separator used when a tag list is flattened into a single column
pub const TAG_SEPARATOR: char = ',';

/// Helper to parse the stored tag column back into a list
pub fn parse_tags(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split(TAG_SEPARATOR).map(str::to_string).collect()
}

/// Helper to flatten a tag list for storage
pub fn serialize_tags(tags: &[String]) -> String {
    tags.join(TAG_SEPARATOR.to_string().as_str())
}

/// Current time as stored in timestamp columns
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Page query parameters (1-indexed)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub const DEFAULT_PER_PAGE: i64 = 10;
    pub const MAX_PER_PAGE: i64 = 100;

    /// Resolve to a `(page, per_page)` pair with defaults and bounds applied
    pub fn resolve(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE);
        (page, per_page)
    }
}

/// A single page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tags() {
        assert!(parse_tags("").is_empty());
        assert_eq!(serialize_tags(&[]), "");
    }

    #[test]
    fn test_tags_keep_order() {
        let tags = vec!["b".to_string(), "a".to_string()];
        let stored = serialize_tags(&tags);
        assert_eq!(stored, "b,a");
        assert_eq!(parse_tags(&stored), tags);
    }

    #[test]
    fn test_page_query_defaults() {
        assert_eq!(PageQuery::default().resolve(), (1, 10));
    }

    #[test]
    fn test_page_query_bounds() {
        let q = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(q.resolve(), (1, 100));

        let q = PageQuery {
            page: Some(-3),
            per_page: Some(0),
        };
        assert_eq!(q.resolve(), (1, 1));
    }
}
