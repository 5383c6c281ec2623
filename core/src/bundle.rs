//! Accumulator for paginated FHIR search results.
//!
//! Only the search envelope is modeled: `entry`, `link` and `total`. Entries
//! stay as raw JSON so any resource type passes through untouched.

use serde::Deserialize;
use serde_json::Value;

use crate::error::QueryError;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    entry: Vec<Value>,
    #[serde(default)]
    link: Vec<BundleLink>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BundleLink {
    relation: String,
    url: String,
}

/// Entries collected across one or more search pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    entries: Vec<Value>,
    next_link: Option<String>,
    total: Option<u64>,
    pages: usize,
}

impl Bundle {
    /// Wrap one parsed search page.
    pub fn from_page(page: Value) -> Result<Self, QueryError> {
        let page: SearchPage =
            serde_json::from_value(page).map_err(|e| QueryError::Deserialization(e.to_string()))?;
        Ok(Self::from_search_page(page))
    }

    pub fn from_json(body: &str) -> Result<Self, QueryError> {
        let page: SearchPage =
            serde_json::from_str(body).map_err(|e| QueryError::Deserialization(e.to_string()))?;
        Ok(Self::from_search_page(page))
    }

    /// Entries in the order the server returned them, page by page.
    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Value> {
        self.entries
    }

    /// The `resource` of each entry, skipping entries without one.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|entry| entry.get("resource"))
    }

    /// The `next` link of the most recently merged page.
    pub fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }

    /// `total` as reported by the first page.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `other`'s entries and take over its `next` link.
    pub fn merge(&mut self, other: Bundle) {
        self.entries.extend(other.entries);
        self.next_link = other.next_link;
        if self.total.is_none() {
            self.total = other.total;
        }
        self.pages += other.pages;
    }

    fn from_search_page(page: SearchPage) -> Self {
        let next_link = page
            .link
            .into_iter()
            .find(|link| link.relation == "next")
            .map(|link| link.url);
        Self {
            entries: page.entry,
            next_link,
            total: page.total,
            pages: 1,
        }
    }
}
