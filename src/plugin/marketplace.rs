//! Marketplace Catalog
//!
//! Read-only view over a marketplace feed file. Entries describe
//! installable plugins with popularity metadata; `source` points at the
//! local package directory for entries that can be installed directly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::plugin::error::{HostError, HostResult};

/// One installable plugin as listed in the marketplace feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub downloads: u64,
    pub rating: f64,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    plugins: Vec<MarketplaceEntry>,
}

/// Parsed marketplace feed
#[derive(Debug)]
pub struct MarketplaceCatalog {
    entries: Vec<MarketplaceEntry>,
}

impl MarketplaceCatalog {
    /// Load a feed from a JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> HostResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            HostError::catalog_error(format!(
                "failed to read feed {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> HostResult<Self> {
        let feed: Feed = serde_json::from_str(content)
            .map_err(|e| HostError::catalog_error(format!("malformed feed: {}", e)))?;
        Ok(Self { entries: feed.plugins })
    }

    pub fn entries(&self) -> &[MarketplaceEntry] {
        &self.entries
    }

    pub fn find(&self, plugin_id: &str) -> Option<&MarketplaceEntry> {
        self.entries.iter().find(|e| e.id == plugin_id)
    }

    /// Case-insensitive search over name, description, and tags
    pub fn search(&self, query: &str) -> Vec<&MarketplaceEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&query)
                    || e.description.to_lowercase().contains(&query)
                    || e.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "plugins": [
            {
                "id": "rust-analyzer-lite",
                "name": "Rust Analyzer Lite",
                "version": "0.3.0",
                "description": "Lightweight Rust language support",
                "author": "community",
                "downloads": 15400,
                "rating": 4.7,
                "category": "languages",
                "tags": ["rust", "lsp"]
            },
            {
                "id": "night-owl",
                "name": "Night Owl Theme",
                "version": "1.1.0",
                "description": "A dark theme for late sessions",
                "author": "community",
                "downloads": 8200,
                "rating": 4.5,
                "category": "themes",
                "tags": ["theme", "dark"],
                "source": "/var/feeds/night-owl"
            }
        ]
    }"#;

    #[test]
    fn test_parse_feed() {
        let catalog = MarketplaceCatalog::from_json(FEED).unwrap();
        assert_eq!(catalog.entries().len(), 2);
        let entry = catalog.find("night-owl").unwrap();
        assert_eq!(entry.downloads, 8200);
        assert_eq!(entry.source.as_deref(), Some("/var/feeds/night-owl"));
        assert!(catalog.find("missing").is_none());
    }

    #[test]
    fn test_search_matches_name_description_and_tags() {
        let catalog = MarketplaceCatalog::from_json(FEED).unwrap();
        assert_eq!(catalog.search("RUST").len(), 1);
        assert_eq!(catalog.search("dark").len(), 1);
        assert_eq!(catalog.search("lsp").len(), 1);
        assert!(catalog.search("python").is_empty());
    }

    #[test]
    fn test_malformed_feed_rejected() {
        let err = MarketplaceCatalog::from_json("{ not json").unwrap_err();
        assert!(matches!(err, HostError::CatalogError { .. }));

        let empty = MarketplaceCatalog::from_json("{}").unwrap();
        assert!(empty.entries().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = MarketplaceCatalog::load("/nonexistent/feed.json").await.unwrap_err();
        assert!(matches!(err, HostError::CatalogError { .. }));
    }
}
