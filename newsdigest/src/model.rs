use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical record emitted by every collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    /// Absolute URL, the natural key used for deduplication
    pub url: String,
    pub published_at: DateTime<Utc>,
    /// Name of the collector that produced the item (e.g. "OpenAI News")
    pub source: String,
    /// Feed summary text, kept for the digest only (never persisted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_at,
            source: source.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A row read back from the `news_items` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredItem {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    /// SQLite `CURRENT_TIMESTAMP` text set at insertion
    pub created_at: String,
}
