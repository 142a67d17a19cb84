//! News collectors.
//!
//! A collector knows one source and turns it into canonical [`NewsItem`]s. Collectors
//! fail soft: an unreachable or empty source yields `Ok(vec![])` and a log line. An `Err`
//! means something is wrong with the collector itself (bad configuration, invalid
//! selector) and is reported by the pipeline for that collector only.

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::model::NewsItem;

pub mod google_ai;
pub mod openai_news;
pub mod rss_feed;

pub use google_ai::GoogleAiCollector;
pub use openai_news::OpenAiNewsCollector;
pub use rss_feed::RssFeedCollector;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Value written to `NewsItem::source`
    fn source_name(&self) -> &str;

    /// Fetch and normalize the current items of this source.
    async fn fetch_items(&self) -> Result<Vec<NewsItem>>;
}

/// Resolve `href` against `base`, keeping only http(s) results.
pub(crate) fn absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
