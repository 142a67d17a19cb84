use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CollectionConfig;
use feed_rs::model::{Entry, Feed};
use reqwest::Client;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::{absolute_url, squash_whitespace, Collector};
use crate::ingestion;
use crate::model::NewsItem;

/// RSS-only collector for a feed declared in the configuration.
/// A failing or empty feed simply yields no items; there is no HTML path.
pub struct RssFeedCollector {
    name: String,
    url: Url,
    client: Client,
    max_attempts: u32,
}

impl RssFeedCollector {
    pub fn new(name: impl Into<String>, url: &str, config: &CollectionConfig) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid feed url: {}", url))?;
        Ok(Self {
            name: name.into(),
            url,
            client: ingestion::build_client(config)?,
            max_attempts: config.max_retries,
        })
    }
}

#[async_trait]
impl Collector for RssFeedCollector {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn fetch_items(&self) -> Result<Vec<NewsItem>> {
        let collected_at = Utc::now();
        match ingestion::fetch_and_parse_feed(&self.client, self.url.as_str(), self.max_attempts).await {
            Ok(feed) => {
                let items = feed_to_items(&feed, &self.url, &self.name, collected_at);
                info!("{}: RSS ok via {} ({} items)", self.name, self.url, items.len());
                Ok(items)
            }
            Err(e) => {
                warn!("{}: RSS failed {} -> {:#}", self.name, self.url, e);
                Ok(Vec::new())
            }
        }
    }
}

/// Normalize every usable entry of a parsed feed. Entries without a title or a
/// resolvable link are skipped one by one.
pub(crate) fn feed_to_items(
    feed: &Feed,
    feed_url: &Url,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Vec<NewsItem> {
    feed.entries
        .iter()
        .filter_map(|entry| entry_to_item(entry, feed_url, source, collected_at))
        .collect()
}

fn entry_to_item(
    entry: &Entry,
    feed_url: &Url,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Option<NewsItem> {
    let title = entry
        .title
        .as_ref()
        .map(|t| squash_whitespace(&t.content))
        .unwrap_or_default();
    if title.is_empty() {
        debug!("Skipping feed entry without title: {}", entry.id);
        return None;
    }

    let Some(url) = entry
        .links
        .iter()
        .find_map(|l| absolute_url(feed_url, &l.href))
    else {
        debug!("Skipping feed entry without link: {:?}", title);
        return None;
    };

    // dates were read by the tolerant parser; absent or unreadable ones become the collection time
    let published_at = entry.published.or(entry.updated).unwrap_or(collected_at);

    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .map(|html| html_to_plain_text(&html))
        .filter(|text| !text.is_empty());

    let mut item = NewsItem::new(title, url, published_at, source);
    item.description = description;
    Some(item)
}

fn html_to_plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    squash_whitespace(&text)
}
