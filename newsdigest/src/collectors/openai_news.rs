//! Collector for <https://openai.com/news>.
//!
//! Tries the RSS candidates in order (official feed, then a community mirror) and falls
//! back to scraping the news landing page when none of them yields a single entry.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CollectionConfig;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

use super::rss_feed::feed_to_items;
use super::{absolute_url, squash_whitespace, Collector};
use crate::ingestion;
use crate::model::NewsItem;
use crate::timestamp::parse_timestamp;

pub const SOURCE_NAME: &str = "OpenAI News";

pub const RSS_CANDIDATES: &[&str] = &[
    "https://openai.com/news/rss.xml",
    "https://openrss.org/openai.com/news",
];

pub const PAGE_URL: &str = "https://openai.com/news";

/// Story cards are same-site links inside `<main>`; only those carrying a `<time>` are stories.
const CARD_SELECTOR: &str = "main a[href^='/']";
const TIME_SELECTOR: &str = "time";
const HEADING_SELECTOR: &str = "h1, h2, h3, h4";

pub struct OpenAiNewsCollector {
    rss_candidates: Vec<Url>,
    page_url: Url,
    client: Client,
    max_attempts: u32,
}

impl OpenAiNewsCollector {
    pub fn new(config: &CollectionConfig) -> Result<Self> {
        Self::with_endpoints(RSS_CANDIDATES, PAGE_URL, config)
    }

    /// Same collector pointed at other endpoints (mirrors, test servers).
    pub fn with_endpoints(rss_candidates: &[&str], page_url: &str, config: &CollectionConfig) -> Result<Self> {
        let rss_candidates = rss_candidates
            .iter()
            .map(|u| Url::parse(u).with_context(|| format!("invalid RSS candidate url: {}", u)))
            .collect::<Result<Vec<_>>>()?;
        let page_url = Url::parse(page_url).with_context(|| format!("invalid page url: {}", page_url))?;

        Ok(Self {
            rss_candidates,
            page_url,
            client: ingestion::build_client(config)?,
            max_attempts: config.max_retries,
        })
    }

    /// One RSS candidate. Failures and empty feeds both come back as an empty list.
    async fn try_rss(&self, url: &Url) -> Vec<NewsItem> {
        let collected_at = Utc::now();
        match ingestion::fetch_and_parse_feed(&self.client, url.as_str(), self.max_attempts).await {
            Ok(feed) if feed.entries.is_empty() => {
                warn!("{}: RSS {} parsed but has no entries", SOURCE_NAME, url);
                Vec::new()
            }
            Ok(feed) => {
                let items = feed_to_items(&feed, url, SOURCE_NAME, collected_at);
                info!("{} RSS ok via {} ({} items)", SOURCE_NAME, url, items.len());
                items
            }
            Err(e) => {
                warn!("{}: RSS failed {} -> {:#}", SOURCE_NAME, url, e);
                Vec::new()
            }
        }
    }

    async fn scrape_page(&self) -> Result<Vec<NewsItem>> {
        let html = match ingestion::fetch_page(&self.client, self.page_url.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                warn!("{}: HTML fallback failed {} -> {:#}", SOURCE_NAME, self.page_url, e);
                return Ok(Vec::new());
            }
        };

        let items = scrape_listing(&html, &self.page_url, SOURCE_NAME, Utc::now())?;
        info!("Scraped {} page {} ({} items)", SOURCE_NAME, self.page_url, items.len());
        Ok(items)
    }
}

#[async_trait]
impl Collector for OpenAiNewsCollector {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_items(&self) -> Result<Vec<NewsItem>> {
        for rss in &self.rss_candidates {
            let items = self.try_rss(rss).await;
            if !items.is_empty() {
                return Ok(items);
            }
        }

        info!("{}: no RSS candidate produced items, falling back to HTML", SOURCE_NAME);
        self.scrape_page().await
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {:?}: {:?}", css, e))
}

/// Extract story cards from a news listing page.
///
/// Only an invalid selector is an error; cards that cannot be read are skipped.
pub(crate) fn scrape_listing(
    html: &str,
    page_url: &Url,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Result<Vec<NewsItem>> {
    let cards = selector(CARD_SELECTOR)?;
    let time = selector(TIME_SELECTOR)?;
    let heading = selector(HEADING_SELECTOR)?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for card in document.select(&cards) {
        // Navigation and duplicate links carry no date
        let Some(time_el) = card.select(&time).next() else {
            continue;
        };

        let Some(url) = card.value().attr("href").and_then(|href| absolute_url(page_url, href)) else {
            continue;
        };

        let title = card
            .select(&heading)
            .next()
            .map(|h| squash_whitespace(&h.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text_outside_time(card));
        if title.is_empty() {
            debug!("Skipping card without title: {}", url);
            continue;
        }

        if !seen.insert(url.clone()) {
            continue;
        }

        let date_text = time_el
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| time_el.text().collect::<String>());

        items.push(NewsItem::new(
            title,
            url,
            parse_timestamp(&date_text, collected_at),
            source,
        ));
    }

    Ok(items)
}

/// Card text without the date label.
fn text_outside_time(card: ElementRef<'_>) -> String {
    let parts: Vec<&str> = card
        .descendants()
        .filter(|node| {
            !node
                .ancestors()
                .any(|a| a.value().as_element().map_or(false, |e| e.name() == "time"))
        })
        .filter_map(|node| node.value().as_text().map(|t| t.trim()))
        .collect();
    squash_whitespace(&parts.join(" "))
}
