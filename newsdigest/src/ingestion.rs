use anyhow::{Context, Result};
use common::CollectionConfig;
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;

use crate::timestamp::try_parse_timestamp;

/// Builds the HTTP client shared by a collector's RSS and HTML paths.
pub fn build_client(config: &CollectionConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.as_str())
        .build()
        .context("failed to build reqwest client")
}

/// Fetches a feed from the given URL and parses it.
///
/// Transient failures (5xx, 429, network errors) are retried with exponential backoff,
/// up to `max_attempts` attempts in total. Other 4xx answers fail immediately.
pub async fn fetch_and_parse_feed(client: &Client, url: &str, max_attempts: u32) -> Result<Feed> {
    let max_attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
            tracing::info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, max_attempts, backoff);
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    return parse_feed(&bytes);
                } else if status.is_server_error() {
                    last_error = Some(anyhow::anyhow!("server error: {}", status));
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                } else {
                    // Client error (4xx) - likely permanent, don't retry
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

/// Parses feed bytes, reading every entry date with the tolerant timestamp parser.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    parser::Builder::new()
        .timestamp_parser(try_parse_timestamp)
        .build()
        .parse(bytes)
        .context("failed to parse feed")
}

/// Fetches an HTML page and returns its body. Any non-2xx status is an error.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch page {}", url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("page fetch failed with status: {}", status));
    }

    response.text().await.context("failed to read response body")
}
