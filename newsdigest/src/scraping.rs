use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::io::Cursor;
use std::time::Duration;
use tracing::{info, warn};

/// Fetches article pages and reduces them to readable text for the digest prompt.
pub struct ArticleReader {
    client: Client,
    char_limit: usize,
    /// Reader proxy prefix, the article URL is appended verbatim
    proxy_url: String,
}

impl ArticleReader {
    pub fn new(timeout_secs: u64, char_limit: usize, proxy_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            char_limit,
            proxy_url: proxy_url.into(),
        })
    }

    pub fn char_limit(&self) -> usize {
        self.char_limit
    }

    /// Main text of the article at `url`, capped at the char limit.
    ///
    /// A 403 from the site is retried through the reader proxy. Any other failure
    /// gives an empty string; a story without body text can still be summarized
    /// from its title.
    pub async fn extract_text(&self, url: &str) -> String {
        match self.direct_readable(url).await {
            Ok(text) => truncate_chars(&text, self.char_limit),
            Err(e) if status_of(&e) == Some(StatusCode::FORBIDDEN) => {
                info!("403 - trying reader proxy for {}", url);
                match self.proxy_readable(url).await {
                    Ok(text) => truncate_chars(&text, self.char_limit),
                    Err(e) => {
                        warn!("reader proxy failed for {}: {:#}", url, e);
                        String::new()
                    }
                }
            }
            Err(e) => {
                warn!("extract_text failed {}: {:#}", url, e);
                String::new()
            }
        }
    }

    async fn direct_readable(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to fetch article page")?
            .error_for_status()?;

        // Readability requires a Reader, so we fetch bytes
        let bytes = response.bytes().await.context("failed to read response body")?;
        let mut reader = Cursor::new(bytes);
        let url_obj = url::Url::parse(url).context("failed to parse article URL")?;

        let product = readability::extractor::extract(&mut reader, &url_obj)
            .map_err(|e| anyhow::anyhow!("readability failed: {:?}", e))?;

        match html2text::from_read(product.content.as_bytes(), 100) {
            Ok(text) => {
                info!("scraping: readability extracted {} chars from {}", text.len(), url);
                Ok(text.trim().to_string())
            }
            Err(e) => {
                warn!("scraping: failed to convert extracted HTML to text: {}", e);
                Ok(product.text.trim().to_string())
            }
        }
    }

    async fn proxy_readable(&self, url: &str) -> Result<String> {
        let proxied = format!("{}{}", self.proxy_url, url);
        let text = self
            .client
            .get(&proxied)
            .send()
            .await
            .context("failed to fetch through reader proxy")?
            .error_for_status()?
            .text()
            .await
            .context("failed to read proxy response body")?;
        Ok(text.trim().to_string())
    }
}

fn status_of(e: &anyhow::Error) -> Option<StatusCode> {
    e.downcast_ref::<reqwest::Error>().and_then(|e| e.status())
}

/// Keep at most `limit` characters (not bytes).
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<html><head><title>Model update</title></head><body>
<nav>Home | News</nav>
<article>
  <h1>Model update</h1>
  <p>The new model improves reasoning across a wide range of tasks and benchmarks, according to the announcement published today.</p>
  <p>It is available to developers through the API starting this week, with broader availability planned for next month.</p>
  <p>Pricing remains unchanged for existing customers while usage limits are being raised gradually over the coming weeks.</p>
</article>
<footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[tokio::test]
    async fn extracts_readable_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/article")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(ARTICLE)
            .create_async()
            .await;

        let reader = ArticleReader::new(5, 7000, format!("{}/proxy/", server.url())).unwrap();
        let text = reader.extract_text(&format!("{}/article", server.url())).await;
        assert!(text.contains("improves reasoning"), "{text}");
    }

    #[tokio::test]
    async fn forbidden_goes_through_reader_proxy() {
        let mut server = mockito::Server::new_async().await;
        let article_url = format!("{}/blocked", server.url());
        let _blocked = server
            .mock("GET", "/blocked")
            .with_status(403)
            .create_async()
            .await;
        let proxy = server
            .mock("GET", mockito::Matcher::Regex("^/proxy/http.*/blocked$".to_string()))
            .with_status(200)
            .with_body("  Proxied article text  ")
            .create_async()
            .await;

        let reader = ArticleReader::new(5, 8, format!("{}/proxy/", server.url())).unwrap();
        let text = reader.extract_text(&article_url).await;
        assert_eq!(text, "Proxied ");
        proxy.assert_async().await;
    }

    #[tokio::test]
    async fn other_failures_give_empty_text() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let proxy = server
            .mock("GET", mockito::Matcher::Regex("^/proxy/.*".to_string()))
            .expect(0)
            .create_async()
            .await;

        let reader = ArticleReader::new(5, 7000, format!("{}/proxy/", server.url())).unwrap();
        assert_eq!(reader.extract_text(&format!("{}/missing", server.url())).await, "");
        proxy.assert_async().await;
    }
}
