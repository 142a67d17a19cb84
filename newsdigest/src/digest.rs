//! Daily digest: the newest stored stories, enriched with article text and summarized by
//! an LLM into a dated JSON document.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use common::DigestConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{extract_json_from_text, LlmProvider, LlmRequest};
use crate::model::StoredItem;
use crate::scraping::{truncate_chars, ArticleReader};
use crate::timestamp::format_timestamp;

const SYSTEM_PROMPT: &str = "You are an expert AI-news curator. Follow the JSON schema strictly.";

/// Descriptions at least this long are used instead of scraping the article
const MIN_DESCRIPTION_CHARS: usize = 50;

/// Article excerpt length per story inside the prompt
const PROMPT_BODY_CHARS: usize = 700;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub date: String,
    pub executive_summary: String,
    pub stories: Vec<DigestStory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestStory {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published_at: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A story candidate handed to the digester.
#[derive(Debug, Clone)]
pub struct DigestInput {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    /// Feed description seen during this run, if any
    pub description: Option<String>,
}

impl From<&StoredItem> for DigestInput {
    fn from(item: &StoredItem) -> Self {
        Self {
            title: item.title.clone(),
            url: item.url.clone(),
            published_at: item.published_at,
            source: item.source.clone(),
            description: None,
        }
    }
}

struct PreparedStory {
    input: DigestInput,
    content: String,
}

pub struct Digester {
    provider: Arc<dyn LlmProvider>,
    reader: ArticleReader,
    max_stories: usize,
    max_attempts: u32,
}

impl Digester {
    pub fn new(provider: Arc<dyn LlmProvider>, reader: ArticleReader, config: &DigestConfig) -> Self {
        Self {
            provider,
            reader,
            max_stories: config.max_stories,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Build the digest for `date` from `items` (any order, any length).
    pub async fn create_digest(&self, mut items: Vec<DigestInput>, date: NaiveDate) -> Result<Digest> {
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(self.max_stories);

        let mut stories = Vec::with_capacity(items.len());
        for input in items {
            let content = self.story_content(&input).await;
            stories.push(PreparedStory { input, content });
        }

        let date_str = date.format("%Y-%m-%d").to_string();
        let prompt = build_prompt(&stories, &date_str);

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let response = self
                .provider
                .generate(LlmRequest {
                    system: Some(SYSTEM_PROMPT.to_string()),
                    prompt: prompt.clone(),
                    json_mode: true,
                    ..LlmRequest::default()
                })
                .await
                .context("digest request failed")?;

            match parse_digest(&response.content) {
                Ok(mut digest) => {
                    if digest.date != date_str {
                        warn!("Model dated the digest {:?}, expected {}", digest.date, date_str);
                        digest.date = date_str.clone();
                    }
                    info!(
                        "Digest for {} ready: {} stories, {} tokens",
                        date_str,
                        digest.stories.len(),
                        response.usage.total_tokens
                    );
                    return Ok(digest);
                }
                Err(e) => {
                    warn!(
                        "Malformed digest response (attempt {}/{}): {:#}",
                        attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("no digest attempt was made"))
            .context("model never returned a valid digest"))
    }

    async fn story_content(&self, input: &DigestInput) -> String {
        match input.description.as_deref() {
            Some(desc) if desc.trim().chars().count() > MIN_DESCRIPTION_CHARS => {
                info!("Using RSS description for {}", input.url);
                truncate_chars(desc.trim(), self.reader.char_limit())
            }
            _ => self.reader.extract_text(&input.url).await,
        }
    }
}

/// Parse and validate a model reply against the digest shape.
pub fn parse_digest(reply: &str) -> Result<Digest> {
    let json = extract_json_from_text(reply).context("no JSON object in model reply")?;
    let digest: Digest = serde_json::from_str(&json)
        .with_context(|| format!("reply does not match the digest schema: {}", json))?;
    Ok(digest)
}

/// First 16 hex chars of the SHA-256 of the URL.
pub fn story_id(url: &str) -> String {
    Sha256::digest(url.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Collapse whitespace and cut at a word boundary so the result, placeholder included,
/// fits in `width` characters.
fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let joined = words.join(" ");
    if joined.chars().count() <= width {
        return joined;
    }

    let budget = width.saturating_sub(placeholder.chars().count());
    let mut out = String::new();
    for word in words {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    format!("{}{}", out, placeholder)
}

fn build_prompt(stories: &[PreparedStory], date: &str) -> String {
    let blocks: Vec<String> = stories
        .iter()
        .map(|s| {
            format!(
                "### STORY\nTitle: {}\nSource: {}\nURL: {}\nID: {}\nPublished: {}\nArticle:\n{}\n",
                s.input.title,
                s.input.source,
                s.input.url,
                story_id(&s.input.url),
                format_timestamp(&s.input.published_at),
                shorten(&s.content, PROMPT_BODY_CHARS, "…"),
            )
        })
        .collect();

    format!(
        r#"DATE: {date}

You will produce a JSON object with the following structure:
{{
  "date": "{date}",
  "executive_summary": "2-3 sentences summarizing the key AI developments today",
  "stories": [
    {{
      "id": "use the provided ID for each story",
      "title": "original title",
      "url": "original url",
      "published_at": "original published date",
      "source": "original source",
      "category": "one of: product/research/policy/culture/misc",
      "summary": "1-2 sentence summary of the story",
      "tags": ["up to 4 relevant tags"]
    }}
  ]
}}

Stories:

{stories}"#,
        date = date,
        stories = blocks.join("\n"),
    )
}

/// Write `<output_dir>/<date>.json`, pretty-printed, and return the path.
pub async fn write_digest(digest: &Digest, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let path = output_dir.join(format!("{}.json", digest.date));
    let json = serde_json::to_string_pretty(digest).context("failed to serialize digest")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write digest {}", path.display()))?;
    Ok(path)
}
