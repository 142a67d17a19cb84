/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsdigest.

This file provides:
- Config data structures (deserialized from TOML)
- A layered loader (default file + override file) with environment overrides
- A helper to initialize an SQLite connection pool
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file, relative to the working directory
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "digest.sqlite3".to_string(),
        }
    }
}

/// Fetching configuration shared by every collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub timeout_seconds: u64,
    /// Total attempts per feed URL for transient failures (5xx, 429, network)
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            max_retries: 3,
            user_agent: "Mozilla/5.0 (compatible; newsdigest/0.1)".to_string(),
        }
    }
}

/// Daily digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub enabled: bool,
    /// Number of newest stored items handed to the summarizer
    pub max_stories: usize,
    /// Per-article cap on scraped/description text
    pub article_char_limit: usize,
    /// Directory receiving `<YYYY-MM-DD>.json`
    pub output_dir: String,
    /// Reader proxy used when an article answers 403 (the article URL is appended)
    pub reader_proxy_url: String,
    /// Attempts when the model returns malformed or invalid JSON
    pub max_attempts: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_stories: 12,
            article_char_limit: 7000,
            output_dir: "output".to_string(),
            reader_proxy_url: "https://r.jina.ai/".to_string(),
            max_attempts: 2,
        }
    }
}

/// Remote LLM config (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    /// Sent as `HTTP-Referer`
    pub referer: String,
    /// Sent as `X-Title`
    pub title: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: "google/gemini-2.5-flash-preview-05-20".to_string(),
            referer: "https://example.com".to_string(),
            title: "AI-News-Digest".to_string(),
            timeout_seconds: 30,
            max_tokens: 2048,
            temperature: 0.3,
        }
    }
}

/// Additional RSS-only source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply the environment-style overrides (`MAX_STORIES`, `ARTICLE_CHAR_LIMIT`,
    /// `OPENROUTER_REFERER`). `lookup` is usually `|k| std::env::var(k).ok()`.
    /// Unparseable numeric values are rejected rather than silently ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MAX_STORIES") {
            self.digest.max_stories = v
                .trim()
                .parse()
                .with_context(|| format!("MAX_STORIES is not a number: {}", v))?;
        }
        if let Some(v) = lookup("ARTICLE_CHAR_LIMIT") {
            self.digest.article_char_limit = v
                .trim()
                .parse()
                .with_context(|| format!("ARTICLE_CHAR_LIMIT is not a number: {}", v))?;
        }
        if let Some(v) = lookup("OPENROUTER_REFERER") {
            self.llm.referer = v;
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and makes sure the DB file exists before
/// connecting, so filesystem problems surface with a clear message. A single batch run
/// only ever needs one writer, so the pool stays small.
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
