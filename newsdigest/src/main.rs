/*
newsdigest - main.rs
Runs the collection pipeline once: fetch every configured source, store new items,
then write the daily digest when an LLM key is available.
*/

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsdigest::collectors::{Collector, GoogleAiCollector, OpenAiNewsCollector, RssFeedCollector};
use newsdigest::digest::Digester;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::pipeline::{DigestStage, Pipeline};
use newsdigest::scraping::ArticleReader;
use newsdigest::Store;

#[derive(Parser, Debug)]
#[command(name = "newsdigest", about = "Collect AI news, store new items and write the daily digest")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip digest generation for this run
    #[arg(long)]
    no_digest: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win
    dotenv::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let store = match Store::open(&config.database.path).await {
        Ok(store) => store,
        Err(e) => {
            error!(%e, db_path = %config.database.path, "failed to open item store");
            return Err(e);
        }
    };
    info!(db_path = %config.database.path, "item store ready");

    let mut pipeline = Pipeline::new(build_collectors(&config)?, store);

    if args.no_digest {
        info!("Digest disabled via CLI (--no-digest)");
    } else if !config.digest.enabled {
        info!("Digest disabled in configuration");
    } else if let Some(stage) = build_digest_stage(&config)? {
        pipeline = pipeline.with_digest(stage);
    }

    let report = pipeline.run(Local::now().date_naive()).await?;

    for source in &report.per_source {
        println!("[{}] {} items", source.source, source.fetched);
    }
    println!(
        "Fetched {} items in total, {} new.",
        report.fetched, report.inserted
    );
    if !report.failed_sources.is_empty() {
        println!("Failed sources: {}", report.failed_sources.join(", "));
    }
    if let Some(path) = &report.digest_path {
        println!("Daily digest written to {}", path.display());
    }

    Ok(())
}

/// `config.default.toml`, then `config.toml` or `--config`, then environment overrides.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let mut config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

/// The static list of sources for a run.
fn build_collectors(config: &Config) -> Result<Vec<Box<dyn Collector>>> {
    let mut collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(OpenAiNewsCollector::new(&config.collection)?),
        Box::new(GoogleAiCollector::new()),
    ];
    for feed in &config.feeds {
        collectors.push(Box::new(
            RssFeedCollector::new(feed.name.clone(), &feed.url, &config.collection)
                .with_context(|| format!("invalid [[feeds]] entry {:?}", feed.name))?,
        ));
    }
    Ok(collectors)
}

/// `None` when the API key is not available; the run then only collects.
fn build_digest_stage(config: &Config) -> Result<Option<DigestStage>> {
    let llm = &config.llm;
    let api_key = match std::env::var(&llm.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!("{} is not set, skipping digest generation", llm.api_key_env);
            return Ok(None);
        }
    };

    let provider = RemoteLlmProvider::new(llm.api_url.clone(), api_key, llm.model.clone())
        .with_defaults(llm.timeout_seconds, llm.max_tokens, llm.temperature)
        .with_header("HTTP-Referer", llm.referer.clone())
        .with_header("X-Title", llm.title.clone());
    info!("Digest LLM provider initialized: {}", provider.model());

    let reader = ArticleReader::new(
        config.collection.timeout_seconds,
        config.digest.article_char_limit,
        config.digest.reader_proxy_url.clone(),
    )?;

    Ok(Some(DigestStage {
        digester: Digester::new(Arc::new(provider), reader, &config.digest),
        output_dir: PathBuf::from(&config.digest.output_dir),
        max_stories: config.digest.max_stories,
    }))
}
