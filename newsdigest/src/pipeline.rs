use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::collectors::Collector;
use crate::digest::{write_digest, DigestInput, Digester};
use crate::model::NewsItem;
use crate::storage::Store;

/// Digest generation settings for one run.
pub struct DigestStage {
    pub digester: Digester,
    pub output_dir: PathBuf,
    /// How many recent stored items are offered to the digester
    pub max_stories: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub fetched: usize,
    pub inserted: usize,
    pub per_source: Vec<SourceReport>,
    /// Collectors that returned an error this run
    pub failed_sources: Vec<String>,
    pub digest_path: Option<PathBuf>,
}

/// One batch run: collect from every source, store once, optionally digest.
pub struct Pipeline {
    collectors: Vec<Box<dyn Collector>>,
    store: Store,
    digest: Option<DigestStage>,
}

impl Pipeline {
    pub fn new(collectors: Vec<Box<dyn Collector>>, store: Store) -> Self {
        Self {
            collectors,
            store,
            digest: None,
        }
    }

    pub fn with_digest(mut self, stage: DigestStage) -> Self {
        self.digest = Some(stage);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run the pipeline once. Fails only when the store cannot be written.
    pub async fn run(&self, date: NaiveDate) -> Result<RunReport> {
        let mut report = RunReport::default();
        let items = self.collect(&mut report).await;

        report.inserted = self
            .store
            .save_items(&items)
            .await
            .context("failed to store collected items")?;
        info!(
            "Collected {} items in total, {} new",
            report.fetched, report.inserted
        );

        if let Some(stage) = &self.digest {
            report.digest_path = self.write_digest(stage, &items, date).await;
        }

        Ok(report)
    }

    async fn collect(&self, report: &mut RunReport) -> Vec<NewsItem> {
        let mut all = Vec::new();
        for collector in &self.collectors {
            let source = collector.source_name().to_string();
            match collector.fetch_items().await {
                Ok(items) => {
                    info!("[{}] {} items", source, items.len());
                    report.fetched += items.len();
                    report.per_source.push(SourceReport {
                        source,
                        fetched: items.len(),
                    });
                    all.extend(items);
                }
                Err(e) => {
                    error!("[{}] collector failed: {:#}", source, e);
                    report.per_source.push(SourceReport { source: source.clone(), fetched: 0 });
                    report.failed_sources.push(source);
                }
            }
        }
        all
    }

    /// Digest failures are logged; they never fail the run.
    async fn write_digest(&self, stage: &DigestStage, fetched: &[NewsItem], date: NaiveDate) -> Option<PathBuf> {
        let recent = match self.store.get_recent_items(stage.max_stories).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error reading recent items for digest: {:#}", e);
                return None;
            }
        };
        if recent.is_empty() {
            info!("No items found for digest generation.");
            return None;
        }

        // descriptions only exist for items seen during this run
        let descriptions: HashMap<&str, &str> = fetched
            .iter()
            .filter_map(|i| i.description.as_deref().map(|d| (i.url.as_str(), d)))
            .collect();
        let inputs = recent
            .iter()
            .map(|row| {
                let mut input = DigestInput::from(row);
                input.description = descriptions.get(row.url.as_str()).map(|d| d.to_string());
                input
            })
            .collect();

        let digest = match stage.digester.create_digest(inputs, date).await {
            Ok(digest) => digest,
            Err(e) => {
                error!("Error generating digest: {:#}", e);
                return None;
            }
        };

        match write_digest(&digest, &stage.output_dir).await {
            Ok(path) => {
                info!("Daily digest written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Error writing digest: {:#}", e);
                None
            }
        }
    }
}
