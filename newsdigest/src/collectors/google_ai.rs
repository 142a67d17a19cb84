use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::Collector;
use crate::model::NewsItem;

pub const SOURCE_NAME: &str = "Google AI RSS";

/// Placeholder for the Google AI blog feed. Registered so the pipeline reports it,
/// but it does not fetch anything yet.
#[derive(Debug, Default)]
pub struct GoogleAiCollector;

impl GoogleAiCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Collector for GoogleAiCollector {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_items(&self) -> Result<Vec<NewsItem>> {
        debug!("{}: collector not implemented yet, returning no items", SOURCE_NAME);
        Ok(Vec::new())
    }
}
