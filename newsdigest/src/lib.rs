// Library interface for newsdigest modules
// This allows tests and the binary to import modules

pub mod collectors;
pub mod digest;
pub mod ingestion;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod scraping;
pub mod storage;
pub mod timestamp;

pub use model::{NewsItem, StoredItem};
pub use pipeline::{Pipeline, RunReport};
pub use storage::Store;
