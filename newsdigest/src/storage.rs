use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::model::{NewsItem, StoredItem};
use crate::timestamp::{format_timestamp, try_parse_timestamp};

/// The single table of the store. Kept byte-for-byte compatible with existing databases.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url TEXT UNIQUE NOT NULL,
    published_at TEXT NOT NULL,
    source TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQLite-backed item store, deduplicating on `url`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct NewsItemRow {
    id: i64,
    title: String,
    url: String,
    published_at: String,
    source: String,
    created_at: String,
}

impl Store {
    /// Open (creating if needed) the database file and ensure the schema exists.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = common::init_db_pool(path).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        // every connection to ":memory:" is a separate database, so pin exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory sqlite database")?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create news_items table")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert every item whose `url` is not stored yet and return how many were new.
    ///
    /// Duplicates are skipped silently. A malformed item is logged and skipped without
    /// aborting the rest of the batch. Only failing to open or commit the transaction
    /// is an error.
    pub async fn save_items(&self, items: &[NewsItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let mut inserted = 0;
        let mut duplicates = 0;
        let mut rejected = 0;

        for item in items {
            if let Err(e) = validate(item) {
                error!("Error saving item {:?}: {:#}", item.title, e);
                rejected += 1;
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO news_items (title, url, published_at, source)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&item.title)
            .bind(&item.url)
            .bind(format_timestamp(&item.published_at))
            .bind(&item.source)
            .execute(&mut tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() > 0 => inserted += 1,
                Ok(_) => {
                    debug!("Skipping already stored url {}", item.url);
                    duplicates += 1;
                }
                Err(e) => {
                    error!("Error saving item {:?}: {}", item.title, e);
                    rejected += 1;
                }
            }
        }

        tx.commit().await.context("failed to commit news items")?;
        info!(
            "Saved {} new items ({} duplicates, {} rejected) out of {}",
            inserted,
            duplicates,
            rejected,
            items.len()
        );
        Ok(inserted)
    }

    /// Up to `limit` items, newest `published_at` first; ties go to the latest insertion.
    pub async fn get_recent_items(&self, limit: usize) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query_as::<_, NewsItemRow>(
            r#"
            SELECT id, title, url, published_at, source,
                   CAST(created_at AS TEXT) AS created_at
            FROM news_items
            ORDER BY published_at DESC, created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("failed to query recent news items")?;

        Ok(rows.into_iter().filter_map(into_stored).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news_items")
            .fetch_one(&self.pool)
            .await
            .context("failed to count news items")
    }
}

fn validate(item: &NewsItem) -> Result<()> {
    if item.title.trim().is_empty() {
        anyhow::bail!("missing title");
    }
    if item.source.trim().is_empty() {
        anyhow::bail!("missing source");
    }
    let url = Url::parse(&item.url).with_context(|| format!("url is not absolute: {:?}", item.url))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("url is not a web address: {}", item.url);
    }
    Ok(())
}

fn into_stored(row: NewsItemRow) -> Option<StoredItem> {
    let Some(published_at) = try_parse_timestamp(&row.published_at) else {
        warn!("Ignoring row {} with unreadable published_at {:?}", row.id, row.published_at);
        return None;
    };
    Some(StoredItem {
        id: row.id,
        title: row.title,
        url: row.url,
        published_at,
        source: row.source,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn item(n: i64) -> NewsItem {
        NewsItem::new(
            format!("Story {n}"),
            format!("https://example.com/news/{n}"),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(n),
            "Example",
        )
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.save_items(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicates_are_ignored() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.save_items(&[item(1), item(2)]).await.unwrap(), 2);

        let mut again = item(1);
        again.title = "Same url, new title".to_string();
        assert_eq!(store.save_items(&[again, item(3)]).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 3);

        let stored = store.get_recent_items(10).await.unwrap();
        let first = stored.iter().find(|s| s.url.ends_with("/1")).unwrap();
        assert_eq!(first.title, "Story 1");
    }

    #[tokio::test]
    async fn duplicates_within_one_batch_insert_once() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.save_items(&[item(1), item(1)]).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_item_does_not_abort_batch() {
        let store = Store::in_memory().await.unwrap();
        let mut untitled = item(2);
        untitled.title = "  ".to_string();
        let mut relative = item(3);
        relative.url = "/news/3".to_string();

        let inserted = store
            .save_items(&[item(1), untitled, relative, item(4)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn round_trip_preserves_fields() {
        let store = Store::in_memory().await.unwrap();
        let original = NewsItem::new(
            "AI Research Breakthrough",
            "https://example.com/ai-research",
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            "AI Research News",
        )
        .with_description("not persisted");
        store.save_items(&[original.clone()]).await.unwrap();

        let stored = store.get_recent_items(1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, original.title);
        assert_eq!(stored[0].url, original.url);
        assert_eq!(stored[0].source, original.source);
        assert_eq!(stored[0].published_at, original.published_at);
        assert!(!stored[0].created_at.is_empty());
    }

    #[tokio::test]
    async fn recent_items_are_newest_first_and_limited() {
        let store = Store::in_memory().await.unwrap();
        // inserted in scrambled order
        let batch: Vec<NewsItem> = [3, 9, 1, 10, 5, 7, 2, 8, 4, 6].into_iter().map(item).collect();
        assert_eq!(store.save_items(&batch).await.unwrap(), 10);

        let recent = store.get_recent_items(5).await.unwrap();
        let titles: Vec<&str> = recent.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Story 10", "Story 9", "Story 8", "Story 7", "Story 6"]);
    }

    #[tokio::test]
    async fn equal_dates_prefer_latest_insertion() {
        let store = Store::in_memory().await.unwrap();
        let mut a = item(1);
        let mut b = item(1);
        a.url = "https://example.com/a".to_string();
        b.url = "https://example.com/b".to_string();
        store.save_items(&[a]).await.unwrap();
        store.save_items(&[b]).await.unwrap();

        let recent = store.get_recent_items(2).await.unwrap();
        assert_eq!(recent[0].url, "https://example.com/b");
        assert_eq!(recent[1].url, "https://example.com/a");
    }

    #[tokio::test]
    async fn schema_matches_expected_columns() {
        let store = Store::in_memory().await.unwrap();
        let columns: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT name, type, \"notnull\" FROM pragma_table_info('news_items') ORDER BY cid")
                .fetch_all(store.pool())
                .await
                .unwrap();
        let expected = [
            ("id", "INTEGER", 0),
            ("title", "TEXT", 1),
            ("url", "TEXT", 1),
            ("published_at", "TEXT", 1),
            ("source", "TEXT", 1),
            ("created_at", "TIMESTAMP", 0),
        ];
        assert_eq!(columns.len(), expected.len());
        for ((name, ty, notnull), (en, et, enn)) in columns.iter().zip(expected) {
            assert_eq!((name.as_str(), ty.as_str(), *notnull), (en, et, enn));
        }
    }

    #[tokio::test]
    async fn on_disk_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.sqlite3");
        let path = path.to_string_lossy().to_string();

        let store = Store::open(&path).await.unwrap();
        store.save_items(&[item(1)]).await.unwrap();
        store.pool().close().await;

        let reopened = Store::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert_eq!(reopened.save_items(&[item(1)]).await.unwrap(), 0);
    }
}
