//! Transformation cache.
//!
//! The cache-aside integrator talks to the [`ContentCache`] trait; the
//! bundled implementation is a local SQLite store. The cache is a best-effort
//! side channel: every failure here is logged and absorbed, never surfaced to
//! the exchange being served.
//!
//! The key is derived from the *raw* show-directive text, not the parsed
//! command, so textual variants of the same logical command cache
//! independently. That mirrors the upstream behavior on purpose.

use crate::command::ContentKind;
use crate::constants::{CACHE_PRAGMAS, CACHE_RETENTION_DAYS};
use crate::types::{LatencyMs, RefractError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

pub type CachePool = SqlitePool;

// Matches sqlite's datetime() text form so retention comparisons work.
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata stored alongside a cached body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub status_code: u16,
    pub content_type: ContentKind,
    pub elapsed: LatencyMs,
    pub stored_at: DateTime<Utc>,
    pub show_value: String,
}

#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub body: String,
    pub metadata: CacheMetadata,
}

/// Deterministic digest of (target URL, raw show value).
pub fn cache_key(target_url: &str, show_value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target_url.as_bytes());
    hasher.update([0u8]);
    hasher.update(show_value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get(&self, target_url: &str, show_value: &str) -> Result<Option<CachedEntry>>;

    async fn put(
        &self,
        target_url: &str,
        show_value: &str,
        body: &str,
        metadata: &CacheMetadata,
    ) -> Result<()>;
}

pub struct SqliteContentCache {
    pool: CachePool,
}

impl SqliteContentCache {
    pub async fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = match path.as_ref().to_str() {
            Some(s) => s,
            None => {
                return Err(RefractError::Config(
                    "Invalid cache path: non-UTF8 characters".to_string(),
                )
                .into())
            }
        };
        let url = format!("sqlite:{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(RefractError::CacheStore)?;

        for pragma in CACHE_PRAGMAS {
            sqlx::query(pragma)
                .execute(&pool)
                .await
                .map_err(RefractError::CacheStore)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transformations (
                cache_key    TEXT PRIMARY KEY,
                target_url   TEXT NOT NULL,
                show_value   TEXT NOT NULL,
                body         TEXT NOT NULL,
                status_code  INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                elapsed_ms   INTEGER NOT NULL,
                stored_at    TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RefractError::CacheStore)?;

        if let Err(e) = cleanup_old_entries(&pool, CACHE_RETENTION_DAYS).await {
            tracing::warn!("[CACHE] Startup cleanup failed: {}", e);
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &CachePool {
        &self.pool
    }
}

#[async_trait]
impl ContentCache for SqliteContentCache {
    async fn get(&self, target_url: &str, show_value: &str) -> Result<Option<CachedEntry>> {
        let key = cache_key(target_url, show_value);
        let row = sqlx::query(
            "SELECT body, status_code, content_type, elapsed_ms, stored_at, show_value
             FROM transformations WHERE cache_key = ?1",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(RefractError::CacheStore)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_at: String = row.get(4);
        let stored_at = chrono::NaiveDateTime::parse_from_str(&stored_at, SQLITE_DATETIME_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now());
        let content_type: String = row.get(2);
        let elapsed_ms: i64 = row.get(3);
        let status_code: i64 = row.get(1);

        Ok(Some(CachedEntry {
            body: row.get(0),
            metadata: CacheMetadata {
                status_code: status_code as u16,
                content_type: ContentKind::from_mime(&content_type),
                elapsed: LatencyMs(elapsed_ms as u128),
                stored_at,
                show_value: row.get(5),
            },
        }))
    }

    async fn put(
        &self,
        target_url: &str,
        show_value: &str,
        body: &str,
        metadata: &CacheMetadata,
    ) -> Result<()> {
        let key = cache_key(target_url, show_value);
        sqlx::query(
            "INSERT OR REPLACE INTO transformations
             (cache_key, target_url, show_value, body, status_code, content_type, elapsed_ms, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&key)
        .bind(target_url)
        .bind(show_value)
        .bind(body)
        .bind(metadata.status_code as i64)
        .bind(metadata.content_type.as_mime())
        .bind(metadata.elapsed.0 as i64)
        .bind(metadata.stored_at.format(SQLITE_DATETIME_FORMAT).to_string())
        .execute(&self.pool)
        .await
        .map_err(RefractError::CacheStore)?;
        Ok(())
    }
}

pub async fn cleanup_old_entries(
    pool: &CachePool,
    retention_days: i64,
) -> std::result::Result<u64, sqlx::Error> {
    let threshold = format!("-{} days", retention_days);
    let deleted = sqlx::query("DELETE FROM transformations WHERE stored_at < datetime('now', ?)")
        .bind(&threshold)
        .execute(pool)
        .await?;

    if deleted.rows_affected() > 0 {
        tracing::info!(
            "[CACHE] Cleanup removed {} entries older than {} days",
            deleted.rows_affected(),
            retention_days
        );
    }
    Ok(deleted.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(show_value: &str) -> CacheMetadata {
        CacheMetadata {
            status_code: 200,
            content_type: ContentKind::Html,
            elapsed: LatencyMs(42),
            stored_at: Utc::now(),
            show_value: show_value.to_string(),
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        assert_eq!(
            cache_key("http://example.com/", "url-to-html"),
            cache_key("http://example.com/", "url-to-html")
        );
    }

    #[test]
    fn test_cache_key_separates_textual_variants() {
        // Same parsed command, different raw text: intentionally distinct.
        assert_ne!(
            cache_key("http://example.com/", "url-to-html-min-rating"),
            cache_key("http://example.com/", "url-to-html-min-rating:0.5")
        );
    }

    #[test]
    fn test_cache_key_no_separator_collision() {
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteContentCache::init(dir.path().join("cache.db"))
            .await
            .unwrap();

        let meta = metadata("url-to-html");
        cache
            .put("http://example.com/", "url-to-html", "<html>x</html>", &meta)
            .await
            .unwrap();

        let entry = cache
            .get("http://example.com/", "url-to-html")
            .await
            .unwrap()
            .expect("entry should exist");
        assert_eq!(entry.body, "<html>x</html>");
        assert_eq!(entry.metadata.status_code, 200);
        assert_eq!(entry.metadata.content_type, ContentKind::Html);
        assert_eq!(entry.metadata.show_value, "url-to-html");
    }

    #[tokio::test]
    async fn test_sqlite_miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteContentCache::init(dir.path().join("cache.db"))
            .await
            .unwrap();
        assert!(cache
            .get("http://example.com/", "url-to-html")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sqlite_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteContentCache::init(dir.path().join("cache.db"))
            .await
            .unwrap();

        let meta = metadata("url-to-html");
        cache
            .put("http://example.com/", "url-to-html", "first", &meta)
            .await
            .unwrap();
        cache
            .put("http://example.com/", "url-to-html", "second", &meta)
            .await
            .unwrap();

        let entry = cache
            .get("http://example.com/", "url-to-html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.body, "second");
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteContentCache::init(dir.path().join("cache.db"))
            .await
            .unwrap();

        let meta = metadata("url-to-html");
        cache
            .put("http://example.com/", "url-to-html", "body", &meta)
            .await
            .unwrap();
        let removed = cleanup_old_entries(cache.pool(), CACHE_RETENTION_DAYS)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
