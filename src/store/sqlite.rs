// ABOUTME: SQLite-backed implementation of the durable key-value store contract
// ABOUTME: Owns the connection pool, schema migration, and lock-retry policy for writes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{KvStore, Record};
use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// SQLite-backed [`KvStore`].
///
/// Uses a single connection pool; SQLite serializes writes internally, matching the "must
/// serialize writes internally" guarantee required of the store.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (creating if necessary) the SQLite database at `path` and run migrations.
    ///
    /// # Errors
    /// Returns an error if the connection or migration fails.
    pub async fn new(path: &str) -> CoreResult<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_owned()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| CoreError::store(format!("failed to open store at {path}: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store, primarily for tests.
    ///
    /// A single pooled connection is used deliberately: SQLite's `:memory:` database is
    /// private to the connection that created it, so a multi-connection pool would see an
    /// empty database on every other checkout.
    ///
    /// # Errors
    /// Returns an error if the connection or migration fails.
    pub async fn in_memory() -> CoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CoreError::store(format!("failed to open in-memory store: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                class TEXT NOT NULL,
                payload_bytes BLOB NOT NULL,
                expires_at INTEGER NOT NULL,
                cached_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_class ON records(class)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_expires_at ON records(expires_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS heartbeat (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                ts INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Retry a store operation on transient SQLite lock contention.
///
/// Exponential backoff: 10ms, 20ms, 40ms, 80ms, 160ms. Non-retryable errors (constraint
/// violations, corrupt rows) propagate immediately.
async fn retry_on_lock<F, Fut, T>(mut f: F, max_retries: u32) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempts = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                let retryable = e.message.to_lowercase().contains("locked")
                    || e.message.to_lowercase().contains("busy");
                if attempts >= max_retries || !retryable {
                    return Err(e);
                }
                let backoff_ms = 10 * (1_u64 << attempts);
                warn!(
                    attempt = attempts,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "store operation hit lock contention, retrying"
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

fn to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_timestamp(ts: i64) -> CoreResult<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| CoreError::store(format!("invalid stored timestamp: {ts}")))
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn upsert(
        &self,
        key: &str,
        class: &str,
        payload: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let now = to_timestamp(Utc::now());
        let expires_ts = to_timestamp(expires_at);

        retry_on_lock(
            || {
                let pool = self.pool.clone();
                let key = key.to_owned();
                let class = class.to_owned();
                let payload = payload.clone();
                async move {
                    sqlx::query(
                        "INSERT INTO records (key, class, payload_bytes, expires_at, cached_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(key) DO UPDATE SET
                            class = excluded.class,
                            payload_bytes = excluded.payload_bytes,
                            expires_at = excluded.expires_at,
                            cached_at = excluded.cached_at",
                    )
                    .bind(&key)
                    .bind(&class)
                    .bind(&payload)
                    .bind(expires_ts)
                    .bind(now)
                    .execute(&pool)
                    .await
                    .map_err(CoreError::from)?;
                    Ok(())
                }
            },
            5,
        )
        .await
    }

    async fn get(&self, key: &str) -> CoreResult<Option<Record>> {
        let row = sqlx::query(
            "SELECT key, class, payload_bytes, expires_at, cached_at FROM records WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Record {
                key: row.try_get("key")?,
                class: row.try_get("class")?,
                payload: row.try_get("payload_bytes")?,
                expires_at: from_timestamp(row.try_get("expires_at")?)?,
                cached_at: from_timestamp(row.try_get("cached_at")?)?,
            })
        })
        .transpose()
    }

    async fn get_by_class(&self, class: &str, now: DateTime<Utc>) -> CoreResult<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT key, class, payload_bytes, expires_at, cached_at FROM records
             WHERE class = ?1 AND expires_at > ?2",
        )
        .bind(class)
        .bind(to_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let expires_at = match from_timestamp(row.try_get("expires_at")?) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "skipping corrupt durable row during class load");
                    continue;
                }
            };
            records.push(Record {
                key: row.try_get("key")?,
                class: row.try_get("class")?,
                payload: row.try_get("payload_bytes")?,
                expires_at,
                cached_at: from_timestamp(row.try_get("cached_at")?)?,
            });
        }
        Ok(records)
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM records WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_class_prefix(&self, class: &str, key_prefix: &str) -> CoreResult<u64> {
        let pattern = format!("{}%", key_prefix.replace('%', "\\%").replace('_', "\\_"));
        let result = sqlx::query(
            "DELETE FROM records WHERE class = ?1 AND key LIKE ?2 ESCAPE '\\'",
        )
        .bind(class)
        .bind(pattern)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE expires_at <= ?1")
            .bind(to_timestamp(now))
            .execute(&self.pool)
            .await?;
        debug!(rows = result.rows_affected(), "swept expired durable records");
        Ok(result.rows_affected())
    }

    async fn get_heartbeat(&self) -> CoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT ts FROM heartbeat WHERE id = 0")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| from_timestamp(row.try_get("ts")?)).transpose()
    }

    async fn set_heartbeat(&self, ts: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO heartbeat (id, ts) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET ts = excluded.ts",
        )
        .bind(to_timestamp(ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        let expires = Utc::now() + chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();
        store
            .upsert("guild:1:member:2", "member", b"payload".to_vec(), expires)
            .await
            .unwrap();

        let record = store.get("guild:1:member:2").await.unwrap().unwrap();
        assert_eq!(record.payload, b"payload");
        assert_eq!(record.class, "member");
    }

    #[tokio::test]
    async fn get_by_class_excludes_expired() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        let past = Utc::now() - chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();
        let future = Utc::now() + chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();

        store.upsert("k1", "member", b"a".to_vec(), past).await.unwrap();
        store.upsert("k2", "member", b"b".to_vec(), future).await.unwrap();

        let live = store.get_by_class("member", Utc::now()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, "k2");
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_expired_rows() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        let past = Utc::now() - chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();
        let future = Utc::now() + chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();

        store.upsert("expired", "guild", b"a".to_vec(), past).await.unwrap();
        store.upsert("fresh", "guild", b"b".to_vec(), future).await.unwrap();

        let removed = store.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("expired").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_by_class_prefix_scopes_to_guild() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        let future = Utc::now() + chrono::Duration::from_std(StdDuration::from_secs(60)).unwrap();
        store
            .upsert("1:100", "member", b"a".to_vec(), future)
            .await
            .unwrap();
        store
            .upsert("1:200", "member", b"b".to_vec(), future)
            .await
            .unwrap();
        store
            .upsert("2:300", "member", b"c".to_vec(), future)
            .await
            .unwrap();

        let removed = store.delete_by_class_prefix("member", "1:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("2:300").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn heartbeat_round_trips() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        assert!(store.get_heartbeat().await.unwrap().is_none());

        let now = Utc::now();
        store.set_heartbeat(now).await.unwrap();
        let read_back = store.get_heartbeat().await.unwrap().unwrap();
        assert_eq!(read_back.timestamp(), now.timestamp());
    }
}
