// ABOUTME: Durable key-value store for typed, expiring cache records (§A Durable KV Store)
// ABOUTME: SQLite-backed implementation consumed as an opaque durable map by the unified cache
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Durable persistence for cache entries.
//!
//! The store is consumed as an opaque, class-tagged, expiry-aware map. It never interprets
//! payload bytes; callers (the unified cache) own serialization. A single heartbeat timestamp
//! lets the warmup controller distinguish a short restart blip from a long outage.

pub mod envelope;
mod sqlite;

pub use sqlite::SqliteKvStore;

use crate::errors::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A durable record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Primary key, unique across all classes.
    pub key: String,
    /// Entity class tag (`"member"`, `"guild"`, `"roles"`, `"channel"`).
    pub class: String,
    /// Opaque, self-describing serialized payload.
    pub payload: Vec<u8>,
    /// Absolute expiry time.
    pub expires_at: DateTime<Utc>,
    /// Time the row was last written.
    pub cached_at: DateTime<Utc>,
}

/// Durable, typed, expiring key-value persistence (§4.A).
///
/// All operations are atomic per-call; concurrent readers never observe a torn write. A
/// failure here must never corrupt in-memory cache state — callers treat store errors as
/// best-effort and log-and-continue rather than propagate into the hot path.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Idempotent last-write-wins upsert.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    async fn upsert(
        &self,
        key: &str,
        class: &str,
        payload: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Fetch a single record by key, regardless of expiry.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn get(&self, key: &str) -> CoreResult<Option<Record>>;

    /// Fetch every non-expired record tagged with `class`.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn get_by_class(&self, class: &str, now: DateTime<Utc>) -> CoreResult<Vec<Record>>;

    /// Delete a single record by key.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    async fn delete(&self, key: &str) -> CoreResult<()>;

    /// Delete every record of `class` whose key starts with `key_prefix`. Used for
    /// guild-scoped purges (e.g. all member keys for a departed guild).
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    async fn delete_by_class_prefix(&self, class: &str, key_prefix: &str) -> CoreResult<u64>;

    /// Remove every record whose `expires_at <= now`. Returns the number of rows removed.
    ///
    /// # Errors
    /// Returns an error if the sweep fails.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<u64>;

    /// Read the persisted heartbeat, if any has ever been written.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    async fn get_heartbeat(&self) -> CoreResult<Option<DateTime<Utc>>>;

    /// Persist a fresh heartbeat timestamp.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    async fn set_heartbeat(&self, ts: DateTime<Utc>) -> CoreResult<()>;

    /// Verify the store backend is reachable and writable.
    ///
    /// # Errors
    /// Returns an error if the health check fails.
    async fn health_check(&self) -> CoreResult<()>;
}
