// ABOUTME: Unified in-memory cache across the four entity classes with persistence hooks (§4.B)
// ABOUTME: Composes one ClassCache per class and owns the background cleaner and persist loop
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::class::{ClassCache, ClassStats};
use super::types::{ChannelRecord, GuildRecord, MemberRecord, RoleRecord};
use super::CacheClass;
use crate::config::BotConfig;
use crate::errors::CoreResult;
use crate::logging::GuildLogger;
use crate::store::KvStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The four entity classes' store-facing tags, sourced from [`CacheClass`] so the durable
/// store's `class` column and every class-scoped key/log field agree on one spelling.
const CLASS_MEMBER: &str = CacheClass::Member.as_str();
const CLASS_GUILD: &str = CacheClass::Guild.as_str();
const CLASS_ROLES: &str = CacheClass::Roles.as_str();
const CLASS_CHANNEL: &str = CacheClass::Channel.as_str();

fn member_key(guild_id: u64, user_id: u64) -> String {
    format!("{guild_id}:{user_id}")
}

fn guild_key(guild_id: u64) -> String {
    guild_id.to_string()
}

fn channel_key(channel_id: u64) -> String {
    channel_id.to_string()
}

/// The durable store's primary key is a single `key` column shared across all classes (§6
/// logical schema). Guild and roles records would otherwise collide under the same bare
/// guild ID, so every store-facing key is namespaced by class; the in-memory `ClassCache`
/// keys are unaffected since each class already has its own map. Used directly by the
/// warmup controller's silent-refresh phase, which writes member rows straight to the store.
pub(crate) fn storage_key(class: &str, key: &str) -> String {
    format!("{class}:{key}")
}

/// Recover the original cache key from a class-namespaced storage key.
fn cache_key_from_storage(class: &str, storage_key: &str) -> String {
    storage_key
        .strip_prefix(&format!("{class}:"))
        .unwrap_or(storage_key)
        .to_string()
}

/// Aggregate observable metrics across all four classes (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedCacheStats {
    /// Member class metrics.
    pub member: ClassStats,
    /// Guild class metrics.
    pub guild: ClassStats,
    /// Roles class metrics.
    pub roles: ClassStats,
    /// Channel class metrics.
    pub channel: ClassStats,
}

/// Handle returned by [`UnifiedCache::set_persist_interval`]; dropping it, or calling
/// [`PersistLoopHandle::stop`], ends the background persist loop.
pub struct PersistLoopHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl PersistLoopHandle {
    /// Stop the background persist loop.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// The authoritative in-memory lookup surface for member, guild, roles, and channel records.
///
/// Each class has its own lock; there is no global cache lock (§5). Background tasks — the
/// expiry sweeper and the optional periodic persist loop — hold only `Arc` clones of the
/// underlying store and class caches, never `&UnifiedCache` itself, so they outlive any
/// particular call into this struct.
pub struct UnifiedCache {
    members: Arc<ClassCache<MemberRecord>>,
    guilds: Arc<ClassCache<GuildRecord>>,
    roles: Arc<ClassCache<Vec<RoleRecord>>>,
    channels: Arc<ClassCache<ChannelRecord>>,
    store: Arc<dyn KvStore>,
    config: BotConfig,
    cleanup_shutdown: Option<mpsc::Sender<()>>,
}

impl UnifiedCache {
    /// Construct a unified cache from configuration, backed by `store` for persistence.
    /// Spawns the background expiry cleaner unless `config.cache.cleanup_interval` is zero.
    #[must_use]
    pub fn new(config: BotConfig, store: Arc<dyn KvStore>) -> Self {
        let members = Arc::new(ClassCache::new(config.cache.max_members));
        let guilds = Arc::new(ClassCache::new(config.cache.max_guilds));
        let roles = Arc::new(ClassCache::new(config.cache.max_roles));
        let channels = Arc::new(ClassCache::new(config.cache.max_channels));

        let cleanup_shutdown = if config.cache.cleanup_interval.is_zero() {
            None
        } else {
            Some(Self::spawn_cleaner(
                config.cache.cleanup_interval,
                Arc::clone(&members),
                Arc::clone(&guilds),
                Arc::clone(&roles),
                Arc::clone(&channels),
            ))
        };

        Self {
            members,
            guilds,
            roles,
            channels,
            store,
            config,
            cleanup_shutdown,
        }
    }

    fn spawn_cleaner(
        interval: Duration,
        members: Arc<ClassCache<MemberRecord>>,
        guilds: Arc<ClassCache<GuildRecord>>,
        roles: Arc<ClassCache<Vec<RoleRecord>>>,
        channels: Arc<ClassCache<ChannelRecord>>,
    ) -> mpsc::Sender<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        let removed = members.sweep_expired(now).await
                            + guilds.sweep_expired(now).await
                            + roles.sweep_expired(now).await
                            + channels.sweep_expired(now).await;
                        if removed > 0 {
                            debug!(removed, "cache cleanup swept expired entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("cache cleanup task received shutdown signal");
                        break;
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Start a background task that calls [`Self::persist`] every `interval`. Returns a
    /// handle that stops the loop when dropped or explicitly told to `stop()`.
    pub fn set_persist_interval(self: &Arc<Self>, interval: Duration) -> PersistLoopHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.persist().await {
                            warn!(error = %e, "periodic cache persist failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("cache persist loop received shutdown signal");
                        break;
                    }
                }
            }
        });

        PersistLoopHandle { shutdown_tx }
    }

    // -- Member class --------------------------------------------------

    /// Look up a cached member.
    pub async fn get_member(&self, guild_id: u64, user_id: u64) -> Option<MemberRecord> {
        let key = member_key(guild_id, user_id);
        let hit = self.members.get(&key).await;
        GuildLogger::log_cache_lookup(CLASS_MEMBER, &key, hit.is_some());
        hit
    }

    /// Cache a member, honoring any per-guild TTL override.
    pub async fn set_member(&self, record: MemberRecord) {
        let key = member_key(record.guild_id, record.user_id);
        let ttl = self.config.member_ttl_for(record.guild_id);
        self.members.set(key, record, ttl).await;
    }

    /// Invalidate a single member, both in memory and in the durable store.
    pub async fn invalidate_member(&self, guild_id: u64, user_id: u64) {
        let key = member_key(guild_id, user_id);
        self.members.invalidate(&key).await;
        if let Err(e) = self.store.delete(&storage_key(CLASS_MEMBER, &key)).await {
            warn!(error = %e, class = CLASS_MEMBER, "failed to purge invalidated member from store");
        }
    }

    // -- Guild class ----------------------------------------------------

    /// Look up a cached guild record.
    pub async fn get_guild(&self, guild_id: u64) -> Option<GuildRecord> {
        let key = guild_key(guild_id);
        let hit = self.guilds.get(&key).await;
        GuildLogger::log_cache_lookup(CLASS_GUILD, &key, hit.is_some());
        hit
    }

    /// Cache a guild record, honoring any per-guild TTL override.
    pub async fn set_guild(&self, record: GuildRecord) {
        let key = guild_key(record.guild_id);
        let ttl = self.config.guild_ttl_for(record.guild_id);
        self.guilds.set(key, record, ttl).await;
    }

    /// Invalidate a single guild record, both in memory and in the durable store.
    pub async fn invalidate_guild_record(&self, guild_id: u64) {
        let key = guild_key(guild_id);
        self.guilds.invalidate(&key).await;
        if let Err(e) = self.store.delete(&storage_key(CLASS_GUILD, &key)).await {
            warn!(error = %e, class = CLASS_GUILD, "failed to purge invalidated guild from store");
        }
    }

    // -- Roles class ------------------------------------------------------

    /// Look up a guild's cached, ordered role list.
    pub async fn get_roles(&self, guild_id: u64) -> Option<Vec<RoleRecord>> {
        let key = guild_key(guild_id);
        let hit = self.roles.get(&key).await;
        GuildLogger::log_cache_lookup(CLASS_ROLES, &key, hit.is_some());
        hit
    }

    /// Cache a guild's ordered role list, honoring any per-guild TTL override.
    pub async fn set_roles(&self, guild_id: u64, roles: Vec<RoleRecord>) {
        let key = guild_key(guild_id);
        let ttl = self.config.roles_ttl_for(guild_id);
        self.roles.set(key, roles, ttl).await;
    }

    /// Invalidate a guild's role list, both in memory and in the durable store.
    pub async fn invalidate_roles(&self, guild_id: u64) {
        let key = guild_key(guild_id);
        self.roles.invalidate(&key).await;
        if let Err(e) = self.store.delete(&storage_key(CLASS_ROLES, &key)).await {
            warn!(error = %e, class = CLASS_ROLES, "failed to purge invalidated roles from store");
        }
    }

    // -- Channel class ----------------------------------------------------

    /// Look up a cached channel record.
    pub async fn get_channel(&self, channel_id: u64) -> Option<ChannelRecord> {
        let key = channel_key(channel_id);
        let hit = self.channels.get(&key).await;
        GuildLogger::log_cache_lookup(CLASS_CHANNEL, &key, hit.is_some());
        hit
    }

    /// Cache a channel record. Channel TTL overrides are keyed by the channel's guild.
    pub async fn set_channel(&self, record: ChannelRecord) {
        let key = channel_key(record.channel_id);
        let ttl = self.config.channel_ttl_for(record.guild_id);
        self.channels.set(key, record, ttl).await;
    }

    /// Invalidate a single channel record, both in memory and in the durable store.
    pub async fn invalidate_channel(&self, channel_id: u64) {
        let key = channel_key(channel_id);
        self.channels.invalidate(&key).await;
        if let Err(e) = self.store.delete(&storage_key(CLASS_CHANNEL, &key)).await {
            warn!(error = %e, class = CLASS_CHANNEL, "failed to purge invalidated channel from store");
        }
    }

    // -- Guild-scoped purge -----------------------------------------------

    /// Remove every member entry for `guild_id`, the guild record itself, and the guild's
    /// roles entry, both in memory and in the durable store (§4.B `InvalidateGuild`).
    pub async fn invalidate_guild(&self, guild_id: u64) {
        let prefix = format!("{guild_id}:");
        let guild_key = guild_key(guild_id);

        let members_removed = self.members.invalidate_prefix(&prefix).await;
        self.guilds.invalidate(&guild_key).await;
        self.roles.invalidate(&guild_key).await;

        if let Err(e) = self
            .store
            .delete_by_class_prefix(CLASS_MEMBER, &storage_key(CLASS_MEMBER, &prefix))
            .await
        {
            warn!(error = %e, guild_id, "failed to purge invalidated guild's members from store");
        }
        if let Err(e) = self.store.delete(&storage_key(CLASS_GUILD, &guild_key)).await {
            warn!(error = %e, guild_id, "failed to purge invalidated guild record from store");
        }
        if let Err(e) = self.store.delete(&storage_key(CLASS_ROLES, &guild_key)).await {
            warn!(error = %e, guild_id, "failed to purge invalidated guild's roles from store");
        }

        GuildLogger::log_guild_invalidate(guild_id, members_removed + 2);
    }

    /// Snapshot of observable metrics across all four classes.
    pub async fn stats(&self) -> UnifiedCacheStats {
        UnifiedCacheStats {
            member: self.members.stats().await,
            guild: self.guilds.stats().await,
            roles: self.roles.stats().await,
            channel: self.channels.stats().await,
        }
    }

    /// Serialize every non-expired entry across all classes to the durable store.
    ///
    /// Best-effort: a failure writing one class's entries does not stop the others, matching
    /// "failure of a persistence call never corrupts cache in-memory state" (§4.A).
    ///
    /// # Errors
    /// Returns the first error encountered, after attempting every class.
    pub async fn persist(&self) -> CoreResult<()> {
        if !self.config.cache.persist_enabled {
            return Ok(());
        }

        let mut first_error = None;

        if let Err(e) = self.persist_class(CLASS_MEMBER, self.members.snapshot_non_expired().await).await {
            warn!(class = CLASS_MEMBER, error = %e, "persist failed for class");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.persist_class(CLASS_GUILD, self.guilds.snapshot_non_expired().await).await {
            warn!(class = CLASS_GUILD, error = %e, "persist failed for class");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.persist_class(CLASS_ROLES, self.roles.snapshot_non_expired().await).await {
            warn!(class = CLASS_ROLES, error = %e, "persist failed for class");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.persist_class(CLASS_CHANNEL, self.channels.snapshot_non_expired().await).await {
            warn!(class = CLASS_CHANNEL, error = %e, "persist failed for class");
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn persist_class<T: serde::Serialize>(
        &self,
        class: &str,
        entries: Vec<(String, T, chrono::DateTime<Utc>)>,
    ) -> CoreResult<()> {
        for (key, payload, expires_at) in entries {
            let bytes = crate::store::envelope::wrap(&payload)?;
            self.store
                .upsert(&storage_key(class, &key), class, bytes, expires_at)
                .await?;
        }
        GuildLogger::log_store_operation("persist", true, None);
        Ok(())
    }

    /// Restore non-expired entries from the durable store, bypassing eviction (§4.B).
    ///
    /// Corrupt rows are skipped and counted rather than failing the whole load, matching
    /// "warmup continues past corrupt rows" (§7).
    ///
    /// # Errors
    /// Returns an error only if the store itself is unreachable.
    pub async fn load_from_store(&self) -> CoreResult<usize> {
        let now = Utc::now();
        let mut loaded = 0;
        let mut skipped = 0;

        for record in self.store.get_by_class(CLASS_MEMBER, now).await? {
            let key = cache_key_from_storage(CLASS_MEMBER, &record.key);
            match crate::store::envelope::unwrap::<MemberRecord>(&record.payload) {
                Ok(payload) => {
                    self.members.insert_bypass(key, payload, record.expires_at).await;
                    loaded += 1;
                }
                Err(_) => skipped += 1,
            }
        }
        for record in self.store.get_by_class(CLASS_GUILD, now).await? {
            let key = cache_key_from_storage(CLASS_GUILD, &record.key);
            match crate::store::envelope::unwrap::<GuildRecord>(&record.payload) {
                Ok(payload) => {
                    self.guilds.insert_bypass(key, payload, record.expires_at).await;
                    loaded += 1;
                }
                Err(_) => skipped += 1,
            }
        }
        for record in self.store.get_by_class(CLASS_ROLES, now).await? {
            let key = cache_key_from_storage(CLASS_ROLES, &record.key);
            match crate::store::envelope::unwrap::<Vec<RoleRecord>>(&record.payload) {
                Ok(payload) => {
                    self.roles.insert_bypass(key, payload, record.expires_at).await;
                    loaded += 1;
                }
                Err(_) => skipped += 1,
            }
        }
        for record in self.store.get_by_class(CLASS_CHANNEL, now).await? {
            let key = cache_key_from_storage(CLASS_CHANNEL, &record.key);
            match crate::store::envelope::unwrap::<ChannelRecord>(&record.payload) {
                Ok(payload) => {
                    self.channels.insert_bypass(key, payload, record.expires_at).await;
                    loaded += 1;
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "skipped corrupt durable rows during load_from_store");
        }
        debug!(loaded, skipped, "load_from_store complete");
        Ok(loaded)
    }
}
