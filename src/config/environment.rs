// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management for production deployment.
//!
//! [`BotConfig`] is the read-only configuration surface consumed by the cache, warmup, and
//! router subsystems. It is built once at startup via [`BotConfig::from_env`] and shared by
//! reference; nothing in the CORE mutates it after load.

use crate::constants::env_config;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Per-class cache configuration (§4.B, §6 configuration surface).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL for member records.
    pub member_ttl: Duration,
    /// Default TTL for guild records.
    pub guild_ttl: Duration,
    /// Default TTL for the roles list.
    pub roles_ttl: Duration,
    /// Default TTL for channel records.
    pub channel_ttl: Duration,
    /// Max entries for the member class.
    pub max_members: usize,
    /// Max entries for the guild class.
    pub max_guilds: usize,
    /// Max entries for the roles class.
    pub max_roles: usize,
    /// Max entries for the channel class.
    pub max_channels: usize,
    /// Interval between background expired-entry sweeps.
    pub cleanup_interval: Duration,
    /// Interval between background persistence flushes.
    pub persist_interval: Duration,
    /// Whether background persistence is enabled at all.
    pub persist_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            member_ttl: Duration::from_secs(crate::constants::cache::DEFAULT_MEMBER_TTL_SECS),
            guild_ttl: Duration::from_secs(crate::constants::cache::DEFAULT_GUILD_TTL_SECS),
            roles_ttl: Duration::from_secs(crate::constants::cache::DEFAULT_ROLES_TTL_SECS),
            channel_ttl: Duration::from_secs(crate::constants::cache::DEFAULT_CHANNEL_TTL_SECS),
            max_members: crate::constants::cache::DEFAULT_MAX_MEMBERS,
            max_guilds: crate::constants::cache::DEFAULT_MAX_GUILDS,
            max_roles: crate::constants::cache::DEFAULT_MAX_ROLES,
            max_channels: crate::constants::cache::DEFAULT_MAX_CHANNELS,
            cleanup_interval: Duration::from_secs(
                crate::constants::cache::DEFAULT_CLEANUP_INTERVAL_SECS,
            ),
            persist_interval: Duration::from_secs(
                crate::constants::cache::DEFAULT_PERSIST_INTERVAL_SECS,
            ),
            persist_enabled: true,
        }
    }
}

fn load_cache_config() -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        member_ttl: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::MEMBER_TTL_SECS,
            defaults.member_ttl.as_secs(),
        )),
        guild_ttl: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::GUILD_TTL_SECS,
            defaults.guild_ttl.as_secs(),
        )),
        roles_ttl: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::ROLES_TTL_SECS,
            defaults.roles_ttl.as_secs(),
        )),
        channel_ttl: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::CHANNEL_TTL_SECS,
            defaults.channel_ttl.as_secs(),
        )),
        max_members: crate::constants::env_var_parsed(env_config::MAX_MEMBERS, defaults.max_members),
        max_guilds: crate::constants::env_var_parsed(env_config::MAX_GUILDS, defaults.max_guilds),
        max_roles: crate::constants::env_var_parsed(env_config::MAX_ROLES, defaults.max_roles),
        max_channels: crate::constants::env_var_parsed(
            env_config::MAX_CHANNELS,
            defaults.max_channels,
        ),
        cleanup_interval: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::CLEANUP_INTERVAL_SECS,
            defaults.cleanup_interval.as_secs(),
        )),
        persist_interval: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::PERSIST_INTERVAL_SECS,
            defaults.persist_interval.as_secs(),
        )),
        persist_enabled: env::var(env_config::PERSIST_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.persist_enabled),
    }
}

/// Warmup controller configuration (§4.D).
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Downtime below this threshold skips silent refresh.
    pub downtime_threshold: Duration,
    /// Cap on API-sourced gap fill per guild.
    pub max_members_per_guild: u32,
    /// Guild IDs to warm up at startup.
    pub guild_ids: Vec<u64>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            downtime_threshold: Duration::from_secs(
                crate::constants::warmup::DEFAULT_DOWNTIME_THRESHOLD_SECS,
            ),
            max_members_per_guild: crate::constants::warmup::DEFAULT_MAX_MEMBERS_PER_GUILD,
            guild_ids: Vec::new(),
        }
    }
}

fn load_warmup_config() -> WarmupConfig {
    let defaults = WarmupConfig::default();
    let guild_ids = env::var(env_config::WARMUP_GUILD_IDS)
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|s| s.trim().parse::<u64>().ok())
                .collect()
        })
        .unwrap_or_default();

    WarmupConfig {
        downtime_threshold: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::DOWNTIME_THRESHOLD_SECS,
            defaults.downtime_threshold.as_secs(),
        )),
        max_members_per_guild: crate::constants::env_var_parsed(
            env_config::MAX_MEMBERS_PER_GUILD,
            defaults.max_members_per_guild,
        ),
        guild_ids,
    }
}

/// Task router configuration (§4.E).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default max attempts for a task type when the adapter doesn't override it.
    pub per_type_max_attempts: u32,
    /// Base backoff delay before jitter.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Worker pool size per task type.
    pub workers: usize,
    /// Budget for draining in-flight work on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            per_type_max_attempts: crate::constants::router::DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(crate::constants::router::DEFAULT_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(crate::constants::router::DEFAULT_BACKOFF_CAP_MS),
            workers: crate::constants::router::DEFAULT_WORKERS_PER_TYPE,
            shutdown_timeout: Duration::from_secs(
                crate::constants::router::DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            ),
        }
    }
}

fn load_router_config() -> RouterConfig {
    let defaults = RouterConfig::default();
    RouterConfig {
        per_type_max_attempts: crate::constants::env_var_parsed(
            env_config::ROUTER_MAX_ATTEMPTS,
            defaults.per_type_max_attempts,
        ),
        backoff_base: Duration::from_millis(crate::constants::env_var_parsed(
            env_config::ROUTER_BACKOFF_BASE_MS,
            defaults.backoff_base.as_millis() as u64,
        )),
        backoff_cap: Duration::from_millis(crate::constants::env_var_parsed(
            env_config::ROUTER_BACKOFF_CAP_MS,
            defaults.backoff_cap.as_millis() as u64,
        )),
        workers: crate::constants::env_var_parsed(env_config::ROUTER_WORKERS, defaults.workers),
        shutdown_timeout: Duration::from_secs(crate::constants::env_var_parsed(
            env_config::ROUTER_SHUTDOWN_TIMEOUT_SECS,
            defaults.shutdown_timeout.as_secs(),
        )),
    }
}

/// Per-guild TTL overrides (§3 Data Model: "Per-guild TTL overrides ... shadow the default
/// TTL for that guild's entries at insertion time").
#[derive(Debug, Clone, Default)]
pub struct GuildCacheOverride {
    /// Member TTL override for this guild.
    pub member_ttl: Option<Duration>,
    /// Guild TTL override for this guild.
    pub guild_ttl: Option<Duration>,
    /// Roles TTL override for this guild.
    pub roles_ttl: Option<Duration>,
    /// Channel TTL override for this guild.
    pub channel_ttl: Option<Duration>,
}

/// Aggregate configuration surface consumed by the CORE.
///
/// Mirrors the read-only DTO described in the external interfaces section: `cache`, `warmup`,
/// `router`, and `perGuild` overrides, loaded once from the process environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Cache subsystem configuration.
    pub cache: CacheConfig,
    /// Warmup controller configuration.
    pub warmup: WarmupConfig,
    /// Task router configuration.
    pub router: RouterConfig,
    /// Per-guild TTL overrides, keyed by guild ID.
    pub per_guild: HashMap<u64, GuildCacheOverride>,
    /// Path to the SQLite file backing the durable KV store.
    pub store_path: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            warmup: WarmupConfig::default(),
            router: RouterConfig::default(),
            per_guild: HashMap::new(),
            store_path: "sentrybot.sqlite".to_owned(),
        }
    }
}

impl BotConfig {
    /// Build configuration from environment variables, falling back to defaults.
    ///
    /// Per-guild overrides are not environment-representable (there is no bounded way to
    /// express an arbitrary guild map via env vars); callers that need them build a
    /// `BotConfig` via `from_env()` and then insert into `per_guild` directly.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self {
            cache: load_cache_config(),
            warmup: load_warmup_config(),
            router: load_router_config(),
            per_guild: HashMap::new(),
            store_path: env::var(env_config::STORE_PATH)
                .unwrap_or_else(|_| "sentrybot.sqlite".to_owned()),
        };

        config.log_summary();
        config
    }

    /// Resolve the effective member TTL for a guild, honoring any per-guild override.
    #[must_use]
    pub fn member_ttl_for(&self, guild_id: u64) -> Duration {
        self.per_guild
            .get(&guild_id)
            .and_then(|o| o.member_ttl)
            .unwrap_or(self.cache.member_ttl)
    }

    /// Resolve the effective guild-record TTL for a guild, honoring any per-guild override.
    #[must_use]
    pub fn guild_ttl_for(&self, guild_id: u64) -> Duration {
        self.per_guild
            .get(&guild_id)
            .and_then(|o| o.guild_ttl)
            .unwrap_or(self.cache.guild_ttl)
    }

    /// Resolve the effective roles TTL for a guild, honoring any per-guild override.
    #[must_use]
    pub fn roles_ttl_for(&self, guild_id: u64) -> Duration {
        self.per_guild
            .get(&guild_id)
            .and_then(|o| o.roles_ttl)
            .unwrap_or(self.cache.roles_ttl)
    }

    /// Resolve the effective channel TTL for a guild, honoring any per-guild override.
    #[must_use]
    pub fn channel_ttl_for(&self, guild_id: u64) -> Duration {
        self.per_guild
            .get(&guild_id)
            .and_then(|o| o.channel_ttl)
            .unwrap_or(self.cache.channel_ttl)
    }

    /// Validate the loaded configuration, warning on suspicious values.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is outright unusable (zero-sized cache, zero workers).
    pub fn validate(&self) -> crate::errors::CoreResult<()> {
        if self.cache.max_members == 0
            || self.cache.max_guilds == 0
            || self.cache.max_roles == 0
            || self.cache.max_channels == 0
        {
            return Err(crate::errors::CoreError::config(
                "cache max size must be greater than zero for every class",
            ));
        }
        if self.router.workers == 0 {
            return Err(crate::errors::CoreError::config(
                "router worker pool size must be greater than zero",
            ));
        }
        if self.router.shutdown_timeout.as_secs() == 0 {
            warn!("router shutdown timeout is zero; in-flight tasks will not be awaited");
        }
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            member_ttl_secs = self.cache.member_ttl.as_secs(),
            guild_ttl_secs = self.cache.guild_ttl.as_secs(),
            max_members = self.cache.max_members,
            max_guilds = self.cache.max_guilds,
            persist_enabled = self.cache.persist_enabled,
            downtime_threshold_secs = self.warmup.downtime_threshold.as_secs(),
            router_workers = self.router.workers,
            router_shutdown_timeout_secs = self.router.shutdown_timeout.as_secs(),
            "BotConfig loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_are_internally_consistent() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_members, 10_000);
    }

    #[test]
    #[serial]
    fn per_guild_override_shadows_default() {
        let mut config = BotConfig::default();
        config.per_guild.insert(
            42,
            GuildCacheOverride {
                member_ttl: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        );
        assert_eq!(config.member_ttl_for(42), Duration::from_secs(60));
        assert_eq!(config.guild_ttl_for(42), config.cache.guild_ttl);
        assert_eq!(config.member_ttl_for(7), config.cache.member_ttl);
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        std::env::set_var(env_config::MAX_MEMBERS, "42");
        let config = BotConfig::from_env();
        assert_eq!(config.cache.max_members, 42);
        std::env::remove_var(env_config::MAX_MEMBERS);
    }
}
