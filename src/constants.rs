// ABOUTME: Application constants and default configuration values
// ABOUTME: Centralizes magic numbers for cache TTLs, warmup budgets, and router backoff policy
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Default values for the cache, warmup, and router subsystems.
//!
//! Grouped into nested modules by subsystem so that `constants::cache::DEFAULT_MEMBER_TTL_SECS`
//! reads the same way the equivalent `ServerConfig` field does.

/// Service identity used in logs and the default `User-Agent`.
pub mod service_names {
    /// Name reported in structured logs and startup banners.
    pub const SENTRYBOT_CORE: &str = "sentrybot-core";
}

/// Unified cache defaults (§4.B): per-class TTL, max size, and housekeeping intervals.
pub mod cache {
    /// Default member record TTL.
    pub const DEFAULT_MEMBER_TTL_SECS: u64 = 5 * 60;
    /// Default guild record TTL.
    pub const DEFAULT_GUILD_TTL_SECS: u64 = 15 * 60;
    /// Default roles list TTL.
    pub const DEFAULT_ROLES_TTL_SECS: u64 = 10 * 60;
    /// Default channel record TTL.
    pub const DEFAULT_CHANNEL_TTL_SECS: u64 = 15 * 60;

    /// Default max entries for the member class.
    pub const DEFAULT_MAX_MEMBERS: usize = 10_000;
    /// Default max entries for the guild class.
    pub const DEFAULT_MAX_GUILDS: usize = 100;
    /// Default max entries for the roles class.
    pub const DEFAULT_MAX_ROLES: usize = 100;
    /// Default max entries for the channel class.
    pub const DEFAULT_MAX_CHANNELS: usize = 1_000;

    /// How often the background cleaner scans each class for expired entries.
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 2 * 60;
    /// How often the cache flushes to the durable store.
    pub const DEFAULT_PERSIST_INTERVAL_SECS: u64 = 5 * 60;
}

/// Warmup controller defaults (§4.D).
pub mod warmup {
    /// Downtime below this threshold skips the silent-refresh phase.
    pub const DEFAULT_DOWNTIME_THRESHOLD_SECS: u64 = 30 * 60;
    /// Cap on API-sourced gap fill per guild during warmup.
    pub const DEFAULT_MAX_MEMBERS_PER_GUILD: u32 = 500;
    /// Sentinel avatar hash meaning "no custom avatar".
    pub const DEFAULT_AVATAR_HASH: &str = "default";
}

/// Task router defaults (§4.E).
pub mod router {
    /// Default max attempts for a task type when not overridden.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// First retry backoff, before jitter.
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
    /// Backoff ceiling.
    pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
    /// Default worker pool size per task type.
    pub const DEFAULT_WORKERS_PER_TYPE: usize = 4;
    /// Budget for draining in-flight work on shutdown.
    pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
    /// Per-call timeout against the remote session.
    pub const DEFAULT_REMOTE_CALL_TIMEOUT_SECS: u64 = 10;
}

/// Environment variable names read by [`crate::config::BotConfig::from_env`].
pub mod env_config {
    /// Path to the SQLite database file backing the durable KV store.
    pub const STORE_PATH: &str = "SENTRYBOT_STORE_PATH";
    /// Member TTL override, in seconds.
    pub const MEMBER_TTL_SECS: &str = "SENTRYBOT_CACHE_MEMBER_TTL_SECS";
    /// Guild TTL override, in seconds.
    pub const GUILD_TTL_SECS: &str = "SENTRYBOT_CACHE_GUILD_TTL_SECS";
    /// Roles TTL override, in seconds.
    pub const ROLES_TTL_SECS: &str = "SENTRYBOT_CACHE_ROLES_TTL_SECS";
    /// Channel TTL override, in seconds.
    pub const CHANNEL_TTL_SECS: &str = "SENTRYBOT_CACHE_CHANNEL_TTL_SECS";
    /// Max members override.
    pub const MAX_MEMBERS: &str = "SENTRYBOT_CACHE_MAX_MEMBERS";
    /// Max guilds override.
    pub const MAX_GUILDS: &str = "SENTRYBOT_CACHE_MAX_GUILDS";
    /// Max roles entries override.
    pub const MAX_ROLES: &str = "SENTRYBOT_CACHE_MAX_ROLES";
    /// Max channels override.
    pub const MAX_CHANNELS: &str = "SENTRYBOT_CACHE_MAX_CHANNELS";
    /// Cleanup interval override, in seconds.
    pub const CLEANUP_INTERVAL_SECS: &str = "SENTRYBOT_CACHE_CLEANUP_INTERVAL_SECS";
    /// Persist interval override, in seconds.
    pub const PERSIST_INTERVAL_SECS: &str = "SENTRYBOT_CACHE_PERSIST_INTERVAL_SECS";
    /// Whether background persistence is enabled (`true`/`false`).
    pub const PERSIST_ENABLED: &str = "SENTRYBOT_CACHE_PERSIST_ENABLED";
    /// Downtime threshold override, in seconds.
    pub const DOWNTIME_THRESHOLD_SECS: &str = "SENTRYBOT_WARMUP_DOWNTIME_THRESHOLD_SECS";
    /// Max members per guild backfilled during warmup.
    pub const MAX_MEMBERS_PER_GUILD: &str = "SENTRYBOT_WARMUP_MAX_MEMBERS_PER_GUILD";
    /// Comma-separated list of guild IDs to warm up.
    pub const WARMUP_GUILD_IDS: &str = "SENTRYBOT_WARMUP_GUILD_IDS";
    /// Router per-type max attempts override.
    pub const ROUTER_MAX_ATTEMPTS: &str = "SENTRYBOT_ROUTER_MAX_ATTEMPTS";
    /// Router backoff base override, in milliseconds.
    pub const ROUTER_BACKOFF_BASE_MS: &str = "SENTRYBOT_ROUTER_BACKOFF_BASE_MS";
    /// Router backoff cap override, in milliseconds.
    pub const ROUTER_BACKOFF_CAP_MS: &str = "SENTRYBOT_ROUTER_BACKOFF_CAP_MS";
    /// Router worker count override.
    pub const ROUTER_WORKERS: &str = "SENTRYBOT_ROUTER_WORKERS";
    /// Router shutdown timeout override, in seconds.
    pub const ROUTER_SHUTDOWN_TIMEOUT_SECS: &str = "SENTRYBOT_ROUTER_SHUTDOWN_TIMEOUT_SECS";
}

/// Helper for reading a typed environment variable with a default, matching the
/// `env_var_or`-style idiom used throughout the configuration layer.
pub(crate) fn env_var_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
