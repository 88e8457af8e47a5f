// ABOUTME: Unified multi-class cache: per-class LRU+TTL storage composed over a durable store
// ABOUTME: §4.B — member, guild, roles, and channel classes share no lock; each is independently bounded
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod class;
pub mod types;
pub mod unified;

pub use class::{ClassCache, ClassStats};
pub use types::{
    avatar_hash_unchanged, ChannelRecord, GuildRecord, MemberRecord, RoleRecord,
    DEFAULT_AVATAR_HASH,
};
pub use unified::{PersistLoopHandle, UnifiedCache, UnifiedCacheStats};

/// The four independently bounded entity classes (§3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
    /// Guild member records, keyed `"{guild_id}:{user_id}"`.
    Member,
    /// Guild records, keyed by guild ID.
    Guild,
    /// Per-guild ordered role lists, keyed by guild ID.
    Roles,
    /// Channel records, keyed by channel ID.
    Channel,
}

impl CacheClass {
    /// The class tag used as the durable store's `class` column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Guild => "guild",
            Self::Roles => "roles",
            Self::Channel => "channel",
        }
    }
}

impl std::fmt::Display for CacheClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
