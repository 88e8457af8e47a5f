// ABOUTME: Minimal domain records cached by the unified cache (§3 Data Model)
// ABOUTME: Deliberately thin — embed formatting, permission resolution, and the wire protocol are out of scope
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel avatar hash meaning "no custom avatar" (§6 Sentinels).
pub const DEFAULT_AVATAR_HASH: &str = "default";

/// Compare two avatar hashes the way the CORE must: `""` and `"default"` are equivalent.
#[must_use]
pub fn avatar_hash_unchanged(stored: &str, fetched: &str) -> bool {
    normalize_avatar_hash(stored) == normalize_avatar_hash(fetched)
}

fn normalize_avatar_hash(hash: &str) -> &str {
    if hash.is_empty() {
        DEFAULT_AVATAR_HASH
    } else {
        hash
    }
}

/// Guild member record (Member class, §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Guild the member belongs to.
    pub guild_id: u64,
    /// Discord user ID.
    pub user_id: u64,
    /// Display username at last observation.
    pub username: String,
    /// Avatar hash, or [`DEFAULT_AVATAR_HASH`] if unset.
    pub avatar_hash: String,
    /// When the member joined, if known.
    pub joined_at: Option<DateTime<Utc>>,
    /// Role IDs currently assigned to the member.
    pub role_ids: Vec<u64>,
}

/// Guild record (Guild class, §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    /// Guild ID.
    pub guild_id: u64,
    /// Guild display name.
    pub name: String,
    /// Guild owner's user ID.
    pub owner_id: u64,
    /// Member count at last observation.
    pub member_count: u64,
}

/// Single role within a guild's ordered role list (Roles class, §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Role ID.
    pub role_id: u64,
    /// Role display name.
    pub name: String,
    /// Position in the role hierarchy; lower sorts first.
    pub position: i32,
}

/// Channel record (Channel class, §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel ID.
    pub channel_id: u64,
    /// Guild the channel belongs to.
    pub guild_id: u64,
    /// Channel display name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_hash_sentinel_equivalence() {
        assert!(avatar_hash_unchanged("", "default"));
        assert!(avatar_hash_unchanged("default", ""));
        assert!(avatar_hash_unchanged("", ""));
        assert!(avatar_hash_unchanged("abc123", "abc123"));
        assert!(!avatar_hash_unchanged("abc123", "default"));
    }
}
