// ABOUTME: Integration tests for the startup warmup controller's heartbeat-gated behavior
// ABOUTME: Drives WarmupController::run against a scripted RemoteSession and an in-memory store

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sentrybot_core::cache::{ChannelRecord, GuildRecord, MemberRecord, RoleRecord, UnifiedCache};
use sentrybot_core::config::BotConfig;
use sentrybot_core::errors::{CoreError, CoreResult};
use sentrybot_core::session::{CachedSession, OutboundMessage, RemoteEvent, RemoteSession};
use sentrybot_core::store::{KvStore, SqliteKvStore};
use sentrybot_core::warmup::WarmupController;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Serves a fixed page of members once, then an empty page; counts how many times
/// `list_members` was called so tests can assert whether a remote refresh happened at all.
struct ScriptedSession {
    members: Vec<MemberRecord>,
    list_members_calls: AtomicUsize,
    events: broadcast::Sender<RemoteEvent>,
}

impl ScriptedSession {
    fn new(members: Vec<MemberRecord>) -> Self {
        let (events, _rx) = broadcast::channel(8);
        Self {
            members,
            list_members_calls: AtomicUsize::new(0),
            events,
        }
    }

    fn calls(&self) -> usize {
        self.list_members_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn get_member(&self, _guild_id: u64, _user_id: u64) -> CoreResult<MemberRecord> {
        Err(CoreError::not_found("member"))
    }

    async fn get_guild(&self, _guild_id: u64) -> CoreResult<GuildRecord> {
        Err(CoreError::not_found("guild"))
    }

    async fn get_roles(&self, _guild_id: u64) -> CoreResult<Vec<RoleRecord>> {
        Err(CoreError::not_found("roles"))
    }

    async fn get_channel(&self, _channel_id: u64) -> CoreResult<ChannelRecord> {
        Err(CoreError::not_found("channel"))
    }

    async fn list_members(
        &self,
        _guild_id: u64,
        after: Option<u64>,
        _limit: u32,
    ) -> CoreResult<Vec<MemberRecord>> {
        self.list_members_calls.fetch_add(1, Ordering::SeqCst);
        if after.is_some() {
            return Ok(Vec::new());
        }
        Ok(self.members.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    async fn send(&self, _channel_id: u64, _payload: OutboundMessage) -> CoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

fn test_member(guild_id: u64, user_id: u64) -> MemberRecord {
    MemberRecord {
        guild_id,
        user_id,
        username: format!("user-{user_id}"),
        avatar_hash: "abc123".to_string(),
        joined_at: None,
        role_ids: vec![],
    }
}

fn test_config(guild_ids: Vec<u64>) -> BotConfig {
    let mut config = BotConfig::default();
    config.cache.cleanup_interval = Duration::ZERO;
    config.warmup.guild_ids = guild_ids;
    config.warmup.downtime_threshold = Duration::from_secs(300);
    config
}

#[tokio::test]
async fn warmup_skips_remote_refresh_within_downtime_threshold() -> Result<()> {
    let store = Arc::new(SqliteKvStore::in_memory().await?);
    store.set_heartbeat(Utc::now() - chrono::Duration::minutes(5)).await?;

    let config = test_config(vec![1]);
    let cache = Arc::new(UnifiedCache::new(config.clone(), Arc::clone(&store)));
    let remote = Arc::new(ScriptedSession::new(vec![test_member(1, 100)]));
    let session = Arc::new(CachedSession::new(remote.clone(), Arc::clone(&cache)));

    let warmup = WarmupController::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        session,
        config.warmup.clone(),
        config.cache.member_ttl,
    );
    warmup.run().await;

    assert_eq!(remote.calls(), 0, "within the downtime threshold, no ListMembers call should fire");

    Ok(())
}

#[tokio::test]
async fn warmup_pages_through_members_when_heartbeat_absent() -> Result<()> {
    let store = Arc::new(SqliteKvStore::in_memory().await?);

    let config = test_config(vec![7]);
    let cache = Arc::new(UnifiedCache::new(config.clone(), Arc::clone(&store)));
    let remote = Arc::new(ScriptedSession::new(vec![
        test_member(7, 200),
        test_member(7, 201),
    ]));
    let session = Arc::new(CachedSession::new(remote.clone(), Arc::clone(&cache)));

    let warmup = WarmupController::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        session,
        config.warmup.clone(),
        config.cache.member_ttl,
    );
    warmup.run().await;

    assert!(remote.calls() >= 2, "absent heartbeat should page through ListMembers until empty");

    let heartbeat = store.get_heartbeat().await?;
    assert!(heartbeat.is_some(), "warmup should write a fresh heartbeat after completing");

    Ok(())
}

#[tokio::test]
async fn warmup_loads_members_from_store_without_duplicate_remote_calls() -> Result<()> {
    let store = Arc::new(SqliteKvStore::in_memory().await?);
    let config = test_config(vec![]);
    let cache = Arc::new(UnifiedCache::new(config.clone(), Arc::clone(&store)));

    store
        .upsert(
            "3:300",
            "member",
            sentrybot_core::store::envelope::wrap(&test_member(3, 300))?,
            Utc::now() + chrono::Duration::hours(1),
        )
        .await?;

    let remote = Arc::new(ScriptedSession::new(vec![]));
    let session = Arc::new(CachedSession::new(remote.clone(), Arc::clone(&cache)));

    let warmup = WarmupController::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        session,
        config.warmup.clone(),
        config.cache.member_ttl,
    );
    warmup.run().await;

    assert_eq!(remote.calls(), 0, "no configured guilds means no remote ListMembers calls");
    let restored = cache.get_member(3, 300).await;
    assert!(restored.is_some(), "warmup should populate the cache from the durable store");

    Ok(())
}
