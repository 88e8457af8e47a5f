// ABOUTME: Integration tests for the unified cache's persistence round trip against SQLite
// ABOUTME: Exercises UnifiedCache::persist and load_from_store end to end, on disk and in memory

use anyhow::Result;
use sentrybot_core::cache::{GuildRecord, MemberRecord, UnifiedCache};
use sentrybot_core::config::BotConfig;
use sentrybot_core::store::SqliteKvStore;
use std::sync::Arc;
use std::time::Duration;

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

fn test_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.cache.cleanup_interval = Duration::ZERO;
    config
}

#[tokio::test]
async fn persist_then_load_from_store_restores_same_members() -> Result<()> {
    let store = Arc::new(SqliteKvStore::in_memory().await?);
    let cache = Arc::new(UnifiedCache::new(test_config(), Arc::clone(&store)));

    let members = vec![test_member(1, 10), test_member(1, 11), test_member(1, 12)];
    for member in &members {
        cache.set_member(member.clone()).await;
    }

    cache.persist().await?;

    let reloaded = Arc::new(UnifiedCache::new(test_config(), Arc::clone(&store)));
    let loaded = reloaded.load_from_store().await?;
    assert_eq!(loaded, members.len());

    for member in &members {
        let fetched = reloaded.get_member(member.guild_id, member.user_id).await;
        assert_eq!(fetched.as_ref(), Some(member));
    }

    Ok(())
}

#[tokio::test]
async fn persist_then_load_from_store_on_disk_backed_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sentrybot-test.sqlite");
    let path = path.to_str().expect("tempdir path is valid UTF-8").to_string();

    let store = Arc::new(SqliteKvStore::new(&path).await?);
    let cache = Arc::new(UnifiedCache::new(test_config(), Arc::clone(&store)));

    cache
        .set_guild(GuildRecord {
            guild_id: 99,
            name: "Test Guild".to_string(),
            owner_id: 1,
            member_count: 3,
        })
        .await;
    cache.persist().await?;
    drop(cache);
    drop(store);

    let reopened_store = Arc::new(SqliteKvStore::new(&path).await?);
    let reopened_cache = Arc::new(UnifiedCache::new(test_config(), reopened_store));
    reopened_cache.load_from_store().await?;

    let guild = reopened_cache.get_guild(99).await;
    assert_eq!(guild.map(|g| g.name), Some("Test Guild".to_string()));

    Ok(())
}

#[tokio::test]
async fn expired_entries_are_not_restored_by_load_from_store() -> Result<()> {
    let store = Arc::new(SqliteKvStore::in_memory().await?);
    let mut config = test_config();
    config.cache.member_ttl = Duration::from_millis(10);
    let cache = Arc::new(UnifiedCache::new(config.clone(), Arc::clone(&store)));

    cache.set_member(test_member(5, 50)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.persist().await?;

    let reloaded = Arc::new(UnifiedCache::new(config, store));
    let loaded = reloaded.load_from_store().await?;
    assert_eq!(loaded, 0);
    assert!(reloaded.get_member(5, 50).await.is_none());

    Ok(())
}
