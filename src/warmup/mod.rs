// ABOUTME: Startup warmup controller: heartbeat-gated silent refresh, store load, bounded gap-fill (§4.D)
// ABOUTME: Best-effort prewarm only — a failed step never aborts startup, it just leaves a smaller cache

use crate::cache::{avatar_hash_unchanged, CacheClass, MemberRecord, UnifiedCache, DEFAULT_AVATAR_HASH};
use crate::config::WarmupConfig;
use crate::errors::CoreError;
use crate::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::logging::GuildLogger;
use crate::session::CachedSession;
use crate::store::KvStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

const MEMBER_PAGE_SIZE: u32 = 1000;
const MEMBER_CLASS: &str = CacheClass::Member.as_str();

/// Runs the startup warmup algorithm once during [`Component::initialize`] (§4.D).
pub struct WarmupController {
    store: Arc<dyn KvStore>,
    cache: Arc<UnifiedCache>,
    session: Arc<CachedSession>,
    config: WarmupConfig,
    member_ttl: chrono::Duration,
    state: ComponentState,
}

impl WarmupController {
    /// Build a warmup controller from its dependencies and the default member TTL used when
    /// writing silent-refresh rows directly to the store.
    #[must_use]
    pub fn new(
        store: Arc<dyn KvStore>,
        cache: Arc<UnifiedCache>,
        session: Arc<CachedSession>,
        config: WarmupConfig,
        member_ttl: std::time::Duration,
    ) -> Self {
        Self {
            store,
            cache,
            session,
            config,
            member_ttl: chrono::Duration::from_std(member_ttl).unwrap_or_default(),
            state: ComponentState::Uninitialized,
        }
    }

    /// Run the full warmup algorithm. Never fails the caller; every step is best-effort and
    /// logs its own failures (§4.D Non-goals: "not a guarantee of consistency").
    pub async fn run(&self) {
        let now = Utc::now();

        let heartbeat = match self.store.get_heartbeat().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "failed to read heartbeat, treating as long downtime");
                None
            }
        };

        let downtime_threshold =
            chrono::Duration::from_std(self.config.downtime_threshold).unwrap_or_default();
        let needs_silent_refresh = match heartbeat {
            Some(h) => now.signed_duration_since(h) > downtime_threshold,
            None => true,
        };

        if needs_silent_refresh {
            GuildLogger::log_warmup_phase("silent_refresh_start", None, "long downtime detected");
            self.silent_refresh(now).await;
        } else {
            GuildLogger::log_warmup_phase("silent_refresh_skipped", None, "within downtime threshold");
        }

        match self.cache.load_from_store().await {
            Ok(loaded) => {
                GuildLogger::log_warmup_phase(
                    "load_from_store",
                    None,
                    &format!("{loaded} entries restored"),
                );
            }
            Err(e) => warn!(error = %e, "load_from_store failed during warmup"),
        }

        self.gap_fill().await;

        if let Err(e) = self.store.set_heartbeat(now).await {
            warn!(error = %e, "failed to write fresh heartbeat after warmup");
        }
    }

    /// For each configured guild, page through its member list and upsert current avatar
    /// hashes directly into the durable store. No notifications fire during this phase; the
    /// in-memory cache is populated later, from the store, in [`Self::run`]'s next step.
    async fn silent_refresh(&self, now: chrono::DateTime<Utc>) {
        for &guild_id in &self.config.guild_ids {
            let mut after = None;
            let mut total = 0usize;

            loop {
                let page = match self.session.list_members(guild_id, after, MEMBER_PAGE_SIZE).await {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(guild_id, error = %e, "silent refresh list_members failed");
                        break;
                    }
                };
                if page.is_empty() {
                    break;
                }

                for member in &page {
                    if let Err(e) = self.upsert_silent_member(member, now).await {
                        warn!(guild_id, user_id = member.user_id, error = %e, "silent refresh upsert failed");
                    }
                }

                total += page.len();
                after = page.last().map(|m| m.user_id);
            }

            GuildLogger::log_warmup_phase(
                "silent_refresh_guild",
                Some(guild_id),
                &format!("{total} members upserted"),
            );
        }
    }

    async fn upsert_silent_member(
        &self,
        member: &MemberRecord,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut normalized = member.clone();
        if normalized.avatar_hash.is_empty() {
            normalized.avatar_hash = DEFAULT_AVATAR_HASH.to_string();
        }

        let key = format!("{}:{}", normalized.guild_id, normalized.user_id);
        let bytes = crate::store::envelope::wrap(&normalized)?;
        let expires_at = now + self.member_ttl;
        self.store
            .upsert(
                &crate::cache::unified::storage_key(MEMBER_CLASS, &key),
                MEMBER_CLASS,
                bytes,
                expires_at,
            )
            .await
    }

    /// Issue bounded API reads to fill gaps left by the store, capped at `maxMembersPerGuild`
    /// members fetched per guild (§4.D step 5).
    async fn gap_fill(&self) {
        for &guild_id in &self.config.guild_ids {
            match self
                .session
                .list_members(guild_id, None, self.config.max_members_per_guild)
                .await
            {
                Ok(members) => {
                    for member in members {
                        self.cache_member_if_fresh(member).await;
                    }
                }
                Err(e) => warn!(guild_id, error = %e, "gap-fill list_members failed"),
            }
        }
    }

    async fn cache_member_if_fresh(&self, fetched: MemberRecord) {
        if let Some(existing) = self.cache.get_member(fetched.guild_id, fetched.user_id).await {
            if avatar_hash_unchanged(&existing.avatar_hash, &fetched.avatar_hash) {
                return;
            }
        }
        self.cache.set_member(fetched).await;
    }
}

#[async_trait]
impl Component for WarmupController {
    fn name(&self) -> &str {
        "warmup"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn is_required(&self) -> bool {
        false
    }

    async fn initialize(&mut self) -> Result<()> {
        self.state = ComponentState::Initializing;
        self.run().await;
        self.state = ComponentState::Ready;
        info!("warmup complete");
        Ok(())
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        Ok(ComponentHealth {
            name: self.name().to_string(),
            state: self.state,
            healthy: true,
            message: None,
            last_check: Utc::now(),
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state = ComponentState::Shutdown;
        Ok(())
    }

    fn state(&self) -> ComponentState {
        self.state
    }
}
