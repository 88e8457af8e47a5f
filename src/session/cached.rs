// ABOUTME: Read-through cache wrapper over a RemoteSession with event-driven invalidation (§4.C)
// ABOUTME: All cached-entity reads flow through here; negative caching is out of scope by design
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{RemoteEvent, RemoteSession};
use crate::cache::{ChannelRecord, GuildRecord, MemberRecord, RoleRecord, UnifiedCache};
use crate::errors::{CoreError, CoreResult};
use crate::lifecycle::{Component, ComponentHealth, ComponentState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Individual timeout applied to every remote call (§5 "each remote API call has an
/// individual timeout (default 10 s)").
const REMOTE_CALL_TIMEOUT: Duration =
    Duration::from_secs(crate::constants::router::DEFAULT_REMOTE_CALL_TIMEOUT_SECS);

/// Bound a remote call's wall-clock time. A timeout is reported as a retryable transient
/// error, matching how the router treats network timeouts elsewhere.
async fn with_remote_timeout<T, F>(fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(REMOTE_CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::remote_transient(format!(
            "remote call timed out after {}s",
            REMOTE_CALL_TIMEOUT.as_secs()
        ))),
    }
}

/// Read-through facade over the remote API (§4.C).
///
/// Every read for a cached entity class consults [`UnifiedCache`] first; on miss it calls
/// through to the wrapped [`RemoteSession`] and populates the cache on success. Errors are
/// returned verbatim and never cached — only successful reads are memoized.
pub struct CachedSession {
    remote: Arc<dyn RemoteSession>,
    cache: Arc<UnifiedCache>,
    state: ComponentState,
    listener: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl CachedSession {
    /// Wrap `remote` with a read-through cache backed by `cache`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSession>, cache: Arc<UnifiedCache>) -> Self {
        Self {
            remote,
            cache,
            state: ComponentState::Uninitialized,
            listener: None,
        }
    }

    /// Fetch a member, consulting the cache first.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced on a miss; misses are never cached.
    pub async fn get_member(&self, guild_id: u64, user_id: u64) -> CoreResult<MemberRecord> {
        if let Some(hit) = self.cache.get_member(guild_id, user_id).await {
            return Ok(hit);
        }
        let record = with_remote_timeout(self.remote.get_member(guild_id, user_id)).await?;
        self.cache.set_member(record.clone()).await;
        Ok(record)
    }

    /// Fetch a guild, consulting the cache first.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced on a miss; misses are never cached.
    pub async fn get_guild(&self, guild_id: u64) -> CoreResult<GuildRecord> {
        if let Some(hit) = self.cache.get_guild(guild_id).await {
            return Ok(hit);
        }
        let record = with_remote_timeout(self.remote.get_guild(guild_id)).await?;
        self.cache.set_guild(record.clone()).await;
        Ok(record)
    }

    /// Fetch a guild's ordered role list, consulting the cache first.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced on a miss; misses are never cached.
    pub async fn get_roles(&self, guild_id: u64) -> CoreResult<Vec<RoleRecord>> {
        if let Some(hit) = self.cache.get_roles(guild_id).await {
            return Ok(hit);
        }
        let roles = with_remote_timeout(self.remote.get_roles(guild_id)).await?;
        self.cache.set_roles(guild_id, roles.clone()).await;
        Ok(roles)
    }

    /// Fetch a channel, consulting the cache first.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced on a miss; misses are never cached.
    pub async fn get_channel(&self, channel_id: u64) -> CoreResult<ChannelRecord> {
        if let Some(hit) = self.cache.get_channel(channel_id).await {
            return Ok(hit);
        }
        let record = with_remote_timeout(self.remote.get_channel(channel_id)).await?;
        self.cache.set_channel(record.clone()).await;
        Ok(record)
    }

    /// Page through a guild's member list. Not cached — warmup and gap-fill are the only
    /// callers expected to invoke this directly.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced.
    pub async fn list_members(
        &self,
        guild_id: u64,
        after: Option<u64>,
        limit: u32,
    ) -> CoreResult<Vec<MemberRecord>> {
        with_remote_timeout(self.remote.list_members(guild_id, after, limit)).await
    }

    /// Send an outbound message through the wrapped remote session.
    ///
    /// # Errors
    /// Returns whatever error the remote call produced.
    pub async fn send(&self, channel_id: u64, payload: super::OutboundMessage) -> CoreResult<()> {
        with_remote_timeout(self.remote.send(channel_id, payload)).await
    }

    async fn apply_event(cache: &UnifiedCache, event: RemoteEvent) {
        match event {
            RemoteEvent::MemberUpdate(record) => cache.set_member(record).await,
            RemoteEvent::MemberRemove { guild_id, user_id } => {
                cache.invalidate_member(guild_id, user_id).await;
            }
            RemoteEvent::GuildUpdate(record) => cache.set_guild(record).await,
            RemoteEvent::RoleCreate { guild_id, .. }
            | RemoteEvent::RoleUpdate { guild_id, .. }
            | RemoteEvent::RoleDelete { guild_id, .. } => {
                // The cache holds one ordered list per guild; a partial patch can't preserve
                // ordering correctly, so any role change invalidates the whole list.
                cache.invalidate_roles(guild_id).await;
            }
            RemoteEvent::ChannelUpdate(record) => cache.set_channel(record).await,
            RemoteEvent::ChannelDelete { channel_id } => {
                cache.invalidate_channel(channel_id).await;
            }
        }
    }
}

#[async_trait]
impl Component for CachedSession {
    fn name(&self) -> &str {
        "cached_session"
    }

    fn priority(&self) -> u8 {
        30
    }

    async fn initialize(&mut self) -> Result<()> {
        self.state = ComponentState::Initializing;

        let mut receiver = self.remote.subscribe();
        let cache = Arc::clone(&self.cache);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv() => {
                        match event {
                            Ok(event) => Self::apply_event(&cache, event).await,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "invalidation listener lagged behind remote event stream");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                debug!("remote event stream closed, stopping invalidation listener");
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("invalidation listener received shutdown signal");
                        break;
                    }
                }
            }
        });

        self.listener = Some((shutdown_tx, handle));
        self.state = ComponentState::Ready;
        Ok(())
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        let healthy = self.state == ComponentState::Ready
            && self.listener.as_ref().is_some_and(|(_, handle)| !handle.is_finished());

        Ok(ComponentHealth {
            name: self.name().to_string(),
            state: self.state,
            healthy,
            message: None,
            last_check: chrono::Utc::now(),
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state = ComponentState::ShuttingDown;

        if let Some((shutdown_tx, handle)) = self.listener.take() {
            let _ = shutdown_tx.send(());
            handle.await.context("invalidation listener task panicked")?;
        }

        self.remote.close().await.map_err(anyhow::Error::from)?;
        self.state = ComponentState::Shutdown;
        Ok(())
    }

    fn state(&self) -> ComponentState {
        self.state
    }
}
