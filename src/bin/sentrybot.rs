// ABOUTME: Composition root wiring the durable store, unified cache, session, warmup, and router
// ABOUTME: The Discord transport itself is out of CORE scope, so this binary runs a null session for local smoke-testing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![recursion_limit = "256"]
#![forbid(unsafe_code)]

//! # sentrybot core harness
//!
//! Wires the CORE's components together in their required startup order — store, cache,
//! session, warmup, router — and runs until `Ctrl-C`, then shuts down in reverse order. A
//! full bot process embeds [`sentrybot_core`] behind a real Discord gateway connection
//! implementing [`sentrybot_core::session::RemoteSession`], which is outside the CORE's
//! scope; this binary substitutes a null session so the lifecycle, persistence, and metrics
//! surface can be exercised without a live bot token.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use sentrybot_core::cache::{ChannelRecord, GuildRecord, MemberRecord, RoleRecord, UnifiedCache};
use sentrybot_core::config::BotConfig;
use sentrybot_core::errors::{CoreError, CoreResult};
use sentrybot_core::lifecycle::Component;
use sentrybot_core::logging;
use sentrybot_core::notifications;
use sentrybot_core::router::TaskRouter;
use sentrybot_core::session::{CachedSession, OutboundMessage, RemoteEvent, RemoteSession};
use sentrybot_core::store::SqliteKvStore;
use sentrybot_core::warmup::WarmupController;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sentrybot")]
#[command(about = "Moderation bot cache and task-routing core")]
struct Args {
    /// Override the durable store path.
    #[arg(long)]
    store_path: Option<String>,
}

/// A `RemoteSession` that answers every read with `ResourceNotFound` and never emits events.
///
/// Stands in for the real Discord gateway client, which lives above this crate. Lets this
/// binary exercise startup, warmup, persistence, and shutdown end to end without a live bot
/// token.
struct NullRemoteSession {
    events: broadcast::Sender<RemoteEvent>,
}

impl NullRemoteSession {
    fn new() -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self { events }
    }
}

#[async_trait]
impl RemoteSession for NullRemoteSession {
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
        _after: Option<u64>,
        _limit: u32,
    ) -> CoreResult<Vec<MemberRecord>> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    async fn send(&self, channel_id: u64, payload: OutboundMessage) -> CoreResult<()> {
        info!(channel_id, content = %payload.content, "null session: would have sent message");
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;
    let args = parse_args_or_default();
    let config = setup_configuration(&args)?;

    run(config).await
}

fn parse_args_or_default() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Argument parsing failed: {e}");
            eprintln!("Using default configuration");
            Args { store_path: None }
        }
    }
}

fn setup_configuration(args: &Args) -> Result<BotConfig> {
    let mut config = BotConfig::from_env();
    if let Some(store_path) = &args.store_path {
        config.store_path = store_path.clone();
    }
    config.validate().map_err(anyhow::Error::from)?;
    info!(
        max_members = config.cache.max_members,
        router_workers = config.router.workers,
        "sentrybot core configuration loaded"
    );
    Ok(config)
}

/// Startup order: store, cache, session (subscribes to remote events), warmup (best-effort
/// prewarm), router (accepts dispatches only once notification handlers are registered).
async fn run(config: BotConfig) -> Result<()> {
    let store = Arc::new(SqliteKvStore::new(&config.store_path).await?);
    let cache = Arc::new(UnifiedCache::new(config.clone(), Arc::clone(&store)));

    let remote: Arc<dyn RemoteSession> = Arc::new(NullRemoteSession::new());
    let mut session = CachedSession::new(remote, Arc::clone(&cache));
    session.initialize().await?;
    let session = Arc::new(session);

    let warmup = WarmupController::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&session),
        config.warmup.clone(),
        config.cache.member_ttl,
    );
    warmup.run().await;

    let router = Arc::new(TaskRouter::new(config.router.clone()));
    notifications::register_handlers(&router, Arc::clone(&session));

    let persist_handle = cache.set_persist_interval(config.cache.persist_interval);

    info!("sentrybot core running, press Ctrl-C to shut down");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler, shutting down immediately");
    }

    shutdown(&router, &cache, persist_handle, config.router.shutdown_timeout).await
}

/// Reverse startup order: router drains in-flight groups, cache does a final persist, store
/// is dropped (and with it its connection pool) once this function returns.
async fn shutdown(
    router: &Arc<TaskRouter>,
    cache: &Arc<UnifiedCache>,
    persist_handle: sentrybot_core::cache::PersistLoopHandle,
    router_shutdown_timeout: std::time::Duration,
) -> Result<()> {
    info!("shutdown signal received, draining router");
    router.close(router_shutdown_timeout).await;

    persist_handle.stop().await;
    if let Err(e) = cache.persist().await {
        warn!(error = %e, "final persist on shutdown failed");
    }

    info!("sentrybot core shut down cleanly");
    Ok(())
}
