// ABOUTME: Library entry point for the moderation bot's cache and task-routing core
// ABOUTME: Durable KV store, unified multi-class cache, read-through session, warmup, and task router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # sentrybot-core
//!
//! The cache and task-routing core of a Discord moderation/observability bot.
//!
//! This crate owns:
//! - a durable, class-tagged, expiry-aware key-value store ([`store`]);
//! - a unified multi-class in-memory cache with bounded size and observable metrics
//!   ([`cache`]);
//! - a read-through session wrapper that keeps the cache coherent with remote events
//!   ([`session`]);
//! - a startup warmup controller that prewarms the cache from durable state and, only on
//!   long downtime, a silent remote refresh ([`warmup`]);
//! - an asynchronous, per-group-ordered task router with retry/backoff and dedup
//!   ([`router`]);
//! - the concrete notification task types the bot dispatches through the router
//!   ([`notifications`]).
//!
//! It does not speak the Discord wire protocol, render embeds, or resolve permissions —
//! those live above this crate, behind the [`session::RemoteSession`] trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sentrybot_core::config::BotConfig;
//! use sentrybot_core::errors::CoreResult;
//!
//! #[tokio::main]
//! async fn main() -> CoreResult<()> {
//!     let config = BotConfig::from_env();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

/// Unified multi-class in-memory cache (§4.B).
pub mod cache;

/// Configuration management: environment-driven `BotConfig` and per-guild overrides.
pub mod config;

/// Shared constants: defaults, env var names, and the generic env parsing helper.
pub mod constants;

/// Unified error handling: `CoreError`, `ErrorCode`, and retry classification.
pub mod errors;

/// Component lifecycle orchestration: deterministic startup order and graceful shutdown.
pub mod lifecycle;

/// Structured logging setup (`tracing`-based) and guild-scoped log helpers.
pub mod logging;

/// Notification task types and their `EnqueueXxx` producer functions (§4.F).
pub mod notifications;

/// Asynchronous, per-group-ordered task router with retry/backoff and dedup (§4.E).
pub mod router;

/// Read-through cached session wrapper over the remote API (§4.C).
pub mod session;

/// Durable, typed, expiring key-value persistence (§4.A).
pub mod store;

/// Startup warmup controller (§4.D).
pub mod warmup;
