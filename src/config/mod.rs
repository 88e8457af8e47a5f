// ABOUTME: Configuration management module for centralized cache, warmup, and router settings
// ABOUTME: Handles environment-variable loading and the read-only configuration DTO consumed by the core
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Configuration module for the moderation bot core.
//!
//! [`environment`] builds [`BotConfig`] from the process environment. Every other subsystem
//! treats it as a read-only DTO handed to it at construction time.

/// Environment-variable loading and the `BotConfig` DTO.
pub mod environment;

pub use environment::{BotConfig, CacheConfig, GuildCacheOverride, RouterConfig, WarmupConfig};
