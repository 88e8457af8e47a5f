// ABOUTME: Guild-aware logging utilities for structured, contextual logging
// ABOUTME: Provides logging helpers that automatically include guild and task context
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use tracing::{debug, info, warn};

/// Guild-aware logging utilities, used by the cache, router, and warmup subsystems so every
/// structured log carries the same field names regardless of which component emits it.
pub struct GuildLogger;

impl GuildLogger {
    /// Log a cache hit or miss.
    pub fn log_cache_lookup(class: &str, key: &str, hit: bool) {
        debug!(
            cache_class = %class,
            cache_key = %key,
            cache_hit = %hit,
            event_type = "cache_lookup",
            "Cache lookup"
        );
    }

    /// Log a cache eviction.
    pub fn log_cache_eviction(class: &str, evicted_key: &str) {
        debug!(
            cache_class = %class,
            evicted_key = %evicted_key,
            event_type = "cache_eviction",
            "Cache entry evicted"
        );
    }

    /// Log a guild-scoped invalidation.
    pub fn log_guild_invalidate(guild_id: u64, entries_removed: usize) {
        info!(
            guild_id = %guild_id,
            entries_removed = %entries_removed,
            event_type = "guild_invalidate",
            "Guild cache entries invalidated"
        );
    }

    /// Log task dispatch.
    pub fn log_task_dispatch(task_type: &str, group_key: &str, dedup_dropped: bool) {
        if dedup_dropped {
            debug!(
                task_type = %task_type,
                group_key = %group_key,
                event_type = "task_dispatch",
                "Task dropped by dedup"
            );
        } else {
            debug!(
                task_type = %task_type,
                group_key = %group_key,
                event_type = "task_dispatch",
                "Task dispatched"
            );
        }
    }

    /// Log task completion.
    pub fn log_task_result(
        task_type: &str,
        group_key: &str,
        attempts: u32,
        success: bool,
        duration_ms: u64,
    ) {
        if success {
            info!(
                task_type = %task_type,
                group_key = %group_key,
                attempts = %attempts,
                duration_ms = %duration_ms,
                event_type = "task_result",
                "Task completed"
            );
        } else {
            warn!(
                task_type = %task_type,
                group_key = %group_key,
                attempts = %attempts,
                duration_ms = %duration_ms,
                event_type = "task_result",
                "Task failed"
            );
        }
    }

    /// Log a task retired after exceeding its retry budget.
    pub fn log_task_dropped(task_type: &str, group_key: &str, attempts: u32, reason: &str) {
        warn!(
            task_type = %task_type,
            group_key = %group_key,
            attempts = %attempts,
            reason = %reason,
            event_type = "task_dropped",
            "Task dropped"
        );
    }

    /// Log a store I/O operation.
    pub fn log_store_operation(operation: &str, success: bool, rows_affected: Option<u64>) {
        if success {
            debug!(
                store_operation = %operation,
                rows_affected = ?rows_affected,
                event_type = "store_operation",
                "Store operation completed"
            );
        } else {
            warn!(
                store_operation = %operation,
                event_type = "store_operation",
                "Store operation failed"
            );
        }
    }

    /// Log a warmup phase transition.
    pub fn log_warmup_phase(phase: &str, guild_id: Option<u64>, detail: &str) {
        info!(
            warmup_phase = %phase,
            guild_id = ?guild_id,
            detail = %detail,
            event_type = "warmup_phase",
            "Warmup phase"
        );
    }

    /// Log an invariant violation — always fatal-severity from the caller's perspective.
    pub fn log_invariant_violation(component: &str, detail: &str) {
        tracing::error!(
            component = %component,
            detail = %detail,
            event_type = "invariant_violation",
            "Invariant violation detected"
        );
    }
}
