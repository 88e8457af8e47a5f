// ABOUTME: Component lifecycle management for deterministic startup order and graceful shutdown
// ABOUTME: Orchestrates the store -> cache -> session -> warmup -> router startup chain
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! Component Lifecycle Management
//!
//! The CORE's components have a strict startup order (durable store, then cache, then
//! session, then warmup, then router) and the reverse order on shutdown. This module
//! provides a deterministic orchestrator with:
//! - Explicit priority-ordered initialization
//! - Health check monitoring
//! - Graceful degradation for optional components
//! - Reverse-order shutdown hooks bounded by the router's shutdown budget

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Component lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    /// Component is not yet initialized
    Uninitialized,
    /// Component is currently initializing
    Initializing,
    /// Component is ready and operational
    Ready,
    /// Component initialization failed
    Failed,
    /// Component is shutting down
    ShuttingDown,
    /// Component has shut down
    Shutdown,
}

/// Component health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Current state
    pub state: ComponentState,
    /// Health check status
    pub healthy: bool,
    /// Optional status message
    pub message: Option<String>,
    /// Last health check timestamp
    pub last_check: chrono::DateTime<chrono::Utc>,
}

/// Trait implemented by every orchestrated component (store, cache, session, warmup, router).
#[async_trait]
pub trait Component: Send + Sync {
    /// Get component name.
    fn name(&self) -> &str;

    /// Get component initialization priority (lower = earlier, 0-100). Matches the startup
    /// order: store=10, cache=20, session=30, warmup=40, router=50.
    fn priority(&self) -> u8 {
        50
    }

    /// Initialize the component.
    ///
    /// # Errors
    /// Returns an error if initialization fails.
    async fn initialize(&mut self) -> Result<()>;

    /// Perform health check.
    ///
    /// # Errors
    /// Returns an error if the health check itself fails to run.
    async fn health_check(&self) -> Result<ComponentHealth>;

    /// Gracefully shut down the component.
    ///
    /// # Errors
    /// Returns an error if shutdown fails.
    async fn shutdown(&mut self) -> Result<()>;

    /// Get current component state.
    fn state(&self) -> ComponentState;

    /// Check if the component is required for bot operation. Optional components (e.g. a
    /// best-effort warmup) may fail without aborting startup.
    fn is_required(&self) -> bool {
        true
    }
}

/// Orchestrates initialization order, health checks, and shutdown across all components.
pub struct ComponentManager {
    components: Vec<Box<dyn Component>>,
    initialization_timeout: Duration,
}

impl ComponentManager {
    /// Create a new component manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            initialization_timeout: Duration::from_secs(30),
        }
    }

    /// Register a component.
    pub fn register(&mut self, component: Box<dyn Component>) {
        info!("Registering component: {}", component.name());
        self.components.push(component);
    }

    /// Initialize all components in priority order.
    ///
    /// # Errors
    /// Returns an error if any required component fails to initialize.
    pub async fn initialize_all(&mut self) -> Result<()> {
        info!("Initializing {} components", self.components.len());
        self.components.sort_by_key(Component::priority);

        for component in &mut self.components {
            let name = component.name().to_string();
            let required = component.is_required();
            let priority = component.priority();

            info!(
                "Initializing component '{}' (priority: {}, required: {})",
                name, priority, required
            );

            match tokio::time::timeout(self.initialization_timeout, component.initialize()).await
            {
                Ok(Ok(())) => {
                    info!("Component '{}' initialized successfully", name);
                }
                Ok(Err(e)) => {
                    if required {
                        error!("Required component '{}' failed to initialize: {}", name, e);
                        return Err(e);
                    }
                    warn!("Optional component '{}' failed to initialize: {}", name, e);
                }
                Err(_) => {
                    if required {
                        error!(
                            "Required component '{}' initialization timed out after {:?}",
                            name, self.initialization_timeout
                        );
                        return Err(anyhow::anyhow!("Component initialization timeout: {}", name));
                    }
                    warn!("Optional component '{}' initialization timed out", name);
                }
            }
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Perform health checks on all components.
    pub async fn health_check_all(&self) -> Vec<ComponentHealth> {
        let mut results = Vec::new();

        for component in &self.components {
            match component.health_check().await {
                Ok(health) => results.push(health),
                Err(e) => {
                    error!("Health check failed for component '{}': {}", component.name(), e);
                    results.push(ComponentHealth {
                        name: component.name().to_string(),
                        state: component.state(),
                        healthy: false,
                        message: Some(format!("Health check error: {e}")),
                        last_check: chrono::Utc::now(),
                    });
                }
            }
        }

        results
    }

    /// Shut down all components in reverse priority order, within the shutdown budget.
    ///
    /// # Errors
    /// Returns an error only if a required component's shutdown both fails and that
    /// failure must abort the process; by default every component's error is logged and
    /// shutdown continues so later components still get a chance to drain.
    pub async fn shutdown_all(&mut self, budget: Duration) -> Result<()> {
        info!(
            "Shutting down {} components (budget: {:?})",
            self.components.len(),
            budget
        );

        self.components.reverse();
        let deadline = tokio::time::Instant::now() + budget;

        for component in &mut self.components {
            let name = component.name().to_string();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            info!("Shutting down component '{}' (remaining budget: {:?})", name, remaining);

            match tokio::time::timeout(remaining, component.shutdown()).await {
                Ok(Ok(())) => info!("Component '{}' shut down cleanly", name),
                Ok(Err(e)) => error!("Component '{}' shutdown error: {}", name, e),
                Err(_) => warn!("Component '{}' shutdown exceeded budget, abandoning", name),
            }
        }

        info!("All components shut down");
        Ok(())
    }

    /// Get overall system health status: true iff every required component is healthy.
    pub async fn is_healthy(&self) -> bool {
        let health_checks = self.health_check_all().await;

        for health in &health_checks {
            if let Some(component) = self.components.iter().find(|c| c.name() == health.name) {
                if component.is_required() && !health.healthy {
                    return false;
                }
            }
        }

        true
    }
}

impl Default for ComponentManager {
    fn default() -> Self {
        Self::new()
    }
}
