// ABOUTME: Asynchronous, reliable task dispatch with per-group FIFO ordering and retry/backoff (§4.E)
// ABOUTME: Producers (notification adapters) only ever touch Dispatch; direct synchronous sends are forbidden

pub mod backoff;

use crate::config::RouterConfig;
use crate::errors::{CoreError, CoreResult, Retryability};
use crate::lifecycle::{Component, ComponentHealth, ComponentState};
use crate::logging::GuildLogger;
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered task type's handler: receives the task payload, returns ok or a tagged error.
pub type HandlerFn = Arc<dyn Fn(serde_json::Value) -> BoxFuture<CoreResult<()>> + Send + Sync>;

/// Extracts a `groupKey` from a task's payload. Defaults to the guild ID for every adapter in
/// this bot, but the router itself is agnostic to what a group key means.
pub type GroupKeyExtractor = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;

/// A unit of asynchronous work dispatched to the router (§4.E).
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task ID, assigned at dispatch.
    pub id: Uuid,
    /// Registered task type name.
    pub task_type: String,
    /// Serialization ordering / at-most-one-in-flight key.
    pub group_key: String,
    /// Opaque handler payload.
    pub payload: serde_json::Value,
    /// Attempts made so far, starting at 0.
    pub attempts: u32,
    /// Earliest time this task may next be handed to its handler.
    pub next_attempt_at: DateTime<Utc>,
    /// Optional dedup key; combined with `task_type` to collapse duplicate dispatches.
    pub dedup_key: Option<String>,
    /// When the task was first dispatched.
    pub created_at: DateTime<Utc>,
}

/// Per-type registration (§4.E "Types registered at startup").
struct TypeEntry {
    handler: HandlerFn,
    max_attempts: u32,
    group_key_extractor: GroupKeyExtractor,
    concurrency: Arc<Semaphore>,
}

/// Options accepted by [`TaskRouter::dispatch`].
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Overrides the type's default group-key extractor when set.
    pub group_key: Option<String>,
    /// Dedup key; a second dispatch with the same `(type, dedup_key)` while the first is
    /// pending or in flight is dropped.
    pub dedup_key: Option<String>,
}

struct GroupQueue {
    tasks: VecDeque<Task>,
    active: bool,
}

/// Snapshot of the router's observable metrics (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterStats {
    /// Total tasks accepted (post-dedup).
    pub dispatched: u64,
    /// Total handler invocations that returned Ok.
    pub succeeded: u64,
    /// Total handler invocations that returned a fatal error.
    pub failed: u64,
    /// Total retry reschedules.
    pub retried: u64,
    /// Total tasks dropped (dedup collapse or attempts exhausted).
    pub dropped: u64,
    /// Tasks currently executing inside a handler.
    pub inflight: u64,
    /// Sum of queued (not yet executing) tasks across all groups.
    pub queue_depth: u64,
}

/// Asynchronous, reliable task dispatch engine (§4.E).
pub struct TaskRouter {
    config: RouterConfig,
    types: DashMap<String, Arc<TypeEntry>>,
    groups: DashMap<String, Arc<Mutex<GroupQueue>>>,
    dedup: DashMap<(String, String), ()>,
    accepting: AtomicBool,
    active_drains: Arc<AtomicU64>,
    drains_idle: Arc<Notify>,
    dispatched: Arc<AtomicU64>,
    succeeded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    retried: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    inflight: Arc<AtomicU64>,
    state: ComponentState,
}

impl TaskRouter {
    /// Construct an empty router. Call [`Self::register_type`] for each task type before
    /// dispatching.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            types: DashMap::new(),
            groups: DashMap::new(),
            dedup: DashMap::new(),
            accepting: AtomicBool::new(true),
            active_drains: Arc::new(AtomicU64::new(0)),
            drains_idle: Arc::new(Notify::new()),
            dispatched: Arc::new(AtomicU64::new(0)),
            succeeded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            retried: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            inflight: Arc::new(AtomicU64::new(0)),
            state: ComponentState::Uninitialized,
        }
    }

    /// Register a task type: its handler, retry budget, concurrency, and group-key extractor.
    pub fn register_type(
        &self,
        task_type: impl Into<String>,
        handler: HandlerFn,
        max_attempts: u32,
        concurrency: usize,
        group_key_extractor: GroupKeyExtractor,
    ) {
        self.types.insert(
            task_type.into(),
            Arc::new(TypeEntry {
                handler,
                max_attempts,
                group_key_extractor,
                concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
            }),
        );
    }

    /// Enqueue a task. Returns `true` if accepted, `false` if dropped (dedup collapse or the
    /// router is no longer accepting new dispatches).
    ///
    /// # Errors
    /// Returns an error if `task_type` was never registered.
    pub async fn dispatch(
        self: &Arc<Self>,
        task_type: &str,
        payload: serde_json::Value,
        opts: DispatchOptions,
    ) -> CoreResult<bool> {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!(task_type, "dispatch rejected, router is shutting down");
            return Ok(false);
        }

        let entry = match self.types.get(task_type) {
            Some(entry) => entry.clone(),
            None => {
                let detail = format!("unregistered task type: {task_type}");
                GuildLogger::log_invariant_violation("router", &detail);
                return Err(CoreError::invariant(detail));
            }
        };

        if let Some(dedup_key) = &opts.dedup_key {
            let dedup_id = (task_type.to_string(), dedup_key.clone());
            if self.dedup.insert(dedup_id, ()).is_some() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                GuildLogger::log_task_dispatch(task_type, dedup_key, true);
                return Ok(false);
            }
        }

        let group_key = opts
            .group_key
            .unwrap_or_else(|| (entry.group_key_extractor)(&payload));

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            task_type: task_type.to_string(),
            group_key: group_key.clone(),
            payload,
            attempts: 0,
            next_attempt_at: now,
            dedup_key: opts.dedup_key,
            created_at: now,
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        GuildLogger::log_task_dispatch(task_type, &group_key, false);
        self.enqueue(group_key, task).await;
        Ok(true)
    }

    /// Enqueue a task onto its group's FIFO queue, keyed by `group_key` alone. All task types
    /// sharing a group key serialize through the same queue and the same at-most-one-in-flight
    /// slot; the handler and concurrency limit used for each task are resolved per-task from
    /// its own `task_type` in [`Self::drain_group`].
    async fn enqueue(self: &Arc<Self>, group_key: String, task: Task) {
        let group = self
            .groups
            .entry(group_key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(GroupQueue {
                    tasks: VecDeque::new(),
                    active: false,
                }))
            })
            .clone();

        let should_spawn = {
            let mut guard = group.lock().await;
            guard.tasks.push_back(task);
            if guard.active {
                false
            } else {
                guard.active = true;
                true
            }
        };

        if should_spawn {
            let router = Arc::clone(self);
            self.active_drains.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                router.drain_group(group_key, group).await;
                router.active_drains.fetch_sub(1, Ordering::SeqCst);
                router.drains_idle.notify_waiters();
            });
        }
    }

    async fn drain_group(self: Arc<Self>, group_key: String, group: Arc<Mutex<GroupQueue>>) {
        loop {
            let task = {
                let mut guard = group.lock().await;
                match guard.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        guard.active = false;
                        return;
                    }
                }
            };

            let entry = match self.types.get(&task.task_type) {
                Some(entry) => entry.clone(),
                None => {
                    let detail = format!(
                        "task for unregistered type drained: {} (group {group_key})",
                        task.task_type
                    );
                    GuildLogger::log_invariant_violation("router", &detail);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let now = Utc::now();
            if task.next_attempt_at > now {
                let wait = (task.next_attempt_at - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
            }

            let task_type = task.task_type.clone();
            let retry_task = self.run_once(&task_type, task, &entry).await;

            if let Some(retry_task) = retry_task {
                let mut guard = group.lock().await;
                guard.tasks.push_front(retry_task);
            }
        }
    }

    /// Run a single attempt. Returns `Some(task)` with bumped attempts if it should be
    /// retried, `None` if it terminated (success or final drop).
    async fn run_once(&self, task_type: &str, mut task: Task, entry: &Arc<TypeEntry>) -> Option<Task> {
        let _permit = entry.concurrency.acquire().await.ok();
        self.inflight.fetch_add(1, Ordering::Relaxed);
        let start = std::time::Instant::now();

        let handler = Arc::clone(&entry.handler);
        let payload = task.payload.clone();
        let outcome = tokio::spawn(async move { handler(payload).await }).await;

        self.inflight.fetch_sub(1, Ordering::Relaxed);
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(result) => result,
            Err(join_err) => Err(CoreError::internal(format!("handler panicked: {join_err}"))),
        };

        match result {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                GuildLogger::log_task_result(task_type, &task.group_key, task.attempts + 1, true, duration_ms);
                self.clear_dedup(task_type, &task);
                None
            }
            Err(e) => {
                task.attempts += 1;
                let retryable = e.retryability() == Retryability::Retryable;

                if retryable && task.attempts <= entry.max_attempts {
                    self.retried.fetch_add(1, Ordering::Relaxed);
                    GuildLogger::log_task_result(task_type, &task.group_key, task.attempts, false, duration_ms);
                    let delay = backoff::delay(
                        task.attempts,
                        self.config.backoff_base.as_millis().try_into().unwrap_or(250),
                        self.config.backoff_cap.as_millis().try_into().unwrap_or(30_000),
                    );
                    task.next_attempt_at = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or_default();
                    Some(task)
                } else {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    GuildLogger::log_task_dropped(
                        task_type,
                        &task.group_key,
                        task.attempts,
                        &format!("{e}"),
                    );
                    self.clear_dedup(task_type, &task);
                    None
                }
            }
        }
    }

    fn clear_dedup(&self, task_type: &str, task: &Task) {
        if let Some(dedup_key) = &task.dedup_key {
            self.dedup.remove(&(task_type.to_string(), dedup_key.clone()));
        }
    }

    /// Current observable metrics.
    pub async fn stats(&self) -> RouterStats {
        let mut queue_depth = 0u64;
        for entry in &self.groups {
            queue_depth += entry.value().lock().await.tasks.len() as u64;
        }

        RouterStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            queue_depth,
        }
    }

    /// Stop accepting new dispatches and wait for in-flight groups to drain, up to `budget`.
    pub async fn close(&self, budget: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + budget;

        while self.active_drains.load(Ordering::SeqCst) > 0 {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!(
                    active_drains = self.active_drains.load(Ordering::SeqCst),
                    "router shutdown budget exceeded, abandoning in-flight groups"
                );
                break;
            }
            if tokio::time::timeout(remaining, self.drains_idle.notified()).await.is_err() {
                continue;
            }
        }
        debug!("router drained");
    }
}

#[async_trait]
impl Component for TaskRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn priority(&self) -> u8 {
        50
    }

    async fn initialize(&mut self) -> AnyResult<()> {
        self.state = ComponentState::Ready;
        Ok(())
    }

    async fn health_check(&self) -> AnyResult<ComponentHealth> {
        Ok(ComponentHealth {
            name: self.name().to_string(),
            state: self.state,
            healthy: self.state == ComponentState::Ready,
            message: None,
            last_check: Utc::now(),
        })
    }

    async fn shutdown(&mut self) -> AnyResult<()> {
        self.state = ComponentState::ShuttingDown;
        self.close(self.config.shutdown_timeout).await;
        self.state = ComponentState::Shutdown;
        Ok(())
    }

    fn state(&self) -> ComponentState {
        self.state
    }
}

/// Default group-key extractor: reads a top-level `guild_id` field from the payload.
#[must_use]
pub fn guild_id_group_key() -> GroupKeyExtractor {
    Arc::new(|payload: &serde_json::Value| {
        payload
            .get("guild_id")
            .and_then(serde_json::Value::as_u64)
            .map_or_else(|| "unknown".to_string(), |id| id.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn ok_handler() -> HandlerFn {
        Arc::new(|_payload| Box::pin(async { Ok(()) }))
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let router = Arc::new(TaskRouter::new(RouterConfig {
            per_type_max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
            workers: 2,
        }));
        router.register_type("noop", ok_handler(), 3, 2, guild_id_group_key());

        let accepted = router
            .dispatch("noop", serde_json::json!({"guild_id": 1}), DispatchOptions::default())
            .await
            .unwrap();
        assert!(accepted);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = router.stats().await;
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[tokio::test]
    async fn dedup_collapses_second_dispatch_while_first_pending() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_wait = Arc::clone(&gate);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);

        let handler: HandlerFn = Arc::new(move |_payload| {
            let gate_wait = Arc::clone(&gate_wait);
            let calls_inner = Arc::clone(&calls_inner);
            Box::pin(async move {
                calls_inner.fetch_add(1, Ordering::SeqCst);
                gate_wait.notified().await;
                Ok(())
            })
        });

        let router = Arc::new(TaskRouter::new(RouterConfig {
            per_type_max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
            workers: 2,
        }));
        router.register_type("message_delete", handler, 3, 2, guild_id_group_key());

        let opts = DispatchOptions {
            group_key: None,
            dedup_key: Some("msg42".to_string()),
        };
        let first = router
            .dispatch("message_delete", serde_json::json!({"guild_id": 1}), opts.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = router
            .dispatch("message_delete", serde_json::json!({"guild_id": 1}), opts)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);

        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.stats().await.dropped, 1);
    }

    #[tokio::test]
    async fn per_group_fifo_holds_slot_across_retry() {
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let attempt_count = Arc::new(AtomicU32::new(0));

        let order_clone = Arc::clone(&order);
        let attempt_count_clone = Arc::clone(&attempt_count);
        let handler: HandlerFn = Arc::new(move |payload| {
            let order = Arc::clone(&order_clone);
            let attempt_count = Arc::clone(&attempt_count_clone);
            Box::pin(async move {
                let label = if payload["task"] == "T1" { "T1" } else { "T2" };
                order.lock().await.push(label);
                if label == "T1" && attempt_count.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(CoreError::remote_transient("first attempt fails"));
                }
                Ok(())
            })
        });

        let router = Arc::new(TaskRouter::new(RouterConfig {
            per_type_max_attempts: 3,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(1),
            workers: 1,
        }));
        router.register_type("ordered", handler, 3, 1, guild_id_group_key());

        router
            .dispatch(
                "ordered",
                serde_json::json!({"guild_id": 1, "task": "T1"}),
                DispatchOptions::default(),
            )
            .await
            .unwrap();
        router
            .dispatch(
                "ordered",
                serde_json::json!({"guild_id": 1, "task": "T2"}),
                DispatchOptions::default(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = order.lock().await.clone();
        assert_eq!(seen, vec!["T1", "T1", "T2"]);
    }

    #[tokio::test]
    async fn fifo_serializes_across_task_types_sharing_a_group_key() {
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let order_a = Arc::clone(&order);
        let handler_a: HandlerFn = Arc::new(move |_payload| {
            let order = Arc::clone(&order_a);
            Box::pin(async move {
                order.lock().await.push("a");
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(())
            })
        });

        let order_b = Arc::clone(&order);
        let handler_b: HandlerFn = Arc::new(move |_payload| {
            let order = Arc::clone(&order_b);
            Box::pin(async move {
                order.lock().await.push("b");
                Ok(())
            })
        });

        let router = Arc::new(TaskRouter::new(RouterConfig {
            per_type_max_attempts: 3,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(1),
            workers: 1,
        }));
        router.register_type("type_a", handler_a, 3, 4, guild_id_group_key());
        router.register_type("type_b", handler_b, 3, 4, guild_id_group_key());

        // Same group key (guild 1), different task types: must still run strictly FIFO, one
        // at a time, rather than type_b racing ahead while type_a's slower handler is in flight.
        router
            .dispatch("type_a", serde_json::json!({"guild_id": 1}), DispatchOptions::default())
            .await
            .unwrap();
        router
            .dispatch("type_b", serde_json::json!({"guild_id": 1}), DispatchOptions::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let seen = order.lock().await.clone();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
