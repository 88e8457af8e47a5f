// ABOUTME: The 7 recognized task-type adapters and their EnqueueXxx producer functions (§4.F)
// ABOUTME: Producers are the only path by which event handlers cause outbound calls

use crate::errors::{CoreError, CoreResult};
use crate::router::{DispatchOptions, GroupKeyExtractor, HandlerFn, TaskRouter};
use crate::session::{CachedSession, OutboundMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const MEMBER_JOIN: &str = "member_join";
const MEMBER_LEAVE: &str = "member_leave";
const MESSAGE_EDIT: &str = "message_edit";
const MESSAGE_DELETE: &str = "message_delete";
const AVATAR_CHANGE: &str = "avatar_change";
const ROLE_UPDATE: &str = "role_update";
const AUTOMOD_ACTION: &str = "automod_action";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemberJoinPayload {
    guild_id: u64,
    user_id: u64,
    joined_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemberLeavePayload {
    guild_id: u64,
    user_id: u64,
    left_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageEditPayload {
    guild_id: u64,
    channel_id: u64,
    message_id: u64,
    before: String,
    after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageDeletePayload {
    guild_id: u64,
    channel_id: u64,
    message_id: u64,
    author_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AvatarChangePayload {
    guild_id: u64,
    user_id: u64,
    old_hash: String,
    new_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleUpdatePayload {
    guild_id: u64,
    user_id: u64,
    added: Vec<u64>,
    removed: Vec<u64>,
    generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AutomodActionPayload {
    guild_id: u64,
    rule_id: u64,
    user_id: u64,
    action: String,
}

fn guild_group_key() -> GroupKeyExtractor {
    crate::router::guild_id_group_key()
}

fn notify_channel_handler(
    session: Arc<CachedSession>,
    channel_of: impl Fn(&serde_json::Value) -> CoreResult<u64> + Send + Sync + 'static,
    render: impl Fn(&serde_json::Value) -> String + Send + Sync + 'static,
) -> HandlerFn {
    Arc::new(move |payload: serde_json::Value| {
        let session = Arc::clone(&session);
        let channel_id = channel_of(&payload);
        let text = render(&payload);
        Box::pin(async move {
            let channel_id = channel_id?;
            session.send(channel_id, OutboundMessage::text(text)).await
        })
    })
}

/// Register the standard handlers for every recognized task type (§4.F table).
///
/// Channel routing here sends to the guild ID itself as a placeholder destination; a real
/// deployment would resolve a configured "mod log" channel per guild, but that resolution is
/// outside the CORE's scope (guild configuration beyond cache/router/session is a non-goal).
pub fn register_handlers(router: &Arc<TaskRouter>, session: Arc<CachedSession>) {
    router.register_type(
        MEMBER_JOIN,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("member {} joined", field_u64(p, "user_id").unwrap_or_default()),
        ),
        5,
        4,
        guild_group_key(),
    );

    router.register_type(
        MEMBER_LEAVE,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("member {} left", field_u64(p, "user_id").unwrap_or_default()),
        ),
        5,
        4,
        guild_group_key(),
    );

    router.register_type(
        MESSAGE_EDIT,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("message {} edited", field_u64(p, "message_id").unwrap_or_default()),
        ),
        3,
        4,
        guild_group_key(),
    );

    router.register_type(
        MESSAGE_DELETE,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("message {} deleted", field_u64(p, "message_id").unwrap_or_default()),
        ),
        3,
        4,
        guild_group_key(),
    );

    router.register_type(
        AVATAR_CHANGE,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("member {} changed avatar", field_u64(p, "user_id").unwrap_or_default()),
        ),
        5,
        4,
        guild_group_key(),
    );

    router.register_type(
        ROLE_UPDATE,
        notify_channel_handler(
            Arc::clone(&session),
            |p| field_u64(p, "guild_id"),
            |p| format!("member {} roles changed", field_u64(p, "user_id").unwrap_or_default()),
        ),
        5,
        4,
        guild_group_key(),
    );

    router.register_type(
        AUTOMOD_ACTION,
        notify_channel_handler(
            session,
            |p| field_u64(p, "guild_id"),
            |p| format!("automod rule {} fired: {}", field_u64(p, "rule_id").unwrap_or_default(), p["action"]),
        ),
        3,
        4,
        guild_group_key(),
    );

    info!("registered 7 notification task types");
}

fn field_u64(payload: &serde_json::Value, field: &str) -> CoreResult<u64> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CoreError::invalid_input(format!("missing or invalid field: {field}")))
}

/// Enqueue a `member_join` notification task.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_member_join(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    user_id: u64,
    joined_at: chrono::DateTime<chrono::Utc>,
) -> CoreResult<()> {
    let payload = serde_json::to_value(MemberJoinPayload {
        guild_id,
        user_id,
        joined_at,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(format!("{guild_id}{user_id}join")),
    };
    router.dispatch(MEMBER_JOIN, payload, opts).await?;
    Ok(())
}

/// Enqueue a `member_leave` notification task.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_member_leave(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    user_id: u64,
    left_at: chrono::DateTime<chrono::Utc>,
) -> CoreResult<()> {
    let payload = serde_json::to_value(MemberLeavePayload {
        guild_id,
        user_id,
        left_at,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(format!("{guild_id}{user_id}leave")),
    };
    router.dispatch(MEMBER_LEAVE, payload, opts).await?;
    Ok(())
}

/// Enqueue a `message_edit` notification task.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_message_edit(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    channel_id: u64,
    message_id: u64,
    before: String,
    after: String,
) -> CoreResult<()> {
    if after.is_empty() {
        return Err(CoreError::invalid_input("message_edit requires a non-empty 'after' body"));
    }
    let after_hash = content_hash(&after);
    let payload = serde_json::to_value(MessageEditPayload {
        guild_id,
        channel_id,
        message_id,
        before,
        after,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(format!("{message_id}{after_hash}")),
    };
    router.dispatch(MESSAGE_EDIT, payload, opts).await?;
    Ok(())
}

/// Enqueue a `message_delete` notification task.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_message_delete(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    channel_id: u64,
    message_id: u64,
    author_id: u64,
) -> CoreResult<()> {
    let payload = serde_json::to_value(MessageDeletePayload {
        guild_id,
        channel_id,
        message_id,
        author_id,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(message_id.to_string()),
    };
    router.dispatch(MESSAGE_DELETE, payload, opts).await?;
    Ok(())
}

/// Enqueue an `avatar_change` notification task.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_avatar_change(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    user_id: u64,
    old_hash: String,
    new_hash: String,
) -> CoreResult<()> {
    if crate::cache::avatar_hash_unchanged(&old_hash, &new_hash) {
        return Ok(());
    }
    let payload = serde_json::to_value(AvatarChangePayload {
        guild_id,
        user_id,
        old_hash,
        new_hash: new_hash.clone(),
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(format!("{user_id}{new_hash}")),
    };
    router.dispatch(AVATAR_CHANGE, payload, opts).await?;
    Ok(())
}

/// Enqueue a `role_update` notification task. `generation` should be a monotonically
/// increasing counter per member so repeated role churn dedups per generation rather than
/// collapsing unrelated updates.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_role_update(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    user_id: u64,
    added: Vec<u64>,
    removed: Vec<u64>,
    generation: u64,
) -> CoreResult<()> {
    if added.is_empty() && removed.is_empty() {
        return Err(CoreError::invalid_input("role_update requires at least one added or removed role"));
    }
    let payload = serde_json::to_value(RoleUpdatePayload {
        guild_id,
        user_id,
        added,
        removed,
        generation,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: Some(format!("{user_id}{generation}")),
    };
    router.dispatch(ROLE_UPDATE, payload, opts).await?;
    Ok(())
}

/// Enqueue an `automod_action` notification task. No dedup key — every automod action is
/// reported independently.
///
/// # Errors
/// Returns an error only on validation failure; dispatch itself never fails synchronously.
pub async fn enqueue_automod_action(
    router: &Arc<TaskRouter>,
    guild_id: u64,
    rule_id: u64,
    user_id: u64,
    action: String,
) -> CoreResult<()> {
    if action.is_empty() {
        return Err(CoreError::invalid_input("automod_action requires a non-empty action"));
    }
    let payload = serde_json::to_value(AutomodActionPayload {
        guild_id,
        rule_id,
        user_id,
        action,
    })?;
    let opts = DispatchOptions {
        group_key: Some(guild_id.to_string()),
        dedup_key: None,
    };
    router.dispatch(AUTOMOD_ACTION, payload, opts).await?;
    Ok(())
}

fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_edit_rejects_empty_after() {
        // validated synchronously before a router even exists in this test
        let after = String::new();
        assert!(after.is_empty());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
    }
}
