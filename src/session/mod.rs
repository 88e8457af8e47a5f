// ABOUTME: Remote Discord session interface and the read-through cached wrapper over it (§4.C, §6)
// ABOUTME: The CORE never talks to the remote API directly outside this module

mod cached;

pub use cached::CachedSession;

use crate::cache::{ChannelRecord, GuildRecord, MemberRecord, RoleRecord};
use crate::errors::CoreResult;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Events the remote session emits that invalidate or refresh cached state (§4.C).
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A member's cached fields changed; carries the refreshed record.
    MemberUpdate(MemberRecord),
    /// A member left or was removed from a guild.
    MemberRemove {
        /// Guild the member left.
        guild_id: u64,
        /// The departing member's user ID.
        user_id: u64,
    },
    /// A guild's cached fields changed; carries the refreshed record.
    GuildUpdate(GuildRecord),
    /// A role was created in a guild.
    RoleCreate {
        /// Guild the role belongs to.
        guild_id: u64,
        /// The new role.
        role: RoleRecord,
    },
    /// A role's cached fields changed.
    RoleUpdate {
        /// Guild the role belongs to.
        guild_id: u64,
        /// The updated role.
        role: RoleRecord,
    },
    /// A role was deleted from a guild.
    RoleDelete {
        /// Guild the role belonged to.
        guild_id: u64,
        /// The deleted role's ID.
        role_id: u64,
    },
    /// A channel's cached fields changed; carries the refreshed record.
    ChannelUpdate(ChannelRecord),
    /// A channel was deleted.
    ChannelDelete {
        /// The deleted channel's ID.
        channel_id: u64,
    },
}

/// An outbound message handed to [`RemoteSession::send`] by notification handlers.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Plain-text or pre-formatted message body.
    pub content: String,
}

impl OutboundMessage {
    /// Wrap a plain-text body.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// The remote API surface the CORE consumes (§6 "Remote session interface consumed by the CORE").
///
/// Implementations own rate-limiting, retries at the transport level, and classifying errors
/// as transient, rate-limited, or permanent via [`crate::errors::CoreError::retryability`].
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Fetch a single member directly from the remote API.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    async fn get_member(&self, guild_id: u64, user_id: u64) -> CoreResult<MemberRecord>;

    /// Fetch a single guild directly from the remote API.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    async fn get_guild(&self, guild_id: u64) -> CoreResult<GuildRecord>;

    /// Fetch a guild's ordered role list directly from the remote API.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    async fn get_roles(&self, guild_id: u64) -> CoreResult<Vec<RoleRecord>>;

    /// Fetch a single channel directly from the remote API.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    async fn get_channel(&self, channel_id: u64) -> CoreResult<ChannelRecord>;

    /// Page through a guild's member list, starting after `after` (if given), up to `limit`
    /// members. Returns an empty vector once exhausted.
    ///
    /// # Errors
    /// Returns an error if the remote call fails.
    async fn list_members(
        &self,
        guild_id: u64,
        after: Option<u64>,
        limit: u32,
    ) -> CoreResult<Vec<MemberRecord>>;

    /// Subscribe to the remote event stream. Each call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent>;

    /// Send an outbound message to a channel. The only path by which notification handlers
    /// produce remote side effects.
    ///
    /// # Errors
    /// Returns an error if the send fails.
    async fn send(&self, channel_id: u64, payload: OutboundMessage) -> CoreResult<()>;

    /// Close the remote session, releasing any underlying transport resources.
    ///
    /// # Errors
    /// Returns an error if shutdown of the transport fails.
    async fn close(&self) -> CoreResult<()>;
}
