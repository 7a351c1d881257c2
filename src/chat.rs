//! Chat-platform gateway trait.
//!
//! The announcement engine never talks to a chat platform directly; the bot
//! shell implements `ChatGateway` over its client (Discord, etc.) and tests
//! substitute a recording mock. All methods are `&self`; implementations
//! should be stateless or use interior mutability.

use async_trait::async_trait;
use thiserror::Error;

use crate::render::Embed;

/// A resolved destination channel.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: String,
    /// Server/guild owning the channel; keys the server configuration.
    pub guild_id: String,
    pub name: String,
}

/// Handle to a delivered message, enough to hang a thread off it.
#[derive(Debug, Clone)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to deliver message: {0}")]
    Send(String),

    /// Thread creation is best effort; a server losing its boost tier is the
    /// typical cause.
    #[error("failed to create thread: {0}")]
    Thread(String),
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Resolve a channel ID. `None` means the channel is gone (deleted, or
    /// the bot was removed) and the caller should skip it.
    async fn resolve_channel(&self, channel_id: &str) -> Option<ChannelRef>;

    /// Deliver an announcement, mentioning `mention_role` when set.
    async fn send_announcement(
        &self,
        channel: &ChannelRef,
        embed: &Embed,
        mention_role: Option<&str>,
    ) -> Result<MessageHandle, GatewayError>;

    /// Open an auto-archiving discussion thread on a delivered message.
    async fn start_thread(
        &self,
        message: &MessageHandle,
        name: &str,
        archive_minutes: u32,
    ) -> Result<(), GatewayError>;

    /// Best-effort presence update ("watching N airing anime"). Default no-op.
    async fn update_presence(&self, _tracked_media: usize) {}
}
