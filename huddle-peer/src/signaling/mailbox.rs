use crate::error::MailboxError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use huddle_core::{MessageId, ParticipantId, RoomId, SignalingMessage};

pub type MailboxStream = BoxStream<'static, SignalingMessage>;

/// Per-recipient, per-room message list used for negotiation traffic.
///
/// Delivery is at-least-once and may be reordered. A message stays stored
/// until its recipient consumes it.
#[async_trait]
pub trait SignalingMailbox: Send + Sync {
    async fn send(
        &self,
        room: &RoomId,
        to: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), MailboxError>;

    /// Yields the stored backlog, then live messages.
    async fn subscribe(&self, room: &RoomId, me: &ParticipantId) -> Result<MailboxStream, MailboxError>;

    /// Deletes a processed message.
    async fn consume(&self, room: &RoomId, me: &ParticipantId, id: MessageId) -> Result<(), MailboxError>;
}
