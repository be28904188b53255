use crate::error::PresenceError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use huddle_core::{ParticipantId, PresenceEvent, PresenceRecord, RoomId};

pub type PresenceStream = BoxStream<'static, PresenceEvent>;

/// Room-scoped registry of who is currently present.
///
/// A published record must be removed by the channel itself when the
/// publisher's connection drops; callers never rely on seeing an explicit
/// `retract` for every departure.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// Publishes the caller's record. Publishing again replaces the record
    /// without a second add notification.
    async fn publish(&self, room: &RoomId, record: PresenceRecord) -> Result<(), PresenceError>;

    async fn retract(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), PresenceError>;

    /// Yields an `Added` for every current record, then `Synced`, then live
    /// adds and removes in channel order.
    async fn subscribe(&self, room: &RoomId) -> Result<PresenceStream, PresenceError>;
}
