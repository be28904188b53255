use crate::media::TrackKind;
use crate::negotiation::NegotiationState;
use async_trait::async_trait;
use huddle_core::{ParticipantId, PresenceRecord, RoomId};

/// Notifications about a joined room, delivered in the order the room
/// processed them. Observers cannot change room state.
#[async_trait]
pub trait RoomObserver: Send + Sync + 'static {
    async fn on_participant_joined(&self, _record: &PresenceRecord) {}

    async fn on_participant_left(&self, _participant: &ParticipantId) {}

    async fn on_connection_state(&self, _participant: &ParticipantId, _state: NegotiationState) {}

    /// A peer failed and was removed. The participant may still be present.
    async fn on_connection_lost(&self, _participant: &ParticipantId, _reason: &str) {}

    async fn on_remote_track(&self, _participant: &ParticipantId, _kind: TrackKind) {}

    async fn on_local_media(&self, _kind: TrackKind, _enabled: bool) {}

    /// Signaling for the room went away. Every peer has been closed and
    /// the room is no longer joined; call `join_room` to try again.
    async fn on_room_lost(&self, _room: &RoomId, _reason: &str) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl RoomObserver for NoopObserver {}
