use async_trait::async_trait;
use huddle_core::{ParticipantId, PresenceRecord, RoomId};
use huddle_peer::RoomObserver;
use huddle_peer::media::TrackKind;
use huddle_peer::negotiation::NegotiationState;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Event types recorded by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Joined { participant: ParticipantId },
    Left { participant: ParticipantId },
    State { participant: ParticipantId, state: NegotiationState },
    Lost { participant: ParticipantId, reason: String },
    RemoteTrack { participant: ParticipantId, kind: TrackKind },
    LocalMedia { kind: TrackKind, enabled: bool },
    RoomLost { room: RoomId, reason: String },
}

/// A room observer that records every notification.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<RoomEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RoomEvent> {
        self.events.lock().await.clone()
    }

    /// Wait until an event matching `predicate` is recorded.
    pub async fn wait_for<F>(&self, predicate: F, timeout_ms: u64) -> bool
    where
        F: Fn(&RoomEvent) -> bool,
    {
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_millis(timeout_ms);

        loop {
            if self.events.lock().await.iter().any(&predicate) {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    pub async fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RoomEvent) -> bool,
    {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }

    pub async fn has_lost(&self, id: &str) -> bool {
        self.events
            .lock()
            .await
            .iter()
            .any(|e| matches!(e, RoomEvent::Lost { participant, .. } if participant.as_str() == id))
    }
}

#[async_trait]
impl RoomObserver for RecordingObserver {
    async fn on_participant_joined(&self, record: &PresenceRecord) {
        tracing::info!("[RecordingObserver] joined: {}", record.participant_id);
        self.events.lock().await.push(RoomEvent::Joined {
            participant: record.participant_id.clone(),
        });
    }

    async fn on_participant_left(&self, participant: &ParticipantId) {
        tracing::info!("[RecordingObserver] left: {}", participant);
        self.events.lock().await.push(RoomEvent::Left {
            participant: participant.clone(),
        });
    }

    async fn on_connection_state(&self, participant: &ParticipantId, state: NegotiationState) {
        self.events.lock().await.push(RoomEvent::State {
            participant: participant.clone(),
            state,
        });
    }

    async fn on_connection_lost(&self, participant: &ParticipantId, reason: &str) {
        tracing::info!("[RecordingObserver] lost {}: {}", participant, reason);
        self.events.lock().await.push(RoomEvent::Lost {
            participant: participant.clone(),
            reason: reason.to_owned(),
        });
    }

    async fn on_remote_track(&self, participant: &ParticipantId, kind: TrackKind) {
        self.events.lock().await.push(RoomEvent::RemoteTrack {
            participant: participant.clone(),
            kind,
        });
    }

    async fn on_local_media(&self, kind: TrackKind, enabled: bool) {
        self.events
            .lock()
            .await
            .push(RoomEvent::LocalMedia { kind, enabled });
    }

    async fn on_room_lost(&self, room: &RoomId, reason: &str) {
        tracing::info!("[RecordingObserver] room lost {}: {}", room, reason);
        self.events.lock().await.push(RoomEvent::RoomLost {
            room: room.clone(),
            reason: reason.to_owned(),
        });
    }
}
