use crate::model::participant::ParticipantId;
use crate::model::presence::PresenceRecord;
use crate::model::signaling::{MessageId, SignalingMessage};
use serde::{Deserialize, Serialize};

/// Frames a participant sends to the relay over its room socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ClientFrame {
    Publish { record: PresenceRecord },
    Retract,
    Send { to: ParticipantId, message: SignalingMessage },
    Consume { id: MessageId },
}

/// Frames the relay pushes to a connected participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ServerFrame {
    PresenceAdded { record: PresenceRecord },
    PresenceRemoved { participant: ParticipantId },
    PresenceSynced,
    Message { message: SignalingMessage },
    Error { reason: String },
}
