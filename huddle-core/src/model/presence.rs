use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The one ephemeral record a participant publishes while in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub participant_id: ParticipantId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Unix time in milliseconds.
    pub joined_at: u64,
}

impl PresenceRecord {
    pub fn new(participant_id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            participant_id,
            display_name: display_name.into(),
            avatar_ref: None,
            joined_at: now_millis(),
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// Same record with a fresh join timestamp.
    pub fn rejoined(&self) -> Self {
        Self {
            joined_at: now_millis(),
            ..self.clone()
        }
    }
}

/// Notifications delivered by a presence subscription, in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Added(PresenceRecord),
    Removed(ParticipantId),
    /// Every record present at subscription time has been delivered.
    /// Adds after this marker are live arrivals.
    Synced,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
