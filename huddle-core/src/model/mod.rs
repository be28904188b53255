mod frame;
mod participant;
mod presence;
mod room;
mod signaling;

pub use frame::{ClientFrame, ServerFrame};
pub use participant::ParticipantId;
pub use presence::{PresenceEvent, PresenceRecord};
pub use room::RoomId;
pub use signaling::{CandidateData, IceServerConfig, MessageId, SignalPayload, SignalingMessage};
