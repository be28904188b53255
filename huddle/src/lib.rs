//! Mesh video rooms: one peer connection per pair of participants,
//! negotiated over a presence channel and a signaling mailbox.
//!
//! `peer` brings the room orchestrator, `relay` the WebSocket relay server.

pub use huddle_core::{ParticipantId, RoomId};

pub mod model {
    pub use huddle_core::model::*;
}

#[cfg(feature = "peer")]
pub mod peer {
    pub use huddle_peer::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use huddle_relay::*;
}
