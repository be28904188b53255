use huddle_core::ParticipantId;
use thiserror::Error;

/// Why the relay refused a client frame. Reported back on the socket as an
/// `Error` frame; the socket stays open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("connection is not registered in this room")]
    UnknownConnection,
    #[error("socket belongs to {connected}, frame claims {claimed}")]
    IdentityMismatch {
        connected: ParticipantId,
        claimed: ParticipantId,
    },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
