use thiserror::Error;

/// Why local capture could not be acquired.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("camera/microphone access denied")]
    PermissionDenied,
    #[error("camera or microphone not found")]
    NotFound,
    #[error("failed to access camera/microphone: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresenceError {
    #[error("presence channel unreachable: {0}")]
    Unreachable(String),
    #[error("presence channel closed")]
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailboxError {
    #[error("signaling mailbox unavailable: {0}")]
    Unavailable(String),
    #[error("signaling mailbox closed")]
    Closed,
}

/// A failure while joining a room. Partial side effects are rolled back
/// before this is returned.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("local media unavailable: {0}")]
    MediaUnavailable(#[from] MediaError),
    #[error("failed to join room: {0}")]
    JoinFailed(#[from] PresenceError),
    #[error("signaling mailbox subscription failed: {0}")]
    Mailbox(#[from] MailboxError),
    #[error("join cancelled by leave")]
    Cancelled,
}

/// A failure scoped to one peer connection.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("malformed remote description: {0}")]
    MalformedDescription(String),
    #[error("malformed remote candidate: {0}")]
    MalformedCandidate(String),
    #[error("peer link error: {0}")]
    Link(#[from] anyhow::Error),
}
