use crate::media::TrackKind;
use huddle_core::CandidateData;

/// Connectivity of the underlying link as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// What a link reports back to the task that owns it.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was gathered and must be trickled to the remote side.
    CandidateGenerated(CandidateData),
    StateChanged(LinkState),
    RemoteTrack(TrackKind),
}

/// A transport event tagged with the link generation that produced it, so
/// events from a replaced link can be told apart.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub generation: u32,
    pub event: TransportEvent,
}
