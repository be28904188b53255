use crate::media::TrackKind;
use crate::room::PeerSnapshot;
use huddle_core::PresenceRecord;
use tokio::sync::oneshot;

/// Requests from the orchestrator handle to a running room.
#[derive(Debug)]
pub(crate) enum RoomCommand {
    /// Flip a local track and report whether such a track exists.
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },

    Snapshot {
        reply: oneshot::Sender<(Vec<PresenceRecord>, Vec<PeerSnapshot>)>,
    },

    /// Close every peer and stop. Replies once all links are closed or the
    /// close timeout expired.
    Leave { reply: oneshot::Sender<()> },
}
