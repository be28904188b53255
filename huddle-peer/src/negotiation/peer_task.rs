use crate::media::TrackKind;
use crate::negotiation::{NegotiationEvent, NegotiationMachine, NegotiationRole, NegotiationState};
use crate::signaling::SignalingMailbox;
use crate::transport::{LinkEvent, TransportEvent};
use huddle_core::{ParticipantId, RoomId, SignalPayload, SignalingMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub(crate) enum PeerCommand {
    Signal(SignalPayload),
}

#[derive(Debug)]
pub(crate) enum PeerReportKind {
    State {
        state: NegotiationState,
        reason: Option<String>,
    },
    RemoteTrack(TrackKind),
}

/// What a peer task tells the room actor. `epoch` identifies the registry
/// entry the task was spawned for.
#[derive(Debug)]
pub(crate) struct PeerReport {
    pub participant: ParticipantId,
    pub epoch: u64,
    pub kind: PeerReportKind,
}

/// Drives one [`NegotiationMachine`] until it reaches a terminal state or
/// its token is cancelled.
pub(crate) struct PeerTask {
    pub room: RoomId,
    pub local: ParticipantId,
    pub epoch: u64,
    pub machine: NegotiationMachine,
    pub inbox: mpsc::UnboundedReceiver<PeerCommand>,
    pub link_events: mpsc::Receiver<LinkEvent>,
    pub mailbox: Arc<dyn SignalingMailbox>,
    pub reports: mpsc::UnboundedSender<PeerReport>,
    pub cancel: CancellationToken,
    pub negotiation_timeout: Duration,
}

impl PeerTask {
    pub async fn run(mut self) {
        let remote = self.machine.remote().clone();
        debug!(room = %self.room, %remote, role = ?self.machine.role(), "Peer task started");

        let mut seq = 0u64;
        if self.machine.role() == NegotiationRole::Initiator {
            seq = self.step(NegotiationEvent::Start, seq).await;
        }

        let mut deadline = Instant::now() + self.negotiation_timeout;

        while !self.machine.state().is_terminal() {
            let waiting = self.machine.state() != NegotiationState::Connected;

            let event = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => NegotiationEvent::Close,

                cmd = self.inbox.recv() => match cmd {
                    Some(PeerCommand::Signal(payload)) => {
                        deadline = Instant::now() + self.negotiation_timeout;
                        NegotiationEvent::Remote(payload)
                    }
                    None => NegotiationEvent::Close,
                },

                Some(event) = self.link_events.recv() => {
                    if let TransportEvent::RemoteTrack(kind) = event.event {
                        if event.generation == self.machine.generation() {
                            self.report(PeerReportKind::RemoteTrack(kind));
                        }
                        continue;
                    }
                    NegotiationEvent::Link(event)
                }

                _ = tokio::time::sleep_until(deadline), if waiting => {
                    warn!(room = %self.room, %remote, state = %self.machine.state(), "Negotiation timed out");
                    NegotiationEvent::Timeout
                }
            };

            seq = self.step(event, seq).await;
        }

        debug!(room = %self.room, %remote, state = %self.machine.state(), "Peer task finished");
    }

    /// Applies `event` and sends whatever the machine produced. Returns the
    /// next outbound sequence number.
    async fn step(&mut self, event: NegotiationEvent, mut seq: u64) -> u64 {
        let before = self.machine.state();

        let outbound = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = self.machine.handle(event) => Some(out),
        };
        let Some(outbound) = outbound else {
            self.machine.close().await;
            return seq;
        };

        for payload in outbound {
            let kind = payload.kind();
            let message = SignalingMessage::new(self.local.clone(), seq, payload);
            seq += 1;

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                r = self.mailbox.send(&self.room, self.machine.remote(), message) => r,
            };
            if let Err(e) = sent {
                warn!(room = %self.room, remote = %self.machine.remote(), kind, "Failed to send signal: {}", e);
            }
        }

        let after = self.machine.state();
        if after != before {
            if after == NegotiationState::Connected {
                info!(room = %self.room, remote = %self.machine.remote(), "Peer connected");
            }
            let reason = match after {
                NegotiationState::Failed => self.machine.failure().map(str::to_owned),
                _ => None,
            };
            self.report(PeerReportKind::State { state: after, reason });
        }
        seq
    }

    fn report(&self, kind: PeerReportKind) {
        let _ = self.reports.send(PeerReport {
            participant: self.machine.remote().clone(),
            epoch: self.epoch,
            kind,
        });
    }
}
