use crate::config::OrchestratorConfig;
use crate::media::LocalMedia;
use crate::negotiation::{
    NegotiationMachine, NegotiationRole, NegotiationState, PeerCommand, PeerReport,
    PeerReportKind, PeerTask,
};
use crate::room::room_command::RoomCommand;
use crate::room::{PeerEntry, PeerRegistry, RoomObserver};
use crate::signaling::{MailboxStream, PresenceStream, SignalingMailbox};
use crate::transport::LinkFactory;
use futures::StreamExt;
use futures::future::join_all;
use huddle_core::{ParticipantId, PresenceEvent, PresenceRecord, RoomId, SignalPayload, SignalingMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a room actor needs, gathered by `join_room`.
pub(crate) struct RoomActorParts {
    pub room: RoomId,
    pub me: ParticipantId,
    pub config: OrchestratorConfig,
    pub media: LocalMedia,
    pub commands: mpsc::Receiver<RoomCommand>,
    pub presence: PresenceStream,
    pub messages: MailboxStream,
    pub mailbox: Arc<dyn SignalingMailbox>,
    pub links: Arc<dyn LinkFactory>,
    pub observer: Arc<dyn RoomObserver>,
}

/// Single owner of the peer registry for one joined room. Presence events,
/// mailbox messages, peer reports and commands are handled one at a time.
pub(crate) struct RoomActor {
    room: RoomId,
    me: ParticipantId,
    config: OrchestratorConfig,
    media: LocalMedia,
    registry: PeerRegistry,
    members: HashMap<ParticipantId, PresenceRecord>,
    synced: bool,
    next_epoch: u64,
    commands: mpsc::Receiver<RoomCommand>,
    presence: PresenceStream,
    messages: MailboxStream,
    reports_rx: mpsc::UnboundedReceiver<PeerReport>,
    reports_tx: mpsc::UnboundedSender<PeerReport>,
    mailbox: Arc<dyn SignalingMailbox>,
    links: Arc<dyn LinkFactory>,
    observer: Arc<dyn RoomObserver>,
}

impl RoomActor {
    pub fn new(parts: RoomActorParts) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        Self {
            room: parts.room,
            me: parts.me,
            config: parts.config,
            media: parts.media,
            registry: PeerRegistry::new(),
            members: HashMap::new(),
            synced: false,
            next_epoch: 0,
            commands: parts.commands,
            presence: parts.presence,
            messages: parts.messages,
            reports_rx,
            reports_tx,
            mailbox: parts.mailbox,
            links: parts.links,
            observer: parts.observer,
        }
    }

    pub async fn run(mut self) {
        info!(room = %self.room, me = %self.me, "Room event loop started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(RoomCommand::Leave { reply }) => {
                            self.close_all().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!(room = %self.room, "Command channel closed. Shutting down room.");
                            self.close_all().await;
                            break;
                        }
                    }
                }

                evt = self.presence.next() => {
                    match evt {
                        Some(e) => self.handle_presence_event(e).await,
                        None => {
                            self.lose_room("presence stream ended").await;
                            break;
                        }
                    }
                }

                msg = self.messages.next() => {
                    match msg {
                        Some(m) => self.handle_message(m).await,
                        None => {
                            self.lose_room("mailbox stream ended").await;
                            break;
                        }
                    }
                }

                Some(report) = self.reports_rx.recv() => {
                    self.handle_report(report).await;
                }
            }
        }

        info!(room = %self.room, "Room event loop finished");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::SetTrackEnabled {
                kind,
                enabled,
                reply,
            } => {
                let found = self.media.set_enabled(kind, enabled);
                if found {
                    info!(room = %self.room, %kind, enabled, "Local track toggled");
                    self.observer.on_local_media(kind, enabled).await;
                }
                let _ = reply.send(found);
            }

            RoomCommand::Snapshot { reply } => {
                let mut members: Vec<PresenceRecord> = self.members.values().cloned().collect();
                members.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
                let _ = reply.send((members, self.registry.snapshot()));
            }

            RoomCommand::Leave { reply } => {
                self.close_all().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_presence_event(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::Added(record) => self.on_presence_added(record).await,
            PresenceEvent::Removed(participant) => self.on_presence_removed(participant).await,
            PresenceEvent::Synced => {
                debug!(
                    room = %self.room,
                    members = self.members.len(),
                    peers = self.registry.len(),
                    "Presence snapshot delivered"
                );
                self.synced = true;
            }
        }
    }

    async fn on_presence_added(&mut self, record: PresenceRecord) {
        let participant = record.participant_id.clone();
        if participant == self.me {
            return;
        }

        if self.members.insert(participant.clone(), record.clone()).is_none() {
            info!(room = %self.room, %participant, "Participant joined");
            self.observer.on_participant_joined(&record).await;
        }

        if self.registry.contains(&participant) {
            debug!(room = %self.room, %participant, "Duplicate presence add");
            return;
        }

        // Members already present when we arrived offer to us; we offer to
        // anyone who shows up later.
        let role = if self.synced {
            NegotiationRole::Initiator
        } else {
            NegotiationRole::Responder
        };
        self.spawn_peer(participant, role).await;
    }

    async fn on_presence_removed(&mut self, participant: ParticipantId) {
        if participant == self.me {
            warn!(room = %self.room, "Own presence record was removed");
            return;
        }

        let was_member = self.members.remove(&participant).is_some();
        if let Some(entry) = self.registry.remove(&participant) {
            self.close_in_background(&participant, entry);
            self.observer
                .on_connection_state(&participant, NegotiationState::Closed)
                .await;
        }
        if was_member {
            info!(room = %self.room, %participant, "Participant left");
            self.observer.on_participant_left(&participant).await;
        }
    }

    async fn handle_message(&mut self, message: SignalingMessage) {
        let id = message.id;
        let from = message.from.clone();

        if from == self.me {
            debug!(room = %self.room, %id, "Dropping message from self");
        } else if self.registry.contains(&from) {
            self.route(&from, message.payload);
        } else if matches!(message.payload, SignalPayload::Offer { .. }) {
            info!(room = %self.room, participant = %from, "Offer from unknown participant, answering");
            self.spawn_peer(from.clone(), NegotiationRole::Responder).await;
            self.route(&from, message.payload);
        } else {
            debug!(
                room = %self.room,
                participant = %from,
                kind = message.payload.kind(),
                "Dropping stale message"
            );
        }

        if let Err(e) = self.mailbox.consume(&self.room, &self.me, id).await {
            warn!(room = %self.room, %id, "Failed to consume message: {}", e);
        }
    }

    fn route(&self, participant: &ParticipantId, payload: SignalPayload) {
        let Some(entry) = self.registry.get(participant) else {
            return;
        };
        if !entry.send(PeerCommand::Signal(payload)) {
            debug!(room = %self.room, %participant, "Peer task already finished");
        }
    }

    async fn handle_report(&mut self, report: PeerReport) {
        let participant = report.participant;

        match report.kind {
            PeerReportKind::State { state, reason } => {
                if !self.registry.update_state(&participant, report.epoch, state) {
                    debug!(room = %self.room, %participant, %state, "Report from a replaced peer");
                    return;
                }
                self.observer.on_connection_state(&participant, state).await;

                if state == NegotiationState::Failed {
                    let reason = reason.unwrap_or_else(|| "negotiation failed".to_owned());
                    if let Some(entry) = self.registry.remove_epoch(&participant, report.epoch) {
                        warn!(room = %self.room, %participant, %reason, "Connection lost");
                        self.close_in_background(&participant, entry);
                        self.observer.on_connection_lost(&participant, &reason).await;
                    }
                }
            }

            PeerReportKind::RemoteTrack(kind) => {
                if self.registry.is_current(&participant, report.epoch) {
                    self.observer.on_remote_track(&participant, kind).await;
                }
            }
        }
    }

    async fn spawn_peer(&mut self, participant: ParticipantId, role: NegotiationRole) {
        self.next_epoch += 1;
        let epoch = self.next_epoch;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        let machine = NegotiationMachine::new(
            self.me.clone(),
            participant.clone(),
            role,
            Arc::clone(&self.links),
            self.media.tracks().to_vec(),
            link_tx,
        );
        let task = PeerTask {
            room: self.room.clone(),
            local: self.me.clone(),
            epoch,
            machine,
            inbox: command_rx,
            link_events: link_rx,
            mailbox: Arc::clone(&self.mailbox),
            reports: self.reports_tx.clone(),
            cancel: cancel.clone(),
            negotiation_timeout: self.config.negotiation_timeout,
        };
        let handle = tokio::spawn(task.run());

        let entry = PeerEntry::new(role, epoch, command_tx, cancel, handle);
        if let Err(entry) = self.registry.insert(participant.clone(), entry) {
            error!(room = %self.room, %participant, "Peer entry already exists");
            self.close_in_background(&participant, entry);
            return;
        }

        info!(room = %self.room, %participant, ?role, epoch, "Peer entry created");
        self.observer
            .on_connection_state(&participant, NegotiationState::New)
            .await;
    }

    fn close_in_background(&self, participant: &ParticipantId, entry: PeerEntry) {
        let task = entry.shutdown();
        let timeout = self.config.close_timeout;
        let participant = participant.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!(%participant, "Peer did not close in time");
            }
        });
    }

    /// Signaling is gone, so no peer can be negotiated or torn down
    /// cleanly any more. Close what we have and tell the observer.
    async fn lose_room(&mut self, reason: &str) {
        error!(room = %self.room, %reason, "Room lost");
        self.close_all().await;
        self.observer.on_room_lost(&self.room, reason).await;
    }

    /// Closes every peer and waits for their links, bounded by the close
    /// timeout.
    async fn close_all(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        info!(room = %self.room, peers = ?self.registry.ids(), "Closing all peers");
        let drained = self.registry.drain();

        let mut participants = Vec::with_capacity(drained.len());
        let mut tasks = Vec::with_capacity(drained.len());
        for (participant, entry) in drained {
            participants.push(participant);
            tasks.push(entry.shutdown());
        }

        let closed = tokio::time::timeout(self.config.close_timeout, join_all(tasks.iter_mut())).await;
        if closed.is_err() {
            warn!(room = %self.room, "Peers did not close in time, aborting");
            for task in &tasks {
                task.abort();
            }
        }

        for participant in &participants {
            self.observer
                .on_connection_state(participant, NegotiationState::Closed)
                .await;
        }
    }
}
