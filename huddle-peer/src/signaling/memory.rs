use crate::error::{MailboxError, PresenceError};
use crate::signaling::{
    MailboxStream, PresenceChannel, PresenceStream, SignalingMailbox, receiver_stream,
};
use async_trait::async_trait;
use dashmap::DashMap;
use huddle_core::{MessageId, ParticipantId, PresenceEvent, PresenceRecord, RoomId, SignalingMessage};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct RoomPresence {
    /// Record plus the id of the connection that published it.
    records: HashMap<ParticipantId, (PresenceRecord, u64)>,
    subscribers: Vec<mpsc::UnboundedSender<PresenceEvent>>,
}

impl RoomPresence {
    fn broadcast(&mut self, event: PresenceEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-process presence registry shared by every participant of a test or
/// single-process deployment. Participants talk to it through a
/// [`PresenceConnection`].
#[derive(Clone, Default)]
pub struct PresenceHub {
    rooms: Arc<DashMap<RoomId, RoomPresence>>,
    next_connection: Arc<AtomicU64>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection. Records published through it disappear when it
    /// is disconnected or dropped.
    pub fn connect(&self) -> PresenceConnection {
        PresenceConnection {
            hub: self.clone(),
            id: self.next_connection.fetch_add(1, Ordering::Relaxed),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn records(&self, room: &RoomId) -> Vec<PresenceRecord> {
        self.rooms
            .get(room)
            .map(|r| r.records.values().map(|(record, _)| record.clone()).collect())
            .unwrap_or_default()
    }

    fn expire(&self, connection: u64) {
        for mut room in self.rooms.iter_mut() {
            let gone: Vec<ParticipantId> = room
                .records
                .iter()
                .filter(|(_, (_, owner))| *owner == connection)
                .map(|(id, _)| id.clone())
                .collect();
            for participant in gone {
                room.records.remove(&participant);
                debug!(room = %room.key(), %participant, "Presence expired");
                room.broadcast(PresenceEvent::Removed(participant));
            }
        }
    }
}

pub struct PresenceConnection {
    hub: PresenceHub,
    id: u64,
    disconnected: AtomicBool,
}

impl PresenceConnection {
    /// Drops the connection without retracting anything, the way a crashed
    /// client would.
    pub fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::AcqRel) {
            self.hub.expire(self.id);
        }
    }

    fn ensure_connected(&self) -> Result<(), PresenceError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(PresenceError::Closed);
        }
        Ok(())
    }
}

impl Drop for PresenceConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait]
impl PresenceChannel for PresenceConnection {
    async fn publish(&self, room: &RoomId, record: PresenceRecord) -> Result<(), PresenceError> {
        self.ensure_connected()?;
        let mut entry = self.hub.rooms.entry(room.clone()).or_default();
        let participant = record.participant_id.clone();
        let replaced = entry
            .records
            .insert(participant, (record.clone(), self.id))
            .is_some();
        if !replaced {
            entry.broadcast(PresenceEvent::Added(record));
        }
        Ok(())
    }

    async fn retract(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), PresenceError> {
        self.ensure_connected()?;
        if let Some(mut entry) = self.hub.rooms.get_mut(room) {
            if entry.records.remove(participant).is_some() {
                entry.broadcast(PresenceEvent::Removed(participant.clone()));
            }
        }
        Ok(())
    }

    async fn subscribe(&self, room: &RoomId) -> Result<PresenceStream, PresenceError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut entry = self.hub.rooms.entry(room.clone()).or_default();
        for (record, _) in entry.records.values() {
            let _ = tx.send(PresenceEvent::Added(record.clone()));
        }
        let _ = tx.send(PresenceEvent::Synced);
        entry.subscribers.push(tx);
        Ok(receiver_stream(rx))
    }
}

#[derive(Default)]
struct Mailbox {
    stored: VecDeque<SignalingMessage>,
    subscriber: Option<mpsc::UnboundedSender<SignalingMessage>>,
    departed: bool,
}

impl Mailbox {
    /// The recipient subscribed once and has since dropped its stream.
    fn has_departed(&self) -> bool {
        self.departed || self.subscriber.as_ref().is_some_and(|tx| tx.is_closed())
    }

    fn depart(&mut self) {
        self.stored.clear();
        self.subscriber = None;
        self.departed = true;
    }
}

/// In-process signaling mailbox.
///
/// Messages are kept for a recipient until consumed, and replayed to each
/// new subscription. Once a recipient that subscribed drops its stream it
/// counts as gone: its backlog is discarded and messages sent to it are
/// dropped until it subscribes again. A recipient that never subscribed
/// still gets its messages stored.
#[derive(Clone, Default)]
pub struct MemoryMailbox {
    boxes: Arc<DashMap<(RoomId, ParticipantId), Mailbox>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for `recipient` and not yet consumed.
    pub fn pending(&self, room: &RoomId, recipient: &ParticipantId) -> usize {
        self.boxes
            .get(&(room.clone(), recipient.clone()))
            .map(|b| b.stored.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SignalingMailbox for MemoryMailbox {
    async fn send(
        &self,
        room: &RoomId,
        to: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), MailboxError> {
        let mut mailbox = self.boxes.entry((room.clone(), to.clone())).or_default();
        if mailbox.has_departed() {
            mailbox.depart();
            debug!(%room, recipient = %to, id = %message.id, "Recipient left, message dropped");
            return Ok(());
        }
        mailbox.stored.push_back(message.clone());
        if let Some(tx) = &mailbox.subscriber {
            let _ = tx.send(message);
        }
        Ok(())
    }

    async fn subscribe(&self, room: &RoomId, me: &ParticipantId) -> Result<MailboxStream, MailboxError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mailbox = self.boxes.entry((room.clone(), me.clone())).or_default();
        if mailbox.has_departed() {
            mailbox.depart();
            mailbox.departed = false;
        }
        for message in &mailbox.stored {
            let _ = tx.send(message.clone());
        }
        mailbox.subscriber = Some(tx);
        Ok(receiver_stream(rx))
    }

    async fn consume(&self, room: &RoomId, me: &ParticipantId, id: MessageId) -> Result<(), MailboxError> {
        if let Some(mut mailbox) = self.boxes.get_mut(&(room.clone(), me.clone())) {
            mailbox.stored.retain(|m| m.id != id);
        }
        Ok(())
    }
}
