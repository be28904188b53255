use crate::config::RelayConfig;
use crate::error::RelayError;
use dashmap::DashMap;
use huddle_core::{MessageId, ParticipantId, PresenceRecord, RoomId, ServerFrame, SignalingMessage};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

struct Connection {
    participant: ParticipantId,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

struct OwnedRecord {
    record: PresenceRecord,
    owner: ConnectionId,
}

#[derive(Default)]
struct RoomState {
    records: HashMap<ParticipantId, OwnedRecord>,
    connections: HashMap<ConnectionId, Connection>,
    mailboxes: HashMap<ParticipantId, VecDeque<SignalingMessage>>,
}

impl RoomState {
    fn broadcast(&self, frame: &ServerFrame) {
        for conn in self.connections.values() {
            let _ = conn.tx.send(frame.clone());
        }
    }

    fn deliver(&self, to: &ParticipantId, message: &SignalingMessage) {
        for conn in self.connections.values().filter(|c| &c.participant == to) {
            let _ = conn.tx.send(ServerFrame::Message {
                message: message.clone(),
            });
        }
    }

    fn participant_of(&self, connection: ConnectionId) -> Result<ParticipantId, RelayError> {
        self.connections
            .get(&connection)
            .map(|c| c.participant.clone())
            .ok_or(RelayError::UnknownConnection)
    }

    fn is_connected(&self, participant: &ParticipantId) -> bool {
        self.connections
            .values()
            .any(|c| &c.participant == participant)
    }
}

struct RelayInner {
    rooms: DashMap<RoomId, RoomState>,
    next_connection: AtomicU64,
    mailbox_capacity: usize,
}

/// Presence records, live sockets and stored mailboxes for every room.
///
/// All mutations of one room happen under that room's map entry, so a new
/// socket sees a consistent snapshot followed by every later broadcast.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayInner>,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                rooms: DashMap::new(),
                next_connection: AtomicU64::new(1),
                mailbox_capacity: config.mailbox_capacity,
            }),
        }
    }

    /// Registers a socket. Queues the presence snapshot, `PresenceSynced`
    /// and the stored backlog for `participant` on `tx` before any live
    /// frame.
    pub fn connect(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        tx: mpsc::UnboundedSender<ServerFrame>,
    ) -> ConnectionId {
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.rooms.entry(room.clone()).or_default();

        for owned in state.records.values() {
            let _ = tx.send(ServerFrame::PresenceAdded {
                record: owned.record.clone(),
            });
        }
        let _ = tx.send(ServerFrame::PresenceSynced);

        let backlog = state.mailboxes.get(participant).map_or(0, VecDeque::len);
        for message in state.mailboxes.get(participant).into_iter().flatten() {
            let _ = tx.send(ServerFrame::Message {
                message: message.clone(),
            });
        }

        state.connections.insert(
            id,
            Connection {
                participant: participant.clone(),
                tx,
            },
        );
        info!(%room, %participant, connection = id, backlog, "Participant connected");
        id
    }

    pub fn publish(&self, room: &RoomId, connection: ConnectionId, record: PresenceRecord) -> Result<(), RelayError> {
        let mut state = self.room_mut(room)?;
        let participant = state.participant_of(connection)?;
        if record.participant_id != participant {
            return Err(RelayError::IdentityMismatch {
                connected: participant,
                claimed: record.participant_id,
            });
        }

        let replaced = state
            .records
            .insert(
                participant.clone(),
                OwnedRecord {
                    record: record.clone(),
                    owner: connection,
                },
            )
            .is_some();
        if replaced {
            debug!(%room, %participant, "Presence record replaced");
        } else {
            info!(%room, %participant, "Presence published");
            state.broadcast(&ServerFrame::PresenceAdded { record });
        }
        Ok(())
    }

    pub fn retract(&self, room: &RoomId, connection: ConnectionId) -> Result<(), RelayError> {
        let mut state = self.room_mut(room)?;
        let participant = state.participant_of(connection)?;
        if state.records.remove(&participant).is_some() {
            info!(%room, %participant, "Presence retracted");
            state.broadcast(&ServerFrame::PresenceRemoved { participant });
        }
        Ok(())
    }

    /// Stores `message` for `to` and pushes it to every socket `to` has open
    /// in the room.
    pub fn send(
        &self,
        room: &RoomId,
        connection: ConnectionId,
        to: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), RelayError> {
        let mut state = self.room_mut(room)?;
        let participant = state.participant_of(connection)?;
        if message.from != participant {
            return Err(RelayError::IdentityMismatch {
                connected: participant,
                claimed: message.from,
            });
        }

        // Nobody to hold it for: the recipient left, or never arrived.
        if !state.records.contains_key(to) && !state.is_connected(to) {
            debug!(%room, recipient = %to, id = %message.id, "Recipient absent, message dropped");
            return Ok(());
        }

        state.deliver(to, &message);

        let capacity = self.inner.mailbox_capacity;
        let mailbox = state.mailboxes.entry(to.clone()).or_default();
        if mailbox.len() >= capacity {
            if let Some(dropped) = mailbox.pop_front() {
                warn!(%room, recipient = %to, id = %dropped.id, "Mailbox full, dropping oldest message");
            }
        }
        mailbox.push_back(message);
        Ok(())
    }

    pub fn consume(&self, room: &RoomId, connection: ConnectionId, id: MessageId) -> Result<(), RelayError> {
        let mut state = self.room_mut(room)?;
        let participant = state.participant_of(connection)?;
        if let Some(mailbox) = state.mailboxes.get_mut(&participant) {
            mailbox.retain(|m| m.id != id);
            if mailbox.is_empty() {
                state.mailboxes.remove(&participant);
            }
        }
        Ok(())
    }

    /// Unregisters a socket and retracts the records it published. The
    /// participant's mailbox goes with its last socket, the room with its
    /// last participant.
    pub fn disconnect(&self, room: &RoomId, connection: ConnectionId) {
        {
            let Some(mut state) = self.inner.rooms.get_mut(room) else {
                return;
            };
            let Some(conn) = state.connections.remove(&connection) else {
                return;
            };

            let orphaned: Vec<ParticipantId> = state
                .records
                .iter()
                .filter(|(_, owned)| owned.owner == connection)
                .map(|(participant, _)| participant.clone())
                .collect();
            for participant in orphaned {
                state.records.remove(&participant);
                info!(%room, %participant, "Presence expired with its socket");
                state.broadcast(&ServerFrame::PresenceRemoved { participant });
            }

            if !state.is_connected(&conn.participant) {
                state.mailboxes.remove(&conn.participant);
            }
            info!(%room, participant = %conn.participant, connection, "Participant disconnected");
        }

        if self
            .inner
            .rooms
            .remove_if(room, |_, state| state.connections.is_empty())
            .is_some()
        {
            debug!(%room, "Room is empty, dropped");
        }
    }

    /// Presence records currently held for `room`, sorted by participant.
    pub fn presence(&self, room: &RoomId) -> Vec<PresenceRecord> {
        let Some(state) = self.inner.rooms.get(room) else {
            return Vec::new();
        };
        let mut records: Vec<PresenceRecord> = state.records.values().map(|o| o.record.clone()).collect();
        records.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        records
    }

    /// Number of unconsumed messages stored for `participant`.
    pub fn backlog(&self, room: &RoomId, participant: &ParticipantId) -> usize {
        self.inner
            .rooms
            .get(room)
            .and_then(|state| state.mailboxes.get(participant).map(VecDeque::len))
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    fn room_mut(&self, room: &RoomId) -> Result<dashmap::mapref::one::RefMut<'_, RoomId, RoomState>, RelayError> {
        self.inner
            .rooms
            .get_mut(room)
            .ok_or(RelayError::UnknownConnection)
    }
}
