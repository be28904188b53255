use crate::negotiation::{NegotiationRole, NegotiationState, PeerCommand};
use huddle_core::ParticipantId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub participant: ParticipantId,
    pub role: NegotiationRole,
    pub state: NegotiationState,
}

pub(crate) struct PeerEntry {
    pub role: NegotiationRole,
    pub state: NegotiationState,
    pub epoch: u64,
    commands: mpsc::UnboundedSender<PeerCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PeerEntry {
    pub fn new(
        role: NegotiationRole,
        epoch: u64,
        commands: mpsc::UnboundedSender<PeerCommand>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            role,
            state: NegotiationState::New,
            epoch,
            commands,
            cancel,
            task,
        }
    }

    /// Hands a command to the peer task. False if the task has ended.
    pub fn send(&self, command: PeerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Cancels the peer task. The returned handle resolves once its link
    /// is closed.
    pub fn shutdown(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

/// Peer entries keyed by remote participant. Owned by the room actor, so
/// it needs no locking.
#[derive(Default)]
pub(crate) struct PeerRegistry {
    peers: HashMap<ParticipantId, PeerEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless an entry already exists, in which case `entry` is
    /// handed back untouched.
    pub fn insert(&mut self, participant: ParticipantId, entry: PeerEntry) -> Result<(), PeerEntry> {
        if self.peers.contains_key(&participant) {
            return Err(entry);
        }
        self.peers.insert(participant, entry);
        Ok(())
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<&PeerEntry> {
        self.peers.get(participant)
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.peers.contains_key(participant)
    }

    pub fn remove(&mut self, participant: &ParticipantId) -> Option<PeerEntry> {
        self.peers.remove(participant)
    }

    /// Removes the entry only if it still belongs to `epoch`.
    pub fn remove_epoch(&mut self, participant: &ParticipantId, epoch: u64) -> Option<PeerEntry> {
        match self.peers.get(participant) {
            Some(entry) if entry.epoch == epoch => self.peers.remove(participant),
            _ => None,
        }
    }

    /// Records a state reported by the task of `epoch`. Returns false for
    /// reports from tasks whose entry is gone or was replaced.
    pub fn update_state(&mut self, participant: &ParticipantId, epoch: u64, state: NegotiationState) -> bool {
        match self.peers.get_mut(participant) {
            Some(entry) if entry.epoch == epoch => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    pub fn is_current(&self, participant: &ParticipantId, epoch: u64) -> bool {
        self.peers
            .get(participant)
            .is_some_and(|entry| entry.epoch == epoch)
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn drain(&mut self) -> Vec<(ParticipantId, PeerEntry)> {
        self.peers.drain().collect()
    }

    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> = self
            .peers
            .iter()
            .map(|(participant, entry)| PeerSnapshot {
                participant: participant.clone(),
                role: entry.role,
                state: entry.state,
            })
            .collect();
        peers.sort_by(|a, b| a.participant.cmp(&b.participant));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
