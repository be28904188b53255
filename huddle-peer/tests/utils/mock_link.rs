use anyhow::Result;
use async_trait::async_trait;
use huddle_core::{CandidateData, ParticipantId};
use huddle_peer::NegotiationError;
use huddle_peer::media::LocalTrack;
use huddle_peer::transport::{
    LinkContext, LinkEvent, LinkFactory, LinkState, PeerLink, TransportEvent,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Everything the mock links of one participant did.
#[derive(Debug, Default)]
pub struct LinkJournal {
    /// `(remote, generation)` for every link opened.
    pub created: Vec<(ParticipantId, u32)>,
    pub closed: usize,
    /// Remote candidates applied, per remote, in application order.
    pub applied: HashMap<ParticipantId, Vec<String>>,
    /// Remote descriptions and candidates as they were applied, per remote.
    pub remote_ops: HashMap<ParticipantId, Vec<String>>,
    /// Local tracks attached to the links opened to each remote.
    pub tracks: HashMap<ParticipantId, Vec<LocalTrack>>,
}

impl LinkJournal {
    pub fn open_links(&self) -> usize {
        self.created.len() - self.closed
    }

    pub fn links_to(&self, remote: &str) -> usize {
        self.created.iter().filter(|(r, _)| r.as_str() == remote).count()
    }

    pub fn applied_from(&self, remote: &str) -> Vec<String> {
        self.applied
            .get(&ParticipantId::from(remote))
            .cloned()
            .unwrap_or_default()
    }

    /// `set-remote-offer`, `set-remote-answer` and candidate strings, in
    /// the order the link saw them.
    pub fn remote_ops_from(&self, remote: &str) -> Vec<String> {
        self.remote_ops
            .get(&ParticipantId::from(remote))
            .cloned()
            .unwrap_or_default()
    }

    pub fn attached_tracks(&self) -> Vec<LocalTrack> {
        self.tracks.values().flatten().cloned().collect()
    }
}

/// Link factory whose links need no network.
///
/// Each link emits one local candidate when its local description is set
/// and reports `Connected` once both descriptions are in place. SDP that is
/// empty or `"garbage"` and candidates not starting with `candidate:` are
/// rejected.
#[derive(Clone)]
pub struct MockLinkFactory {
    owner: ParticipantId,
    journal: Arc<Mutex<LinkJournal>>,
}

impl MockLinkFactory {
    pub fn new(owner: impl Into<ParticipantId>) -> Self {
        Self {
            owner: owner.into(),
            journal: Arc::new(Mutex::new(LinkJournal::default())),
        }
    }

    pub fn journal(&self) -> Arc<Mutex<LinkJournal>> {
        Arc::clone(&self.journal)
    }
}

#[async_trait]
impl LinkFactory for MockLinkFactory {
    async fn create(&self, ctx: LinkContext) -> Result<Box<dyn PeerLink>> {
        {
            let mut journal = self.journal.lock().unwrap();
            journal.created.push((ctx.remote.clone(), ctx.generation));
            journal
                .tracks
                .entry(ctx.remote.clone())
                .or_default()
                .extend(ctx.tracks.iter().cloned());
        }

        Ok(Box::new(MockLink {
            owner: self.owner.clone(),
            remote: ctx.remote,
            generation: ctx.generation,
            events: ctx.events,
            journal: Arc::clone(&self.journal),
            descriptions: Mutex::new((false, false)),
        }))
    }
}

struct MockLink {
    owner: ParticipantId,
    remote: ParticipantId,
    generation: u32,
    events: mpsc::Sender<LinkEvent>,
    journal: Arc<Mutex<LinkJournal>>,
    /// (local set, remote set)
    descriptions: Mutex<(bool, bool)>,
}

impl MockLink {
    async fn emit(&self, event: TransportEvent) {
        let _ = self
            .events
            .send(LinkEvent {
                generation: self.generation,
                event,
            })
            .await;
    }

    async fn description_set(&self, local: bool) {
        let connected = {
            let mut d = self.descriptions.lock().unwrap();
            if local {
                d.0 = true;
            } else {
                d.1 = true;
            }
            d.0 && d.1
        };

        if local {
            let candidate = format!("candidate:{}-{}", self.owner, self.generation);
            self.emit(TransportEvent::CandidateGenerated(CandidateData::new(candidate)))
                .await;
        }
        if connected {
            self.emit(TransportEvent::StateChanged(LinkState::Connected))
                .await;
        }
    }

    fn record_remote(&self, op: impl Into<String>) {
        self.journal
            .lock()
            .unwrap()
            .remote_ops
            .entry(self.remote.clone())
            .or_default()
            .push(op.into());
    }

    fn check_sdp(sdp: &str) -> Result<(), NegotiationError> {
        if sdp.is_empty() || sdp == "garbage" {
            return Err(NegotiationError::MalformedDescription(sdp.to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for MockLink {
    async fn create_offer(&self) -> Result<String> {
        let sdp = format!("offer:{}:{}", self.owner, self.generation);
        self.description_set(true).await;
        Ok(sdp)
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<(), NegotiationError> {
        Self::check_sdp(&sdp)?;
        self.record_remote("set-remote-offer");
        self.description_set(false).await;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        let sdp = format!("answer:{}:{}", self.owner, self.generation);
        self.description_set(true).await;
        Ok(sdp)
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), NegotiationError> {
        Self::check_sdp(&sdp)?;
        self.record_remote("set-remote-answer");
        self.description_set(false).await;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: CandidateData) -> Result<(), NegotiationError> {
        if !candidate.candidate.starts_with("candidate:") {
            return Err(NegotiationError::MalformedCandidate(candidate.candidate));
        }
        self.record_remote(candidate.candidate.as_str());
        self.journal
            .lock()
            .unwrap()
            .applied
            .entry(self.remote.clone())
            .or_default()
            .push(candidate.candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.journal.lock().unwrap().closed += 1;
        Ok(())
    }
}
