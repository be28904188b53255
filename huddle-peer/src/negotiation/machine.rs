use crate::error::NegotiationError;
use crate::media::LocalTrack;
use crate::negotiation::{NegotiationRole, NegotiationState};
use crate::transport::{LinkContext, LinkEvent, LinkFactory, LinkState, PeerLink, TransportEvent};
use anyhow::anyhow;
use huddle_core::{CandidateData, ParticipantId, SignalPayload};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Inputs to a [`NegotiationMachine`].
#[derive(Debug)]
pub enum NegotiationEvent {
    /// Begin negotiating. Only meaningful for an initiator in `New`.
    Start,
    /// An offer, answer or candidate from the remote participant.
    Remote(SignalPayload),
    /// Something the current (or a replaced) link reported.
    Link(LinkEvent),
    /// No inbound progress within the negotiation window.
    Timeout,
    Close,
}

/// Offer/answer/candidate exchange with one remote participant.
///
/// The machine owns the peer link. Every event is applied in the order it
/// is handed in; unlisted `(state, event)` pairs are ignored. Remote
/// candidates that arrive before the remote description are queued and
/// applied in arrival order once it is set.
pub struct NegotiationMachine {
    local: ParticipantId,
    remote: ParticipantId,
    role: NegotiationRole,
    state: NegotiationState,
    links: Arc<dyn LinkFactory>,
    tracks: Vec<LocalTrack>,
    events: mpsc::Sender<LinkEvent>,
    link: Option<Box<dyn PeerLink>>,
    generation: u32,
    remote_description_set: bool,
    pending_candidates: VecDeque<CandidateData>,
    failure: Option<String>,
}

impl NegotiationMachine {
    pub fn new(
        local: ParticipantId,
        remote: ParticipantId,
        role: NegotiationRole,
        links: Arc<dyn LinkFactory>,
        tracks: Vec<LocalTrack>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            local,
            remote,
            role,
            state: NegotiationState::New,
            links,
            tracks,
            events,
            link: None,
            generation: 0,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
            failure: None,
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Generation of the current link. Bumped every time a link is created.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Reason for the last transition to `Failed`, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Applies one event and returns the payloads to send to the remote.
    ///
    /// Errors are scoped to this peer: they move the machine to `Failed`
    /// and close the link.
    pub async fn handle(&mut self, event: NegotiationEvent) -> Vec<SignalPayload> {
        let result = match event {
            NegotiationEvent::Start => self.on_start().await,
            NegotiationEvent::Remote(SignalPayload::Offer { sdp }) => self.on_remote_offer(sdp).await,
            NegotiationEvent::Remote(SignalPayload::Answer { sdp }) => {
                self.on_remote_answer(sdp).await
            }
            NegotiationEvent::Remote(SignalPayload::Candidate(candidate)) => {
                self.on_remote_candidate(candidate).await
            }
            NegotiationEvent::Link(event) => self.on_link_event(event),
            NegotiationEvent::Timeout => self.on_timeout(),
            NegotiationEvent::Close => {
                self.close().await;
                Ok(Vec::new())
            }
        };

        match result {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(remote = %self.remote, state = %self.state, "Negotiation failed: {}", e);
                self.fail(e.to_string()).await;
                Vec::new()
            }
        }
    }

    /// Closes the link and moves to `Closed`. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.transition(NegotiationState::Closed);
        self.release_link().await;
        self.pending_candidates.clear();
    }

    async fn on_start(&mut self) -> Result<Vec<SignalPayload>, NegotiationError> {
        if self.state != NegotiationState::New || self.role != NegotiationRole::Initiator {
            debug!(remote = %self.remote, state = %self.state, role = ?self.role, "Ignoring start");
            return Ok(Vec::new());
        }

        let sdp = self.ensure_link().await?.create_offer().await?;
        self.transition(NegotiationState::OfferSent);
        Ok(vec![SignalPayload::Offer { sdp }])
    }

    async fn on_remote_offer(&mut self, sdp: String) -> Result<Vec<SignalPayload>, NegotiationError> {
        match self.state {
            NegotiationState::New => self.accept_offer(sdp).await,
            NegotiationState::OfferSent if self.local < self.remote => {
                info!(remote = %self.remote, "Offer collision, yielding to remote offer");
                self.release_link().await;
                self.role = NegotiationRole::Responder;
                self.transition(NegotiationState::New);
                self.accept_offer(sdp).await
            }
            NegotiationState::OfferSent => {
                debug!(remote = %self.remote, "Offer collision, keeping local offer");
                Ok(Vec::new())
            }
            state => {
                debug!(remote = %self.remote, %state, "Ignoring offer");
                Ok(Vec::new())
            }
        }
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<Vec<SignalPayload>, NegotiationError> {
        self.ensure_link().await?.set_remote_offer(sdp).await?;
        self.remote_description_set = true;
        self.transition(NegotiationState::OfferReceived);
        self.flush_candidates().await?;

        let answer = self.current_link()?.create_answer().await?;
        Ok(vec![SignalPayload::Answer { sdp: answer }])
    }

    async fn on_remote_answer(&mut self, sdp: String) -> Result<Vec<SignalPayload>, NegotiationError> {
        if self.state != NegotiationState::OfferSent {
            debug!(remote = %self.remote, state = %self.state, "Ignoring answer");
            return Ok(Vec::new());
        }

        self.current_link()?.set_remote_answer(sdp).await?;
        self.remote_description_set = true;
        self.transition(NegotiationState::AnswerExchanged);
        self.flush_candidates().await?;
        Ok(Vec::new())
    }

    async fn on_remote_candidate(
        &mut self,
        candidate: CandidateData,
    ) -> Result<Vec<SignalPayload>, NegotiationError> {
        if self.state.is_terminal() {
            debug!(remote = %self.remote, state = %self.state, "Ignoring candidate");
            return Ok(Vec::new());
        }

        if self.remote_description_set {
            self.current_link()?.add_remote_candidate(candidate).await?;
        } else {
            debug!(remote = %self.remote, queued = self.pending_candidates.len() + 1, "Queueing early candidate");
            self.pending_candidates.push_back(candidate);
        }
        Ok(Vec::new())
    }

    fn on_link_event(&mut self, event: LinkEvent) -> Result<Vec<SignalPayload>, NegotiationError> {
        if self.link.is_none() || event.generation != self.generation {
            debug!(remote = %self.remote, generation = event.generation, "Dropping event from a replaced link");
            return Ok(Vec::new());
        }
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        match event.event {
            TransportEvent::CandidateGenerated(candidate) => {
                Ok(vec![SignalPayload::Candidate(candidate)])
            }
            TransportEvent::StateChanged(LinkState::Connected) => {
                if matches!(
                    self.state,
                    NegotiationState::OfferReceived | NegotiationState::AnswerExchanged
                ) {
                    self.transition(NegotiationState::Connected);
                }
                Ok(Vec::new())
            }
            TransportEvent::StateChanged(LinkState::Failed) => {
                Err(NegotiationError::Link(anyhow!("transport failed")))
            }
            TransportEvent::StateChanged(LinkState::Closed) => {
                Err(NegotiationError::Link(anyhow!("transport closed")))
            }
            TransportEvent::StateChanged(state) => {
                debug!(remote = %self.remote, ?state, "Link state");
                Ok(Vec::new())
            }
            TransportEvent::RemoteTrack(_) => Ok(Vec::new()),
        }
    }

    fn on_timeout(&mut self) -> Result<Vec<SignalPayload>, NegotiationError> {
        if self.state == NegotiationState::Connected || self.state.is_terminal() {
            return Ok(Vec::new());
        }
        Err(NegotiationError::Link(anyhow!(
            "no progress while in {}",
            self.state
        )))
    }

    async fn ensure_link(&mut self) -> Result<&dyn PeerLink, NegotiationError> {
        if self.link.is_none() {
            self.generation += 1;
            let link = self
                .links
                .create(LinkContext {
                    remote: self.remote.clone(),
                    generation: self.generation,
                    tracks: self.tracks.clone(),
                    events: self.events.clone(),
                })
                .await?;
            self.link = Some(link);
        }
        self.current_link()
    }

    fn current_link(&self) -> Result<&dyn PeerLink, NegotiationError> {
        self.link
            .as_deref()
            .ok_or_else(|| NegotiationError::Link(anyhow!("no link for {}", self.remote)))
    }

    async fn flush_candidates(&mut self) -> Result<(), NegotiationError> {
        let Some(link) = self.link.as_deref() else {
            return Ok(());
        };
        while let Some(candidate) = self.pending_candidates.pop_front() {
            link.add_remote_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn release_link(&mut self) {
        self.remote_description_set = false;
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                debug!(remote = %self.remote, "Link close error: {}", e);
            }
        }
    }

    async fn fail(&mut self, reason: String) {
        if self.state.is_terminal() {
            return;
        }
        self.failure = Some(reason);
        self.transition(NegotiationState::Failed);
        self.release_link().await;
        self.pending_candidates.clear();
    }

    fn transition(&mut self, to: NegotiationState) {
        debug!(remote = %self.remote, from = %self.state, %to, "Negotiation transition");
        self.state = to;
    }
}
