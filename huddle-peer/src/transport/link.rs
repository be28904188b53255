use crate::error::NegotiationError;
use crate::media::LocalTrack;
use crate::transport::LinkEvent;
use anyhow::Result;
use async_trait::async_trait;
use huddle_core::{CandidateData, ParticipantId};
use tokio::sync::mpsc;

/// One offer/answer + trickle-candidate connection to a remote participant.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<String>;

    async fn set_remote_offer(&self, sdp: String) -> Result<(), NegotiationError>;

    /// Creates an answer and installs it as the local description.
    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_answer(&self, sdp: String) -> Result<(), NegotiationError>;

    async fn add_remote_candidate(&self, candidate: CandidateData) -> Result<(), NegotiationError>;

    async fn close(&self) -> Result<()>;
}

/// Everything a factory needs to open a link.
pub struct LinkContext {
    pub remote: ParticipantId,
    pub generation: u32,
    pub tracks: Vec<LocalTrack>,
    pub events: mpsc::Sender<LinkEvent>,
}

#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn create(&self, ctx: LinkContext) -> Result<Box<dyn PeerLink>>;
}
