use crate::error::NegotiationError;
use crate::media::TrackKind;
use crate::transport::{
    LinkContext, LinkEvent, LinkFactory, LinkState, PeerLink, TransportConfig, TransportEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use huddle_core::{CandidateData, ParticipantId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Opens real WebRTC peer connections.
pub struct WebRtcLinkFactory {
    config: TransportConfig,
}

impl WebRtcLinkFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LinkFactory for WebRtcLinkFactory {
    async fn create(&self, ctx: LinkContext) -> Result<Box<dyn PeerLink>> {
        let link = WebRtcLink::new(ctx, &self.config).await?;
        Ok(Box::new(link))
    }
}

pub struct WebRtcLink {
    remote: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcLink {
    /// Builds a peer connection, attaches the shared local tracks and wires
    /// its callbacks into `ctx.events`.
    pub async fn new(ctx: LinkContext, config: &TransportConfig) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        for track in &ctx.tracks {
            let rtp: Arc<dyn TrackLocal + Send + Sync> = track.rtp();
            let sender = peer_connection.add_track(rtp).await?;
            // RTCP has to be drained for interceptors (NACK, reports) to work.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }

        Self::wire_callbacks(&peer_connection, &ctx.remote, ctx.generation, ctx.events);

        Ok(Self {
            remote: ctx.remote,
            peer_connection,
        })
    }

    fn wire_callbacks(
        peer_connection: &RTCPeerConnection,
        remote: &ParticipantId,
        generation: u32,
        events: mpsc::Sender<LinkEvent>,
    ) {
        let state_tx = events.clone();
        let state_remote = remote.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let remote = state_remote.clone();

                Box::pin(async move {
                    info!(participant = %remote, state = ?s, "Peer connection state changed");
                    let state = match s {
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkState::Failed,
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                        _ => LinkState::Connecting,
                    };
                    let _ = tx
                        .send(LinkEvent {
                            generation,
                            event: TransportEvent::StateChanged(state),
                        })
                        .await;
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = CandidateData {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(LinkEvent {
                        generation,
                        event: TransportEvent::CandidateGenerated(candidate),
                    })
                    .await;
            })
        }));

        let track_tx = events;
        let track_remote = remote.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let remote = track_remote.clone();

                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        _ => return,
                    };
                    debug!(participant = %remote, %kind, "Received remote track");
                    let _ = tx
                        .send(LinkEvent {
                            generation,
                            event: TransportEvent::RemoteTrack(kind),
                        })
                        .await;
                })
            },
        ));
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<(), NegotiationError> {
        let desc = RTCSessionDescription::offer(sdp)
            .map_err(|e| NegotiationError::MalformedDescription(e.to_string()))?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::MalformedDescription(e.to_string()))
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), NegotiationError> {
        let desc = RTCSessionDescription::answer(sdp)
            .map_err(|e| NegotiationError::MalformedDescription(e.to_string()))?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::MalformedDescription(e.to_string()))
    }

    async fn add_remote_candidate(&self, candidate: CandidateData) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| NegotiationError::MalformedCandidate(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        debug!(participant = %self.remote, "Closing peer connection");
        self.peer_connection.close().await?;
        Ok(())
    }
}
