use crate::error::MediaError;
use crate::media::{LocalMedia, LocalTrack, MediaConstraints, MediaDevice, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const VIDEO_FRAME: Duration = Duration::from_millis(33);
const AUDIO_FRAME: Duration = Duration::from_millis(20);

/// A device with no hardware behind it. Each acquired track is fed blank
/// frames at its natural rate until the media is released; a disabled
/// track skips them. Used by the CLI and for headless peers.
pub struct SyntheticMediaDevice {
    stream_id: String,
}

impl SyntheticMediaDevice {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }

    fn track(&self, kind: TrackKind) -> LocalTrack {
        let mime_type = match kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let rtp = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            format!("{}-{}", self.stream_id, kind),
            self.stream_id.clone(),
        );
        LocalTrack::new(kind, Arc::new(rtp), true)
    }
}

/// Writes a blank frame every `frame` until `stop` fires.
async fn feed_blank_frames(track: LocalTrack, stop: CancellationToken) {
    let (frame, size) = match track.kind() {
        TrackKind::Video => (VIDEO_FRAME, 1200),
        TrackKind::Audio => (AUDIO_FRAME, 160),
    };
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let sample = Sample {
            data: vec![0u8; size].into(),
            duration: frame,
            timestamp: std::time::SystemTime::now(),
            ..Default::default()
        };
        if let Err(e) = track.write_sample(&sample).await {
            warn!(track = track.id(), "Failed to write sample: {}", e);
        }
    }
    debug!(track = track.id(), sent = track.samples_sent(), "Sample feed stopped");
}

impl Default for SyntheticMediaDevice {
    fn default() -> Self {
        Self::new("huddle")
    }
}

#[async_trait]
impl MediaDevice for SyntheticMediaDevice {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia, MediaError> {
        let mut tracks = Vec::new();
        if constraints.video.is_some() {
            tracks.push(self.track(TrackKind::Video));
        }
        if constraints.audio.is_some() {
            tracks.push(self.track(TrackKind::Audio));
        }
        if tracks.is_empty() {
            return Err(MediaError::NotFound);
        }

        let media = LocalMedia::new(tracks);
        for track in media.tracks() {
            tokio::spawn(feed_blank_frames(track.clone(), media.feed_token()));
        }
        info!(stream = %self.stream_id, tracks = media.tracks().len(), "Local stream started");
        Ok(media)
    }

    async fn release(&self, media: LocalMedia) {
        media.stop_feeding();
        debug!(stream = %self.stream_id, tracks = media.tracks().len(), "Local stream released");
    }
}
