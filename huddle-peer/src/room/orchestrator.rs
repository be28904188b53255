use crate::config::OrchestratorConfig;
use crate::error::JoinError;
use crate::media::{LocalMedia, MediaDevice, TrackKind};
use crate::room::room_actor::{RoomActor, RoomActorParts};
use crate::room::room_command::RoomCommand;
use crate::room::{NoopObserver, PeerSnapshot, RoomObserver};
use crate::signaling::{PresenceChannel, SignalingMailbox};
use crate::transport::LinkFactory;
use huddle_core::{ParticipantId, PresenceRecord, RoomId};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// External services the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub presence: Arc<dyn PresenceChannel>,
    pub mailbox: Arc<dyn SignalingMailbox>,
    pub media: Arc<dyn MediaDevice>,
    pub links: Arc<dyn LinkFactory>,
}

struct Session {
    room: RoomId,
    media: LocalMedia,
    commands: mpsc::Sender<RoomCommand>,
    task: JoinHandle<()>,
}

/// Joins rooms and keeps one peer link per present participant.
///
/// Only one room is joined at a time. All per-room state lives in a room
/// actor task; this handle starts and stops it and forwards media toggles.
pub struct Orchestrator {
    profile: PresenceRecord,
    config: OrchestratorConfig,
    collaborators: Collaborators,
    observer: Arc<dyn RoomObserver>,
    session: Mutex<Option<Session>>,
    join_cancel: Mutex<CancellationToken>,
    video_enabled: AtomicBool,
    audio_enabled: AtomicBool,
}

async fn cancellable<T, E>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, JoinError>
where
    E: Into<JoinError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(JoinError::Cancelled),
        r = fut => r.map_err(Into::into),
    }
}

impl Orchestrator {
    /// `profile` is the record published on every join; its timestamp is
    /// refreshed each time.
    pub fn new(profile: PresenceRecord, config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        Self {
            profile,
            config,
            collaborators,
            observer: Arc::new(NoopObserver),
            session: Mutex::new(None),
            join_cancel: Mutex::new(CancellationToken::new()),
            video_enabled: AtomicBool::new(true),
            audio_enabled: AtomicBool::new(true),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoomObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.profile.participant_id
    }

    /// Joins `room`, leaving the current room first if there is one.
    ///
    /// On error nothing from this attempt is left behind: no presence
    /// record, no subscriptions, no captured media.
    pub async fn join_room(&self, room: impl Into<RoomId>) -> Result<(), JoinError> {
        let room = room.into();
        let token = {
            let mut current = self.join_cancel.lock().await;
            current.cancel();
            *current = CancellationToken::new();
            current.clone()
        };

        let mut session = self.session.lock().await;
        if token.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        if let Some(previous) = session.take() {
            info!(from = %previous.room, to = %room, "Leaving current room before joining");
            self.shutdown(previous).await;
        }

        let started = self.start(&room, &token).await;
        match started {
            Ok(s) => {
                *session = Some(s);
                Ok(())
            }
            Err(e) => {
                error!(%room, "Failed to join room: {}", e);
                Err(e)
            }
        }
    }

    /// Leaves the current room, interrupting a join that is still in
    /// progress. Does nothing when not in a room.
    pub async fn leave_room(&self) {
        self.join_cancel.lock().await.cancel();

        let mut session = self.session.lock().await;
        let Some(current) = session.take() else {
            debug!("Not in a room");
            return;
        };
        self.shutdown(current).await;
    }

    /// Flips the local video track for every peer. Returns the new state.
    pub async fn toggle_local_video(&self) -> bool {
        self.toggle(TrackKind::Video).await
    }

    /// Flips the local audio track for every peer. Returns the new state.
    pub async fn toggle_local_audio(&self) -> bool {
        self.toggle(TrackKind::Audio).await
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::Acquire)
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Acquire)
    }

    /// The joined room. `None` once the room was lost, even before
    /// `leave_room` cleans up after it.
    pub async fn current_room(&self) -> Option<RoomId> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.room.clone())
    }

    /// Peers currently in the registry, sorted by participant.
    pub async fn registered_peers(&self) -> Vec<PeerSnapshot> {
        self.snapshot().await.map(|(_, peers)| peers).unwrap_or_default()
    }

    /// Remote participants currently believed present, sorted by id.
    pub async fn members(&self) -> Vec<PresenceRecord> {
        self.snapshot().await.map(|(members, _)| members).unwrap_or_default()
    }

    async fn snapshot(&self) -> Option<(Vec<PresenceRecord>, Vec<PeerSnapshot>)> {
        let session = self.session.lock().await;
        let current = session.as_ref()?;
        let (reply, rx) = oneshot::channel();
        current.commands.send(RoomCommand::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    async fn toggle(&self, kind: TrackKind) -> bool {
        let preference = match kind {
            TrackKind::Video => &self.video_enabled,
            TrackKind::Audio => &self.audio_enabled,
        };

        let session = self.session.lock().await;
        let current = preference.load(Ordering::Acquire);
        let Some(active) = session.as_ref() else {
            debug!(%kind, "Not in a room, toggle ignored");
            return current;
        };

        let enabled = !current;
        let (reply, rx) = oneshot::channel();
        let command = RoomCommand::SetTrackEnabled {
            kind,
            enabled,
            reply,
        };
        if active.commands.send(command).await.is_err() {
            warn!(room = %active.room, "Room task is gone, toggle ignored");
            return current;
        }
        match rx.await {
            Ok(true) => {
                preference.store(enabled, Ordering::Release);
                enabled
            }
            _ => current,
        }
    }

    async fn start(&self, room: &RoomId, token: &CancellationToken) -> Result<Session, JoinError> {
        let me = self.profile.participant_id.clone();
        let Collaborators {
            presence,
            mailbox,
            media: device,
            links,
        } = &self.collaborators;
        info!(%room, %me, "Joining room");

        let media = cancellable(token, device.acquire(&self.config.media)).await?;
        media.set_enabled(TrackKind::Video, self.is_video_enabled());
        media.set_enabled(TrackKind::Audio, self.is_audio_enabled());

        let presence_events = match cancellable(token, presence.subscribe(room)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.rollback(room, media).await;
                return Err(e);
            }
        };

        let messages = match cancellable(token, mailbox.subscribe(room, &me)).await {
            Ok(stream) => stream,
            Err(e) => {
                drop(presence_events);
                self.rollback(room, media).await;
                return Err(e);
            }
        };

        let mut published = cancellable(token, presence.publish(room, self.profile.rejoined())).await;
        if published.is_ok() && token.is_cancelled() {
            published = Err(JoinError::Cancelled);
        }
        if let Err(e) = published {
            drop(messages);
            drop(presence_events);
            self.rollback(room, media).await;
            return Err(e);
        }

        let (command_tx, command_rx) = mpsc::channel(32);
        let actor = RoomActor::new(RoomActorParts {
            room: room.clone(),
            me,
            config: self.config.clone(),
            media: media.clone(),
            commands: command_rx,
            presence: presence_events,
            messages,
            mailbox: Arc::clone(mailbox),
            links: Arc::clone(links),
            observer: Arc::clone(&self.observer),
        });
        let task = tokio::spawn(actor.run());

        info!(%room, "Joined room");
        Ok(Session {
            room: room.clone(),
            media,
            commands: command_tx,
            task,
        })
    }

    /// Undoes a partial join. Retracting is harmless when nothing was
    /// published, and the publish may have landed before a failure was seen.
    async fn rollback(&self, room: &RoomId, media: LocalMedia) {
        debug!(%room, "Rolling back join");
        let me = &self.profile.participant_id;
        if let Err(e) = self.collaborators.presence.retract(room, me).await {
            warn!(%room, "Failed to retract presence during rollback: {}", e);
        }
        self.collaborators.media.release(media).await;
    }

    async fn shutdown(&self, session: Session) {
        let Session {
            room,
            media,
            commands,
            task,
        } = session;
        info!(%room, "Leaving room");

        let (reply, rx) = oneshot::channel();
        if commands.send(RoomCommand::Leave { reply }).await.is_ok() {
            let _ = rx.await;
        }
        drop(commands);
        if let Err(e) = task.await {
            warn!(%room, "Room task ended abnormally: {}", e);
        }

        self.collaborators.media.release(media).await;
        let me = &self.profile.participant_id;
        if let Err(e) = self.collaborators.presence.retract(&room, me).await {
            warn!(%room, "Failed to retract presence: {}", e);
        }
        info!(%room, "Left room");
    }
}
