use crate::error::{MailboxError, PresenceError};
use crate::signaling::{
    MailboxStream, PresenceChannel, PresenceStream, SignalingMailbox, receiver_stream,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use huddle_core::{
    ClientFrame, MessageId, ParticipantId, PresenceEvent, PresenceRecord, RoomId, ServerFrame,
    SignalingMessage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Base WebSocket URL of the relay, e.g. `ws://127.0.0.1:8080`.
    pub url: String,
    pub connect_attempts: u32,
    pub initial_backoff: Duration,
}

impl RelayClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_attempts: 5,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

struct RelayConnection {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    presence_rx: Mutex<Option<mpsc::UnboundedReceiver<PresenceEvent>>>,
    mailbox_rx: Mutex<Option<mpsc::UnboundedReceiver<SignalingMessage>>>,
    closed: CancellationToken,
}

impl RelayConnection {
    fn send(&self, frame: ClientFrame) -> Result<(), String> {
        if self.closed.is_cancelled() {
            return Err("relay connection closed".to_owned());
        }
        self.outbound
            .send(frame)
            .map_err(|_| "relay connection closed".to_owned())
    }
}

/// Presence channel and signaling mailbox backed by a `huddle-relay`
/// server. One socket is kept per room; the relay drops our presence
/// record when that socket goes away.
///
/// A room socket is dialed once. If the relay drops it, the presence and
/// mailbox streams end and every later call for that room fails until
/// [`PresenceChannel::retract`] forgets the dead connection. Redialing
/// would publish nothing under the old streams, so the room would look
/// alive while nobody could reach us.
#[derive(Clone)]
pub struct RelayClient {
    me: ParticipantId,
    config: RelayClientConfig,
    connections: Arc<DashMap<RoomId, Arc<RelayConnection>>>,
    next_id: Arc<AtomicU64>,
}

impl RelayClient {
    pub fn new(me: ParticipantId, config: RelayClientConfig) -> Self {
        Self {
            me,
            config,
            connections: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// True while the socket for `room` is open.
    pub fn is_connected(&self, room: &RoomId) -> bool {
        self.connections
            .get(room)
            .is_some_and(|conn| !conn.closed.is_cancelled())
    }

    async fn connection(&self, room: &RoomId) -> Result<Arc<RelayConnection>, String> {
        if let Some(conn) = self.connections.get(room) {
            if conn.closed.is_cancelled() {
                return Err("relay connection closed".to_owned());
            }
            return Ok(Arc::clone(conn.value()));
        }

        let socket = self.connect_with_backoff(room).await?;
        let conn = self.spawn_connection(room.clone(), socket);
        // Another caller may have connected while we were dialing.
        let entry = self
            .connections
            .entry(room.clone())
            .or_insert_with(|| Arc::clone(&conn));
        Ok(Arc::clone(entry.value()))
    }

    async fn connect_with_backoff(&self, room: &RoomId) -> Result<RelaySocket, String> {
        let url = format!(
            "{}/ws/{}/{}",
            self.config.url.trim_end_matches('/'),
            room,
            self.me
        );
        let mut delay = self.config.initial_backoff;
        let mut last_error = String::from("no connection attempts configured");

        for attempt in 1..=self.config.connect_attempts {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    info!(%room, %url, "Connected to relay");
                    return Ok(socket);
                }
                Err(e) => {
                    warn!(%room, attempt, "Relay connection failed: {}", e);
                    last_error = e.to_string();
                    if attempt < self.config.connect_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn spawn_connection(&self, room: RoomId, socket: RelaySocket) -> Arc<RelayConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mut sender, mut receiver) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = writer_closed.cancelled() => return,
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize relay frame: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    writer_closed.cancel();
                    return;
                }
            }
            let _ = sender.send(Message::Close(None)).await;
        });

        let reader_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                        Ok(ServerFrame::PresenceAdded { record }) => {
                            let _ = presence_tx.send(PresenceEvent::Added(record));
                        }
                        Ok(ServerFrame::PresenceRemoved { participant }) => {
                            let _ = presence_tx.send(PresenceEvent::Removed(participant));
                        }
                        Ok(ServerFrame::PresenceSynced) => {
                            let _ = presence_tx.send(PresenceEvent::Synced);
                        }
                        Ok(ServerFrame::Message { message }) => {
                            let _ = mailbox_tx.send(message);
                        }
                        Ok(ServerFrame::Error { reason }) => {
                            warn!(%room, "Relay reported an error: {}", reason);
                        }
                        Err(e) => warn!(%room, "Invalid frame from relay: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            // Dropping the senders ends both streams for the room actor.
            reader_closed.cancel();
            info!(%room, id, "Relay connection closed");
        });

        Arc::new(RelayConnection {
            outbound: outbound_tx,
            presence_rx: Mutex::new(Some(presence_rx)),
            mailbox_rx: Mutex::new(Some(mailbox_rx)),
            closed,
        })
    }
}

#[async_trait]
impl PresenceChannel for RelayClient {
    async fn publish(&self, room: &RoomId, record: PresenceRecord) -> Result<(), PresenceError> {
        let conn = self
            .connection(room)
            .await
            .map_err(PresenceError::Unreachable)?;
        conn.send(ClientFrame::Publish { record })
            .map_err(PresenceError::Unreachable)
    }

    /// Retracts our record and closes the room socket. A socket the relay
    /// already dropped took the record with it.
    async fn retract(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), PresenceError> {
        if participant != &self.me {
            debug!(%room, %participant, "Relay only retracts the connected participant");
        }
        let Some((_, conn)) = self.connections.remove(room) else {
            return Ok(());
        };
        if conn.closed.is_cancelled() {
            debug!(%room, "Relay connection already closed, nothing to retract");
            return Ok(());
        }
        conn.send(ClientFrame::Retract)
            .map_err(PresenceError::Unreachable)
    }

    async fn subscribe(&self, room: &RoomId) -> Result<PresenceStream, PresenceError> {
        let conn = self
            .connection(room)
            .await
            .map_err(PresenceError::Unreachable)?;
        let rx = conn.presence_rx.lock().await.take().ok_or_else(|| {
            PresenceError::Unreachable("presence already subscribed on this connection".to_owned())
        })?;
        Ok(receiver_stream(rx))
    }
}

#[async_trait]
impl SignalingMailbox for RelayClient {
    async fn send(
        &self,
        room: &RoomId,
        to: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), MailboxError> {
        let conn = self
            .connection(room)
            .await
            .map_err(MailboxError::Unavailable)?;
        conn.send(ClientFrame::Send {
            to: to.clone(),
            message,
        })
        .map_err(MailboxError::Unavailable)
    }

    async fn subscribe(&self, room: &RoomId, _me: &ParticipantId) -> Result<MailboxStream, MailboxError> {
        let conn = self
            .connection(room)
            .await
            .map_err(MailboxError::Unavailable)?;
        let rx = conn.mailbox_rx.lock().await.take().ok_or_else(|| {
            MailboxError::Unavailable("mailbox already subscribed on this connection".to_owned())
        })?;
        Ok(receiver_stream(rx))
    }

    async fn consume(&self, room: &RoomId, _me: &ParticipantId, id: MessageId) -> Result<(), MailboxError> {
        let Some(conn) = self.connections.get(room).map(|c| Arc::clone(c.value())) else {
            return Err(MailboxError::Closed);
        };
        conn.send(ClientFrame::Consume { id })
            .map_err(MailboxError::Unavailable)
    }
}
