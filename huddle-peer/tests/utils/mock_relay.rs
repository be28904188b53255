use futures::{SinkExt, StreamExt};
use huddle_core::{ClientFrame, ParticipantId, PresenceRecord, ServerFrame};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// A bare WebSocket relay the test can pull the plug on. Every socket gets
/// the configured members followed by `PresenceSynced`; client frames are
/// recorded and otherwise ignored.
pub struct MockRelay {
    addr: SocketAddr,
    dials: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<ClientFrame>>>,
    hangup: Arc<Mutex<CancellationToken>>,
    task: JoinHandle<()>,
}

impl MockRelay {
    pub async fn start() -> Self {
        Self::with_members(&[]).await
    }

    pub async fn with_members(members: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let members: Vec<PresenceRecord> = members
            .iter()
            .map(|id| PresenceRecord::new(ParticipantId::from(*id), *id))
            .collect();

        let dials = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let hangup = Arc::new(Mutex::new(CancellationToken::new()));

        let task = {
            let dials = dials.clone();
            let frames = frames.clone();
            let hangup = hangup.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    dials.fetch_add(1, Ordering::SeqCst);
                    let token = hangup.lock().unwrap().clone();
                    tokio::spawn(serve(stream, members.clone(), frames.clone(), token));
                }
            })
        };

        Self {
            addr,
            dials,
            frames,
            hangup,
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Sockets accepted so far.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().unwrap().clone()
    }

    /// Closes every open socket. New dials are still accepted.
    pub fn drop_connections(&self) {
        let mut token = self.hangup.lock().unwrap();
        token.cancel();
        *token = CancellationToken::new();
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.hangup.lock().unwrap().cancel();
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    members: Vec<PresenceRecord>,
    frames: Arc<Mutex<Vec<ClientFrame>>>,
    hangup: CancellationToken,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let snapshot = members
        .into_iter()
        .map(|record| ServerFrame::PresenceAdded { record })
        .chain(std::iter::once(ServerFrame::PresenceSynced));
    for frame in snapshot {
        let json = serde_json::to_string(&frame).unwrap();
        if ws.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = hangup.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<ClientFrame>(text.as_str()) {
                        frames.lock().unwrap().push(frame);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
