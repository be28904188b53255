use crate::error::RelayError;
use crate::signaling::{ConnectionId, RelayState};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use huddle_core::{ClientFrame, ParticipantId, RoomId, ServerFrame};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room, participant)): Path<(String, String)>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    let room = RoomId::from(room);
    let participant = ParticipantId::from(participant);

    ws.on_upgrade(move |socket| handle_socket(socket, room, participant, state))
}

async fn handle_socket(socket: WebSocket, room: RoomId, participant: ParticipantId, state: RelayState) {
    info!(%room, %participant, "New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection = state.connect(&room, &participant, tx.clone());

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let room = room.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        let handled = serde_json::from_str::<ClientFrame>(text.as_str())
                            .map_err(|e| RelayError::MalformedFrame(e.to_string()))
                            .and_then(|frame| apply(&state, &room, connection, frame));
                        if let Err(e) = handled {
                            warn!(%room, %participant, "Rejected client frame: {}", e);
                            let _ = tx.send(ServerFrame::Error {
                                reason: e.to_string(),
                            });
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.disconnect(&room, connection);
    info!(%room, %participant, "WebSocket disconnected");
}

fn apply(state: &RelayState, room: &RoomId, connection: ConnectionId, frame: ClientFrame) -> Result<(), RelayError> {
    match frame {
        ClientFrame::Publish { record } => state.publish(room, connection, record),
        ClientFrame::Retract => state.retract(room, connection),
        ClientFrame::Send { to, message } => state.send(room, connection, &to, message),
        ClientFrame::Consume { id } => state.consume(room, connection, id),
    }
}
