use crate::integration::{init_tracing, start_relay};
use crate::utils::WsClient;
use huddle_core::{ClientFrame, ParticipantId, RoomId, ServerFrame, SignalPayload, SignalingMessage};
use std::time::Duration;

fn offer(from: &str) -> SignalingMessage {
    SignalingMessage::new(
        ParticipantId::from(from),
        0,
        SignalPayload::Offer {
            sdp: "v=0".to_owned(),
        },
    )
}

#[tokio::test]
async fn test_backlog_replayed_until_consumed() {
    init_tracing();
    let relay = start_relay().await;
    let url = relay.ws_url();
    let room = RoomId::from("standup");
    let bob_id = ParticipantId::from("bob");

    let mut alice = WsClient::connect(&url, "standup", "alice").await;
    alice.read_snapshot().await;
    let mut bob = WsClient::connect(&url, "standup", "bob").await;
    bob.read_snapshot().await;

    let message = offer("alice");
    let id = message.id;
    alice
        .send(ClientFrame::Send {
            to: bob_id.clone(),
            message,
        })
        .await;

    let live = bob.recv().await;
    assert!(matches!(live, Some(ServerFrame::Message { message }) if message.id == id));

    // A second socket for bob gets the unconsumed message replayed.
    let mut bob_again = WsClient::connect(&url, "standup", "bob").await;
    bob_again.read_snapshot().await;
    let replayed = bob_again.recv().await;
    assert!(matches!(replayed, Some(ServerFrame::Message { message }) if message.id == id));

    bob.send(ClientFrame::Consume { id }).await;
    for _ in 0..50 {
        if relay.state().backlog(&room, &bob_id) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(relay.state().backlog(&room, &bob_id), 0);

    let mut bob_third = WsClient::connect(&url, "standup", "bob").await;
    bob_third.read_snapshot().await;
    alice
        .send(ClientFrame::Send {
            to: bob_id.clone(),
            message: SignalingMessage::new(
                ParticipantId::from("alice"),
                1,
                SignalPayload::Answer {
                    sdp: "v=0".to_owned(),
                },
            ),
        })
        .await;
    // The consumed offer is not replayed; the next frame is the new answer.
    let next = bob_third.recv().await;
    assert!(matches!(next, Some(ServerFrame::Message { message }) if message.seq == 1));
}

#[tokio::test]
async fn test_mailbox_dropped_with_last_socket() {
    init_tracing();
    let relay = start_relay().await;
    let url = relay.ws_url();
    let room = RoomId::from("standup");
    let bob_id = ParticipantId::from("bob");

    let mut alice = WsClient::connect(&url, "standup", "alice").await;
    alice.read_snapshot().await;
    let mut bob = WsClient::connect(&url, "standup", "bob").await;
    bob.read_snapshot().await;

    alice
        .send(ClientFrame::Send {
            to: bob_id.clone(),
            message: offer("alice"),
        })
        .await;
    bob.recv().await.expect("No message for bob");
    bob.close().await;

    for _ in 0..50 {
        if relay.state().backlog(&room, &bob_id) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(relay.state().backlog(&room, &bob_id), 0);
}
