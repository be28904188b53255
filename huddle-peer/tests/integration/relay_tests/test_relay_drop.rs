use futures::StreamExt;
use huddle_core::{ClientFrame, ParticipantId, PresenceEvent, PresenceRecord, RoomId, SignalPayload, SignalingMessage};
use huddle_peer::negotiation::NegotiationState;
use huddle_peer::signaling::{PresenceChannel, RelayClient, RelayClientConfig, SignalingMailbox};
use huddle_peer::{Collaborators, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::integration::{init_tracing, test_config};
use crate::utils::{
    MockLinkFactory, MockMediaDevice, MockRelay, RecordingObserver, RoomEvent, SETTLE_TIMEOUT_MS,
    wait_for_peers, wait_until,
};

const STEP: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_dropped_socket_fails_instead_of_redialing() {
    init_tracing();
    let relay = MockRelay::start().await;
    let room = RoomId::from("standup");
    let alice = ParticipantId::from("alice");
    let client = RelayClient::new(alice.clone(), RelayClientConfig::new(relay.ws_url()));

    let mut presence = PresenceChannel::subscribe(&client, &room).await.unwrap();
    let mut messages = SignalingMailbox::subscribe(&client, &room, &alice).await.unwrap();
    assert_eq!(timeout(STEP, presence.next()).await.unwrap(), Some(PresenceEvent::Synced));
    assert!(client.is_connected(&room));

    relay.drop_connections();

    assert_eq!(timeout(STEP, presence.next()).await.unwrap(), None);
    assert!(timeout(STEP, messages.next()).await.unwrap().is_none());
    assert!(!client.is_connected(&room));

    let offer = SignalingMessage::new(alice.clone(), 0, SignalPayload::Offer { sdp: "v=0".to_owned() });
    assert!(client.send(&room, &ParticipantId::from("bob"), offer).await.is_err());
    assert!(client.publish(&room, PresenceRecord::new(alice.clone(), "alice")).await.is_err());
    assert!(PresenceChannel::subscribe(&client, &room).await.is_err());
    assert_eq!(relay.dials(), 1);

    // Retracting forgets the dead socket; the next subscribe dials again.
    client.retract(&room, &alice).await.unwrap();
    let mut presence = PresenceChannel::subscribe(&client, &room).await.unwrap();
    assert_eq!(timeout(STEP, presence.next()).await.unwrap(), Some(PresenceEvent::Synced));
    assert_eq!(relay.dials(), 2);
    assert!(
        !relay.frames().iter().any(|f| matches!(f, ClientFrame::Send { .. })),
        "nothing may be sent over a redialed socket behind the caller's back"
    );
}

#[tokio::test]
async fn test_room_lost_when_relay_drops() {
    init_tracing();
    let relay = MockRelay::with_members(&["bob"]).await;
    let room = RoomId::from("standup");
    let alice = ParticipantId::from("alice");

    let client = Arc::new(RelayClient::new(alice.clone(), RelayClientConfig::new(relay.ws_url())));
    let links = MockLinkFactory::new("alice");
    let journal = links.journal();
    let media = MockMediaDevice::new();
    let observer = RecordingObserver::new();
    let orchestrator = Orchestrator::new(
        PresenceRecord::new(alice.clone(), "alice"),
        test_config(),
        Collaborators {
            presence: client.clone(),
            mailbox: client.clone(),
            media: Arc::new(media.clone()),
            links: Arc::new(links),
        },
    )
    .with_observer(Arc::new(observer.clone()));

    orchestrator.join_room(room.clone()).await.expect("Join failed");
    assert!(wait_for_peers(&orchestrator, &["bob"]).await);

    relay.drop_connections();

    assert!(
        observer
            .wait_for(|e| matches!(e, RoomEvent::RoomLost { room: r, .. } if r.as_str() == "standup"), SETTLE_TIMEOUT_MS)
            .await,
        "Observer was not told the room is gone"
    );
    let events = observer.events().await;
    assert!(events.contains(&RoomEvent::State {
        participant: "bob".into(),
        state: NegotiationState::Closed,
    }));
    let lost = &orchestrator;
    assert!(wait_until(SETTLE_TIMEOUT_MS, move || async move { lost.current_room().await.is_none() }).await);
    assert!(orchestrator.registered_peers().await.is_empty());
    let journal = &journal;
    assert!(wait_until(SETTLE_TIMEOUT_MS, move || async move {
        journal.lock().unwrap().open_links() == 0
    })
    .await);
    assert_eq!(relay.dials(), 1);

    // Leaving still releases what the lost room held.
    orchestrator.leave_room().await;
    assert_eq!(media.active(), 0);

    orchestrator.join_room(room.clone()).await.expect("Rejoin failed");
    assert_eq!(orchestrator.current_room().await, Some(room));
    assert_eq!(relay.dials(), 2);
    assert_eq!(media.active(), 1);

    orchestrator.leave_room().await;
}
