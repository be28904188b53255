use huddle_peer::negotiation::NegotiationState;

use crate::integration::{TestRoom, init_tracing};
use crate::utils::{SETTLE_TIMEOUT_MS, wait_for_peers, wait_for_state, wait_until};

#[tokio::test]
async fn test_leave_then_rejoin() {
    init_tracing();

    let room = TestRoom::new("standup");
    let (alice, _alice_conn) = room.participant("alice");
    let (bob, _bob_conn) = room.participant("bob");

    alice.orchestrator.join_room(room.room.clone()).await.expect("Alice join failed");
    bob.orchestrator.join_room(room.room.clone()).await.expect("Bob join failed");
    assert!(wait_for_state(&alice.orchestrator, "bob", NegotiationState::Connected).await);

    alice.orchestrator.leave_room().await;

    assert_eq!(alice.orchestrator.current_room().await, None);
    assert_eq!(room.present(), vec!["bob"]);
    assert_eq!(alice.journal.lock().unwrap().open_links(), 0);
    assert_eq!(alice.media.active(), 0);
    assert!(wait_for_peers(&bob.orchestrator, &[]).await);

    alice.orchestrator.join_room(room.room.clone()).await.expect("Alice rejoin failed");

    assert_eq!(room.present(), vec!["alice", "bob"]);
    assert!(wait_for_state(&alice.orchestrator, "bob", NegotiationState::Connected).await);
    assert!(wait_for_state(&bob.orchestrator, "alice", NegotiationState::Connected).await);
    assert!(wait_for_peers(&alice.orchestrator, &["bob"]).await);

    let journal = &alice.journal;
    assert!(wait_until(SETTLE_TIMEOUT_MS, move || async move {
        journal.lock().unwrap().open_links() == 1
    })
    .await);
    assert_eq!(alice.media.active(), 1);
}
