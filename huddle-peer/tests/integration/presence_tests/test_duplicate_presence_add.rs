use std::sync::Arc;

use huddle_core::RoomId;
use huddle_peer::signaling::MemoryMailbox;

use crate::integration::{init_tracing, participant, test_config};
use crate::utils::{MockMediaDevice, RoomEvent, ScriptedPresence, wait_for_peers};

#[tokio::test]
async fn test_duplicate_presence_add() {
    init_tracing();

    let presence = ScriptedPresence::new();
    let mailbox = MemoryMailbox::new();
    let alice = participant(
        "alice",
        Arc::new(presence.clone()),
        &mailbox,
        MockMediaDevice::new(),
        test_config(),
    );
    alice.orchestrator.join_room("standup").await.expect("Join failed");

    presence.synced();
    presence.add("bob");
    presence.add("bob");
    presence.add("carol");

    assert!(wait_for_peers(&alice.orchestrator, &["bob", "carol"]).await);

    let joined_bob = alice
        .observer
        .count(|e| matches!(e, RoomEvent::Joined { participant } if participant.as_str() == "bob"))
        .await;
    assert_eq!(joined_bob, 1);
    assert_eq!(alice.journal.lock().unwrap().links_to("bob"), 1);
    assert_eq!(alice.orchestrator.members().await.len(), 2);

    let room = RoomId::from("standup");
    assert!(mailbox.pending(&room, &"bob".into()) >= 1);
}
