use std::sync::Arc;

use huddle_peer::negotiation::NegotiationRole;
use huddle_peer::signaling::MemoryMailbox;

use crate::integration::{init_tracing, participant, test_config};
use crate::utils::{MockMediaDevice, ScriptedPresence, peer_role, wait_for_peers, wait_until};

#[tokio::test]
async fn test_membership_convergence() {
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

    // Snapshot first: these were here before us.
    presence.add("bob");
    presence.add("alice");
    presence.synced();

    // Live traffic.
    presence.add("carol");
    presence.add("dave");
    presence.remove("bob");
    presence.remove("carol");
    presence.add("erin");
    presence.remove("nobody");

    assert!(wait_for_peers(&alice.orchestrator, &["dave", "erin"]).await);

    let members: Vec<String> = alice
        .orchestrator
        .members()
        .await
        .into_iter()
        .map(|r| r.participant_id.to_string())
        .collect();
    assert_eq!(members, vec!["dave", "erin"]);
    assert_eq!(peer_role(&alice.orchestrator, "dave").await, Some(NegotiationRole::Initiator));

    // Links for removed participants get closed.
    let journal = &alice.journal;
    assert!(wait_until(5000, move || async move { journal.lock().unwrap().open_links() == 2 }).await);
}

#[tokio::test]
async fn test_snapshot_members_wait_for_offer() {
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

    presence.add("bob");
    presence.synced();

    assert!(wait_for_peers(&alice.orchestrator, &["bob"]).await);
    assert_eq!(peer_role(&alice.orchestrator, "bob").await, Some(NegotiationRole::Responder));
    // A responder opens no link until an offer arrives.
    assert_eq!(alice.journal.lock().unwrap().links_to("bob"), 0);
}
