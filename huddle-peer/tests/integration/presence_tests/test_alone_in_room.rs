use crate::integration::{TestRoom, init_tracing};

#[tokio::test]
async fn test_alone_in_room() {
    init_tracing();

    let room = TestRoom::new("standup");
    let (alice, _conn) = room.participant("alice");

    alice
        .orchestrator
        .join_room(room.room.clone())
        .await
        .expect("Join failed");

    assert_eq!(alice.orchestrator.current_room().await, Some(room.room.clone()));
    assert_eq!(room.present(), vec!["alice"]);
    assert!(alice.orchestrator.registered_peers().await.is_empty());
    assert!(alice.orchestrator.members().await.is_empty());
    assert_eq!(alice.media.active(), 1);
}
