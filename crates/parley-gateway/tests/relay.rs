mod common;

use uuid::Uuid;

use parley_gateway::error::{DeleteError, ReadError};
use parley_gateway::validate::Submission;
use parley_types::events::ServerEvent;
use parley_types::models::{MediaFields, MessageKind};

use common::{Harness, assert_quiet, eventually, next_event};

async fn send(h: &Harness, from: &parley_gateway::Identity, content: &str) -> Uuid {
    let submission = Submission {
        provisional_id: None,
        room: h.room.to_string(),
        content: content.into(),
        kind: MessageKind::Text,
        media: MediaFields::default(),
    };
    let ack = h.hub.pipeline().submit(Some(from), submission).await;
    assert!(ack.ok, "submit failed: {:?}", ack.reason);
    ack.message_id.unwrap()
}

#[tokio::test]
async fn typing_is_relayed_without_membership_check() {
    let h = Harness::new();
    let (_bob_session, mut bob_rx) = h.connect(&h.bob);

    h.hub.relay().typing_start(&h.carol, h.room);
    h.hub.relay().typing_end(&h.carol, h.room);

    match next_event(&mut bob_rx).await {
        ServerEvent::TypingStart(t) => {
            assert_eq!(t.sender_id, h.carol.user_id);
            assert_eq!(t.sender_name, "carol");
            assert!(t.is_typing);
        }
        other => panic!("expected typing_start, got {:?}", other),
    }
    match next_event(&mut bob_rx).await {
        ServerEvent::TypingEnd(t) => assert!(!t.is_typing),
        other => panic!("expected typing_end, got {:?}", other),
    }
}

#[tokio::test]
async fn mark_read_is_idempotent_and_skips_own_messages() {
    let h = Harness::new();
    let from_alice = send(&h, &h.alice, "one").await;
    send(&h, &h.alice, "two").await;
    let from_bob = send(&h, &h.bob, "mine").await;
    eventually(|| h.db.get_room(h.room).unwrap().unwrap().unread_count == 3).await;

    let (_alice_session, mut alice_rx) = h.connect(&h.alice);

    assert_eq!(h.hub.relay().mark_read(&h.bob, h.room).await.unwrap(), 2);
    assert_eq!(h.hub.relay().mark_read(&h.bob, h.room).await.unwrap(), 0);

    let read = h.db.get_message(from_alice).unwrap().unwrap();
    assert_eq!(read.read_by, vec![h.bob.user_id]);
    let own = h.db.get_message(from_bob).unwrap().unwrap();
    assert!(own.read_by.is_empty());
    assert_eq!(h.db.get_room(h.room).unwrap().unwrap().unread_count, 0);

    // Every successful application is announced
    for _ in 0..2 {
        match next_event(&mut alice_rx).await {
            ServerEvent::MessageRead { room, user_id, .. } => {
                assert_eq!(room, h.room);
                assert_eq!(user_id, h.bob.user_id);
            }
            other => panic!("expected message_read, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn mark_read_requires_membership() {
    let h = Harness::new();
    let (_alice_session, mut alice_rx) = h.connect(&h.alice);

    let err = h.hub.relay().mark_read(&h.carol, h.room).await.unwrap_err();
    assert!(matches!(err, ReadError::NotInRoom));
    assert_quiet(&mut alice_rx);
}

#[tokio::test]
async fn only_the_sender_deletes_and_only_the_deleter_restores() {
    let h = Harness::new();
    let id = send(&h, &h.alice, "oops").await;
    let (_bob_session, mut bob_rx) = h.connect(&h.bob);

    let err = h.hub.deletion().delete(&h.bob, id).await.unwrap_err();
    assert!(matches!(err, DeleteError::Forbidden));

    let deleted_at = h.hub.deletion().delete(&h.alice, id).await.unwrap();
    match next_event(&mut bob_rx).await {
        ServerEvent::MessageDeleted { id: got, deleted_by, deleted_at: at, .. } => {
            assert_eq!(got, id);
            assert_eq!(deleted_by, h.alice.user_id);
            assert_eq!(at, deleted_at);
        }
        other => panic!("expected message_deleted, got {:?}", other),
    }

    let stored = h.db.get_message(id).unwrap().unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.deleted_by, Some(h.alice.user_id));

    let err = h.hub.deletion().delete(&h.alice, id).await.unwrap_err();
    assert!(matches!(err, DeleteError::AlreadyDeleted));

    let err = h.hub.deletion().restore(&h.bob, id).await.unwrap_err();
    assert!(matches!(err, DeleteError::Forbidden));

    h.hub.deletion().restore(&h.alice, id).await.unwrap();
    let stored = h.db.get_message(id).unwrap().unwrap();
    assert!(!stored.is_deleted);
    assert_eq!(stored.deleted_by, None);
    assert_eq!(stored.deleted_at, None);

    let err = h.hub.deletion().restore(&h.alice, id).await.unwrap_err();
    assert!(matches!(err, DeleteError::NotDeleted));
}

#[tokio::test]
async fn deleting_unknown_message_is_not_found() {
    let h = Harness::new();
    let err = h.hub.deletion().delete(&h.alice, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DeleteError::NotFound));
}
