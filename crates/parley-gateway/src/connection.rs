use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::api::{Ack, AckReason};
use parley_types::events::{ClientCommand, ServerEvent};

use crate::hub::Hub;
use crate::session::{Identity, Session, send_direct};
use crate::validate::Submission;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Drive one pre-authenticated WebSocket connection until it closes.
/// The bearer token was already verified at the HTTP upgrade.
pub async fn handle_connection(socket: WebSocket, hub: Hub, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut inbox) = hub.registry().open(identity);

    session.reply(ServerEvent::Ready {
        user_id: session.identity().user_id,
        username: session.identity().username.clone(),
    });

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let conn = session.id();

    // Inbox -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = inbox.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&*event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(%conn, event = event.name(), "failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!(
                                %conn,
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Socket -> commands. Runs inline so it can hold the session mutably.
    let recv_loop = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&hub, &mut session, cmd).await,
                    Err(e) => {
                        warn!(
                            %conn,
                            username = %session.identity().username,
                            "bad command: {} -- raw: {}",
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_received.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {}
        _ = recv_loop => {}
    }
    send_task.abort();

    hub.registry().disconnect(session);
}

async fn handle_command(hub: &Hub, session: &mut Session, cmd: ClientCommand) {
    match cmd {
        ClientCommand::JoinRoom { room } => {
            let Some(room) = parse_room(session, &room) else { return };
            if !hub.guard().is_member(session.identity().user_id, room).await {
                warn!(
                    conn = %session.id(),
                    user = %session.identity().user_id,
                    %room,
                    "join refused, not a member"
                );
                session.reply(error_event(AckReason::NotInRoom));
                return;
            }
            hub.registry().join(session, room);
        }

        ClientCommand::LeaveRoom { room } => {
            let Some(room) = parse_room(session, &room) else { return };
            hub.registry().leave(session, room);
        }

        ClientCommand::ChatMessage(payload) => {
            let (ack_id, validated) = Submission::from_command(payload);
            let submission = match validated {
                Ok(submission) => submission,
                Err(e) => {
                    debug!(conn = %session.id(), "chat message failed validation: {}", e);
                    session.reply(ServerEvent::ack(ack_id, Ack::rejected(e.reason())));
                    return;
                }
            };

            // Own task: the message is stored and broadcast even if this
            // connection goes away mid-flight.
            let hub = hub.clone();
            let identity = session.identity().clone();
            let replies = session.replies();
            tokio::spawn(async move {
                hub.pipeline()
                    .submit_and_reply(Some(&identity), submission, |ack| {
                        send_direct(&replies, ServerEvent::ack(ack_id, ack.clone()));
                    })
                    .await;
            });
        }

        ClientCommand::TypingStart { room } => {
            let Some(room) = parse_room(session, &room) else { return };
            hub.relay().typing_start(session.identity(), room);
        }

        ClientCommand::TypingEnd { room } => {
            let Some(room) = parse_room(session, &room) else { return };
            hub.relay().typing_end(session.identity(), room);
        }

        ClientCommand::MarkRead { room } => {
            let Some(room) = parse_room(session, &room) else { return };
            let hub = hub.clone();
            let identity = session.identity().clone();
            let replies = session.replies();
            tokio::spawn(async move {
                if let Err(e) = hub.relay().mark_read(&identity, room).await {
                    warn!(user = %identity.user_id, %room, "mark read failed: {}", e);
                    send_direct(&replies, error_event(e.reason()));
                }
            });
        }

        ClientCommand::DeleteMessage { ack_id, message_id } => {
            let Ok(message_id) = message_id.trim().parse::<Uuid>() else {
                session.reply(ServerEvent::ack(ack_id, Ack::rejected(AckReason::NotFound)));
                return;
            };
            let hub = hub.clone();
            let identity = session.identity().clone();
            let replies = session.replies();
            tokio::spawn(async move {
                let ack = match hub.deletion().delete(&identity, message_id).await {
                    Ok(deleted_at) => Ack::accepted(message_id, deleted_at, None),
                    Err(e) => {
                        warn!(user = %identity.user_id, %message_id, "delete failed: {}", e);
                        Ack::rejected(e.reason())
                    }
                };
                send_direct(&replies, ServerEvent::ack(ack_id, ack));
            });
        }

        ClientCommand::Ping => {
            session.reply(ServerEvent::Pong);
        }
    }
}

/// Parse a room reference, answering `invalid_room` on failure.
fn parse_room(session: &Session, raw: &str) -> Option<Uuid> {
    match raw.trim().parse() {
        Ok(room) => Some(room),
        Err(_) => {
            debug!(conn = %session.id(), raw, "invalid room reference");
            session.reply(error_event(AckReason::InvalidRoom));
            None
        }
    }
}

fn error_event(reason: AckReason) -> ServerEvent {
    ServerEvent::Error {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::LocalBroadcaster;
    use crate::hub::{HubConfig, Stores};
    use crate::session::SessionInbox;
    use parley_crypto::{AesGcmCipher, keys::generate_key};
    use parley_db::Database;
    use parley_types::events::ChatMessagePayload;
    use parley_types::models::MediaFields;

    struct Fixture {
        hub: Hub,
        room: Uuid,
        alice: Identity,
        carol: Identity,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = Identity { user_id: Uuid::new_v4(), username: "alice".into() };
        let carol = Identity { user_id: Uuid::new_v4(), username: "carol".into() };
        let room = Uuid::new_v4();
        db.create_room(room, "general", alice.user_id, &[alice.user_id]).unwrap();

        let config = HubConfig { jwt_secret: "s".into(), ..HubConfig::default() };
        let hub = Hub::new(
            &config,
            Stores::sqlite(&db),
            Arc::new(AesGcmCipher::new(&generate_key())),
            Arc::new(LocalBroadcaster::new()),
        );
        Fixture { hub, room, alice, carol }
    }

    async fn next(inbox: &mut SessionInbox) -> ServerEvent {
        let event = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("inbox closed");
        (*event).clone()
    }

    fn chat(ack_id: u64, room: Uuid, content: &str) -> ClientCommand {
        ClientCommand::ChatMessage(ChatMessagePayload {
            ack_id: Some(ack_id),
            provisional_id: None,
            room: room.to_string(),
            content: content.into(),
            kind: None,
            media: MediaFields::default(),
        })
    }

    fn assert_error(event: ServerEvent, reason: AckReason) {
        match event {
            ServerEvent::Error { reason: got } => assert_eq!(got, reason.as_str()),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_by_non_member_is_refused() {
        let f = fixture();
        let (mut session, mut inbox) = f.hub.registry().open(f.carol.clone());

        let cmd = ClientCommand::JoinRoom { room: f.room.to_string() };
        handle_command(&f.hub, &mut session, cmd).await;

        assert_error(next(&mut inbox).await, AckReason::NotInRoom);
        assert!(!session.is_joined(f.room));
    }

    #[tokio::test]
    async fn malformed_room_answers_invalid_room() {
        let f = fixture();
        let (mut session, mut inbox) = f.hub.registry().open(f.alice.clone());

        let cmd = ClientCommand::TypingStart { room: "lobby".into() };
        handle_command(&f.hub, &mut session, cmd).await;
        assert_error(next(&mut inbox).await, AckReason::InvalidRoom);

        let cmd = ClientCommand::JoinRoom { room: String::new() };
        handle_command(&f.hub, &mut session, cmd).await;
        assert_error(next(&mut inbox).await, AckReason::InvalidRoom);
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let f = fixture();
        let (mut session, mut inbox) = f.hub.registry().open(f.alice.clone());

        handle_command(&f.hub, &mut session, ClientCommand::Ping).await;
        assert!(matches!(next(&mut inbox).await, ServerEvent::Pong));
    }

    #[tokio::test]
    async fn ack_id_is_echoed_on_rejection_and_acceptance() {
        let f = fixture();
        let (mut session, mut inbox) = f.hub.registry().open(f.alice.clone());

        handle_command(&f.hub, &mut session, chat(5, f.room, "  ")).await;
        match next(&mut inbox).await {
            ServerEvent::Ack(frame) => {
                assert_eq!(frame.ack_id, Some(5));
                assert_eq!(frame.ack.reason, Some(AckReason::EmptyContent));
            }
            other => panic!("expected ack, got {:?}", other),
        }

        handle_command(&f.hub, &mut session, chat(6, f.room, "hello")).await;
        match next(&mut inbox).await {
            ServerEvent::Ack(frame) => {
                assert_eq!(frame.ack_id, Some(6));
                assert!(frame.ack.ok);
                assert!(frame.ack.message_id.is_some());
            }
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_mark_read_sends_error() {
        let f = fixture();
        let (mut session, mut inbox) = f.hub.registry().open(f.carol.clone());

        let cmd = ClientCommand::MarkRead { room: f.room.to_string() };
        handle_command(&f.hub, &mut session, cmd).await;

        assert_error(next(&mut inbox).await, AckReason::NotInRoom);
    }
}
