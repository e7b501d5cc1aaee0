use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_crypto::ContentCipher;
use parley_db::{MessageStore, RoomStore, StoreError};
use parley_types::api::Ack;
use parley_types::events::{MessageEvent, ServerEvent};
use parley_types::models::{MediaFields, MediaPayload, Message, MessageKind};

use crate::broadcast::RoomBroadcaster;
use crate::deadline::bounded;
use crate::error::SubmitError;
use crate::guard::MembershipGuard;
use crate::session::Identity;
use crate::validate::Submission;

/// What a successful submission produced.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub provisional_id: Option<String>,
    /// False when the provisional id was already stored and this was a replay.
    pub fresh: bool,
}

/// The one path from a chat submission to a stored, acknowledged and
/// broadcast message.
pub struct MessagePipeline {
    guard: Arc<MembershipGuard>,
    messages: Arc<dyn MessageStore>,
    rooms: Arc<dyn RoomStore>,
    cipher: Arc<dyn ContentCipher>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    store_timeout: Duration,
    summary_timeout: Duration,
}

impl MessagePipeline {
    pub fn new(
        guard: Arc<MembershipGuard>,
        messages: Arc<dyn MessageStore>,
        rooms: Arc<dyn RoomStore>,
        cipher: Arc<dyn ContentCipher>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        store_timeout: Duration,
        summary_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            messages,
            rooms,
            cipher,
            broadcaster,
            store_timeout,
            summary_timeout,
        }
    }

    pub async fn submit(&self, sender: Option<&Identity>, submission: Submission) -> Ack {
        self.submit_and_reply(sender, submission, |_| {}).await
    }

    /// Run a submission and hand its ack to `reply` before anything is
    /// broadcast, so the sender sees the ack ahead of its own message.
    pub async fn submit_and_reply<R>(
        &self,
        sender: Option<&Identity>,
        submission: Submission,
        reply: R,
    ) -> Ack
    where
        R: FnOnce(&Ack),
    {
        let provisional_id = submission.provisional_id.clone();

        match self.store(sender, submission).await {
            Ok((accepted, event)) => {
                let ack = Ack::accepted(
                    accepted.message_id,
                    accepted.timestamp,
                    accepted.provisional_id.clone(),
                );
                reply(&ack);

                let Some(event) = event else { return ack };
                let room = event.room;
                let summary = summary_text(&event);
                self.broadcaster.broadcast(room, ServerEvent::message(event));

                if accepted.fresh {
                    self.spawn_summary_update(room, summary, accepted.timestamp);
                }
                ack
            }
            Err(e) => {
                warn!(
                    user = ?sender.map(|s| s.user_id),
                    provisional_id = ?provisional_id,
                    reason = %e.reason(),
                    "submission rejected: {}",
                    e
                );
                let ack = Ack::rejected(e.reason());
                reply(&ack);
                ack
            }
        }
    }

    /// Steps up to and including persistence. Nothing is broadcast from here.
    /// The event is `None` for a replay of a message that was deleted since.
    async fn store(
        &self,
        sender: Option<&Identity>,
        submission: Submission,
    ) -> Result<(Accepted, Option<MessageEvent>), SubmitError> {
        let sender = sender.ok_or(SubmitError::Unauthorized)?;
        let room: Uuid = submission
            .room
            .trim()
            .parse()
            .map_err(|_| SubmitError::InvalidRoom)?;

        if !self.guard.is_member(sender.user_id, room).await {
            return Err(SubmitError::NotInRoom);
        }
        if self.guard.is_blocked_by_someone_in_room(sender.user_id, room).await {
            return Err(SubmitError::Blocked);
        }

        let plaintext = shape(&submission)?;
        let sealed = self.encrypt(plaintext.clone()).await?;

        let message = Message {
            id: Uuid::new_v4(),
            provisional_id: submission.provisional_id.clone(),
            sender_id: sender.user_id,
            sender_name: sender.username.clone(),
            room_id: room,
            content: sealed,
            kind: submission.kind,
            timestamp: Utc::now(),
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            read_by: Vec::new(),
        };
        let event = message_event(&message, &plaintext)?;

        match bounded(self.store_timeout, self.messages.insert_message(message)).await {
            Ok(()) => {
                info!(
                    message_id = %event.id,
                    %room,
                    sender = %sender.user_id,
                    kind = %submission.kind,
                    "message stored"
                );
                let accepted = Accepted {
                    message_id: event.id,
                    timestamp: event.timestamp,
                    provisional_id: submission.provisional_id,
                    fresh: true,
                };
                Ok((accepted, Some(event)))
            }
            Err(StoreError::Duplicate) => {
                let stored = self.find_replayed(sender.user_id, &submission).await?;
                self.replay(stored, room).await
            }
            Err(e) => {
                error!(%room, sender = %sender.user_id, "failed to save message: {}", e);
                Err(SubmitError::Save(e))
            }
        }
    }

    /// Answer a retried provisional id from the stored record alone.
    async fn replay(
        &self,
        stored: Message,
        room: Uuid,
    ) -> Result<(Accepted, Option<MessageEvent>), SubmitError> {
        if stored.room_id != room {
            warn!(
                message_id = %stored.id,
                stored_room = %stored.room_id,
                %room,
                "provisional id reused for another room"
            );
            return Err(SubmitError::ProvisionalIdConflict);
        }

        let accepted = Accepted {
            message_id: stored.id,
            timestamp: stored.timestamp,
            provisional_id: stored.provisional_id.clone(),
            fresh: false,
        };
        if stored.is_deleted {
            debug!(message_id = %stored.id, "replayed message was deleted, not broadcasting");
            return Ok((accepted, None));
        }

        let plaintext = self.decrypt(stored.content.clone()).await?;
        let event = message_event(&stored, &plaintext)?;
        debug!(
            message_id = %stored.id,
            provisional_id = ?stored.provisional_id,
            "provisional id already stored, replaying"
        );
        Ok((accepted, Some(event)))
    }

    async fn find_replayed(
        &self,
        sender_id: Uuid,
        submission: &Submission,
    ) -> Result<Message, SubmitError> {
        // Only the provisional id index can collide on insert
        let Some(pid) = submission.provisional_id.as_deref() else {
            return Err(SubmitError::Save(StoreError::Duplicate));
        };
        match bounded(self.store_timeout, self.messages.find_by_provisional(sender_id, pid)).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Err(SubmitError::Save(StoreError::NotFound)),
            Err(e) => Err(SubmitError::Save(e)),
        }
    }

    async fn encrypt(&self, plaintext: String) -> Result<String, SubmitError> {
        self.run_cipher(move |cipher| cipher.encrypt(&plaintext)).await
    }

    async fn decrypt(&self, sealed: String) -> Result<String, SubmitError> {
        self.run_cipher(move |cipher| cipher.decrypt(&sealed)).await
    }

    /// Cipher work runs on the blocking pool under the store deadline.
    async fn run_cipher<F>(&self, op: F) -> Result<String, SubmitError>
    where
        F: FnOnce(&dyn ContentCipher) -> anyhow::Result<String> + Send + 'static,
    {
        let cipher = self.cipher.clone();
        let work = tokio::task::spawn_blocking(move || op(cipher.as_ref()));

        match tokio::time::timeout(self.store_timeout, work).await {
            Ok(Ok(Ok(out))) => Ok(out),
            Ok(Ok(Err(e))) => Err(SubmitError::Encryption(e.to_string())),
            Ok(Err(join)) => Err(SubmitError::Encryption(join.to_string())),
            Err(_) => Err(SubmitError::Encryption("deadline exceeded".into())),
        }
    }

    fn spawn_summary_update(&self, room: Uuid, last_message: String, at: DateTime<Utc>) {
        let rooms = self.rooms.clone();
        let deadline = self.summary_timeout;

        tokio::spawn(async move {
            match bounded(deadline, rooms.update_summary(room, &last_message, at)).await {
                Ok(true) => debug!(%room, "room summary updated"),
                Ok(false) => warn!(%room, "room vanished before summary update"),
                Err(e) => error!(%room, "failed to update room summary: {}", e),
            }
        });
    }
}

/// Plaintext that gets encrypted: raw text, or the JSON media payload.
fn shape(submission: &Submission) -> Result<String, SubmitError> {
    if submission.kind == MessageKind::Text {
        return Ok(submission.content.clone());
    }
    let payload = MediaPayload {
        kind: submission.kind,
        media: submission.media.clone(),
    };
    serde_json::to_string(&payload).map_err(|e| SubmitError::Encryption(e.to_string()))
}

/// Broadcast form of a stored message, given its decrypted content. Media
/// kinds carry their fields at the top level and the placeholder as content.
fn message_event(message: &Message, plaintext: &str) -> Result<MessageEvent, SubmitError> {
    let (content, media) = match message.kind.summary_placeholder() {
        None => (plaintext.to_string(), MediaFields::default()),
        Some(placeholder) => {
            let payload: MediaPayload = serde_json::from_str(plaintext)
                .map_err(|e| SubmitError::Encryption(e.to_string()))?;
            (placeholder.to_string(), payload.media)
        }
    };

    Ok(MessageEvent {
        id: message.id,
        sender_id: message.sender_id,
        sender_name: message.sender_name.clone(),
        room: message.room_id,
        content,
        kind: message.kind,
        timestamp: message.timestamp,
        provisional_id: message.provisional_id.clone(),
        media,
    })
}

fn summary_text(event: &MessageEvent) -> String {
    match event.kind.summary_placeholder() {
        Some(placeholder) => placeholder.to_string(),
        None => event.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(kind: MessageKind, content: &str, media: MediaFields) -> Submission {
        Submission {
            provisional_id: None,
            room: Uuid::new_v4().to_string(),
            content: content.into(),
            kind,
            media,
        }
    }

    #[test]
    fn text_is_encrypted_as_is() {
        let s = submission(MessageKind::Text, "hi", MediaFields::default());
        assert_eq!(shape(&s).unwrap(), "hi");
    }

    #[test]
    fn media_is_shaped_into_json_payload() {
        let media = MediaFields {
            file_url: Some("https://cdn.example/v.mp4".into()),
            duration: Some(12),
            file_size: None,
        };
        let s = submission(MessageKind::Video, "", media.clone());
        let parsed: MediaPayload = serde_json::from_str(&shape(&s).unwrap()).unwrap();
        assert_eq!(parsed, MediaPayload { kind: MessageKind::Video, media });
    }

    #[test]
    fn media_event_is_rebuilt_from_the_stored_payload() {
        let media = MediaFields {
            file_url: Some("https://cdn.example/i.png".into()),
            duration: None,
            file_size: Some(2048),
        };
        let s = submission(MessageKind::Image, "caption", media.clone());
        let message = Message {
            id: Uuid::new_v4(),
            provisional_id: Some("p".into()),
            sender_id: Uuid::new_v4(),
            sender_name: "alice".into(),
            room_id: Uuid::new_v4(),
            content: "sealed".into(),
            kind: MessageKind::Image,
            timestamp: Utc::now(),
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            read_by: Vec::new(),
        };

        let event = message_event(&message, &shape(&s).unwrap()).unwrap();
        assert_eq!(event.content, "[image]");
        assert_eq!(event.media, media);
        assert_eq!(event.room, message.room_id);
        assert!(message_event(&message, "not json").is_err());
    }
}
