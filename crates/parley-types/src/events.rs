use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Ack;
use crate::models::{MediaFields, MessageKind};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// Direct reply to a command that asked for one
    Ack(AckFrame),

    /// A stored message, one variant per message kind
    ChatMessage(MessageEvent),
    VoiceMessage(MessageEvent),
    ImageMessage(MessageEvent),
    VideoMessage(MessageEvent),

    TypingStart(TypingEvent),
    TypingEnd(TypingEvent),

    /// A user read the room up to `timestamp`
    MessageRead {
        room: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A message was soft-deleted by its sender
    MessageDeleted {
        id: Uuid,
        room: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },

    Pong,

    /// A command could not be processed
    Error { reason: String },
}

impl ServerEvent {
    /// Wrap a message in the variant matching its kind.
    pub fn message(event: MessageEvent) -> Self {
        match event.kind {
            MessageKind::Text => Self::ChatMessage(event),
            MessageKind::Voice => Self::VoiceMessage(event),
            MessageKind::Image => Self::ImageMessage(event),
            MessageKind::Video => Self::VideoMessage(event),
        }
    }

    pub fn typing(event: TypingEvent) -> Self {
        if event.is_typing {
            Self::TypingStart(event)
        } else {
            Self::TypingEnd(event)
        }
    }

    pub fn ack(ack_id: Option<u64>, ack: Ack) -> Self {
        Self::Ack(AckFrame { ack_id, ack })
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Ack(_) => "ack",
            Self::ChatMessage(_) => "chat_message",
            Self::VoiceMessage(_) => "voice_message",
            Self::ImageMessage(_) => "image_message",
            Self::VideoMessage(_) => "video_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingEnd(_) => "typing_end",
            Self::MessageRead { .. } => "message_read",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    #[serde(flatten)]
    pub ack: Ack,
}

/// Canonical, plaintext form of a stored message as seen by room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub room: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_id: Option<String>,
    #[serde(flatten)]
    pub media: MediaFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub sender_id: Uuid,
    pub sender_name: String,
    pub room: Uuid,
    pub is_typing: bool,
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Room references arrive as raw strings so that a malformed one can be
/// answered with `invalid_room` instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinRoom { room: String },
    LeaveRoom { room: String },
    ChatMessage(ChatMessagePayload),
    TypingStart { room: String },
    TypingEnd { room: String },
    MarkRead { room: String },
    DeleteMessage {
        #[serde(default)]
        ack_id: Option<u64>,
        message_id: String,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    /// Echoed back on the ack so the client can match it to this command
    #[serde(default)]
    pub ack_id: Option<u64>,
    #[serde(default)]
    pub provisional_id: Option<String>,
    pub room: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub media: MediaFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AckReason;

    #[test]
    fn voice_broadcast_has_top_level_media_fields() {
        let event = ServerEvent::message(MessageEvent {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_name: "alice".into(),
            room: Uuid::new_v4(),
            content: String::new(),
            kind: MessageKind::Voice,
            timestamp: Utc::now(),
            provisional_id: None,
            media: MediaFields {
                file_url: Some("https://cdn.example/a.m4a".into()),
                duration: Some(5),
                file_size: Some(1000),
            },
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "voice_message");
        assert_eq!(value["data"]["type"], "voice");
        assert_eq!(value["data"]["duration"], 5);
        assert_eq!(value["data"]["file_size"], 1000);
        assert_eq!(value["data"]["file_url"], "https://cdn.example/a.m4a");
        assert!(value["data"].get("provisional_id").is_none());
    }

    #[test]
    fn parses_chat_message_with_inline_media() {
        let raw = concat!(
            r#"{"type":"chat_message","data":{"ack_id":7,"provisional_id":"c-1","room":"r","#,
            r#""type":"image","file_url":"u","file_size":12}}"#
        );
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        let ClientCommand::ChatMessage(payload) = cmd else {
            panic!("expected chat_message");
        };
        assert_eq!(payload.ack_id, Some(7));
        assert_eq!(payload.kind.as_deref(), Some("image"));
        assert_eq!(payload.content, "");
        assert_eq!(payload.media.file_size, Some(12));
        assert_eq!(payload.media.duration, None);
    }

    #[test]
    fn parses_ping_without_data() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::Ping));
    }

    #[test]
    fn ack_frame_flattens_ack() {
        let event = ServerEvent::ack(Some(3), Ack::rejected(AckReason::NotInRoom));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "ack",
                "data": { "ack_id": 3, "ok": false, "reason": "not_in_room" }
            })
        );
        let back: ServerEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
