use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of chat event carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Video,
}

impl MessageKind {
    /// Parse the wire tag. An empty tag means `text`.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "" | "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Text shown as a room's last message for media kinds.
    pub fn summary_placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Voice => Some("[voice message]"),
            Self::Image => Some("[image]"),
            Self::Video => Some("[video]"),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment metadata for voice/image/video messages.
/// Travels as top-level fields on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl MediaFields {
    pub fn is_empty(&self) -> bool {
        self.file_url.is_none() && self.duration.is_none() && self.file_size.is_none()
    }
}

/// Structured body of a media message. Serialized to JSON and encrypted
/// before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(flatten)]
    pub media: MediaFields,
}

/// Messages stored on the server are always encrypted.
/// `content` holds the cipher blob, never plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub provisional_id: Option<String>,
    pub sender_id: Uuid,
    /// Captured at write time; never re-resolved.
    pub sender_name: String,
    pub room_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub read_by: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub participants: Vec<Uuid>,
    pub last_message: String,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u64,
}

impl Room {
    /// Participants and the creator may use the room.
    pub fn admits(&self, user_id: Uuid) -> bool {
        self.created_by == user_id || self.participants.contains(&user_id)
    }

    /// Everyone whose block list matters for a message from `sender_id`.
    pub fn others(&self, sender_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |id| *id != sender_id)
    }
}
