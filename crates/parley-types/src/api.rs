use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MediaFields;

// -- JWT Claims --

/// JWT claims shared by the HTTP middleware and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Acknowledgements --

/// Why a submission (or deletion) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckReason {
    Unauthorized,
    InvalidRoom,
    NotInRoom,
    Blocked,
    EmptyContent,
    InvalidType,
    InvalidProvisionalId,
    EncryptionFailed,
    MessageSaveFailed,
    NotFound,
    Forbidden,
    AlreadyDeleted,
    NotDeleted,
}

impl AckReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidRoom => "invalid_room",
            Self::NotInRoom => "not_in_room",
            Self::Blocked => "blocked",
            Self::EmptyContent => "empty_content",
            Self::InvalidType => "invalid_type",
            Self::InvalidProvisionalId => "invalid_provisional_id",
            Self::EncryptionFailed => "encryption_failed",
            Self::MessageSaveFailed => "message_save_failed",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::AlreadyDeleted => "already_deleted",
            Self::NotDeleted => "not_deleted",
        }
    }
}

impl std::fmt::Display for AckReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direct reply to the submitting connection. Never broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AckReason>,
}

impl Ack {
    pub fn accepted(
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        provisional_id: Option<String>,
    ) -> Self {
        Self {
            ok: true,
            message_id: Some(message_id),
            timestamp: Some(timestamp),
            provisional_id,
            reason: None,
        }
    }

    pub fn rejected(reason: AckReason) -> Self {
        Self {
            ok: false,
            message_id: None,
            timestamp: None,
            provisional_id: None,
            reason: Some(reason),
        }
    }
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub provisional_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl SendMessageRequest {
    pub fn media(&self) -> MediaFields {
        MediaFields {
            file_url: self.file_url.clone(),
            duration: self.duration,
            file_size: self.file_size,
        }
    }
}
