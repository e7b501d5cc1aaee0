//! Database row types. These map directly to SQLite rows.
//! Converted into parley-types models at the store boundary.
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use parley_types::models::{Message, MessageKind, Room};

use crate::error::{StoreError, StoreResult};

pub struct MessageRow {
    pub id: String,
    pub provisional_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub room_id: String,
    pub content: String,
    pub kind: String,
    pub timestamp: String,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<String>,
}

pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub last_message: String,
    pub last_message_time: Option<String>,
    pub unread_count: i64,
}

impl MessageRow {
    pub fn into_message(self, read_by: Vec<String>) -> StoreResult<Message> {
        Ok(Message {
            id: parse_uuid(&self.id)?,
            provisional_id: self.provisional_id,
            sender_id: parse_uuid(&self.sender_id)?,
            sender_name: self.sender_name,
            room_id: parse_uuid(&self.room_id)?,
            content: self.content,
            kind: MessageKind::from_wire(&self.kind).ok_or_else(|| {
                StoreError::Backend(format!("Corrupt message kind '{}'", self.kind))
            })?,
            timestamp: parse_time(&self.timestamp)?,
            is_deleted: self.is_deleted,
            deleted_by: self.deleted_by.as_deref().map(parse_uuid).transpose()?,
            deleted_at: self.deleted_at.as_deref().map(parse_time).transpose()?,
            read_by: read_by.iter().map(|id| parse_uuid(id)).collect::<StoreResult<_>>()?,
        })
    }
}

impl RoomRow {
    pub fn into_room(self, participants: Vec<String>) -> StoreResult<Room> {
        Ok(Room {
            id: parse_uuid(&self.id)?,
            name: self.name,
            created_by: parse_uuid(&self.created_by)?,
            participants: participants
                .iter()
                .map(|id| parse_uuid(id))
                .collect::<StoreResult<_>>()?,
            last_message: self.last_message,
            last_message_time: self.last_message_time.as_deref().map(parse_time).transpose()?,
            unread_count: self.unread_count.max(0) as u64,
        })
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("Corrupt timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    raw.parse()
        .map_err(|e| StoreError::Backend(format!("Corrupt id '{}': {}", raw, e)))
}
