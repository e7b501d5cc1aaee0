//! Narrow async views of the three collections the realtime core touches.
//! Services hold these as `Arc<dyn ...>` so tests can swap in fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use parley_types::models::{Message, Room};

use crate::Database;
use crate::error::StoreResult;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the sender already stored this provisional id.
    async fn insert_message(&self, message: Message) -> StoreResult<()>;

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>>;

    async fn find_by_provisional(
        &self,
        sender_id: Uuid,
        provisional_id: &str,
    ) -> StoreResult<Option<Message>>;

    /// Set-union `reader_id` into read-by for every message in the room it did not send.
    async fn mark_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn set_deleted(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn clear_deleted(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn find_room(&self, id: Uuid) -> StoreResult<Option<Room>>;

    /// Last-write-wins update of the summary fields plus an unread bump.
    async fn update_summary(
        &self,
        id: Uuid,
        last_message: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn reset_unread(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait BlockRegistry: Send + Sync {
    async fn is_blocked(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
impl MessageStore for Database {
    async fn insert_message(&self, message: Message) -> StoreResult<()> {
        self.blocking(move |db| db.insert_message(&message)).await
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.blocking(move |db| db.get_message(id)).await
    }

    async fn find_by_provisional(
        &self,
        sender_id: Uuid,
        provisional_id: &str,
    ) -> StoreResult<Option<Message>> {
        let provisional_id = provisional_id.to_string();
        self.blocking(move |db| db.get_message_by_provisional(sender_id, &provisional_id))
            .await
    }

    async fn mark_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.blocking(move |db| db.mark_room_read(room_id, reader_id, read_at))
            .await
    }

    async fn set_deleted(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.blocking(move |db| db.set_message_deleted(id, deleted_by, deleted_at))
            .await
    }

    async fn clear_deleted(&self, id: Uuid) -> StoreResult<bool> {
        self.blocking(move |db| db.clear_message_deleted(id)).await
    }
}

#[async_trait]
impl RoomStore for Database {
    async fn find_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        self.blocking(move |db| db.get_room(id)).await
    }

    async fn update_summary(
        &self,
        id: Uuid,
        last_message: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let last_message = last_message.to_string();
        self.blocking(move |db| db.update_room_summary(id, &last_message, last_message_time))
            .await
    }

    async fn reset_unread(&self, id: Uuid) -> StoreResult<bool> {
        self.blocking(move |db| db.reset_room_unread(id)).await
    }
}

#[async_trait]
impl BlockRegistry for Database {
    async fn is_blocked(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool> {
        self.blocking(move |db| db.is_blocked(blocker_id, blocked_id)).await
    }
}
