use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use parley_db::MessageStore;
use parley_types::events::ServerEvent;

use crate::broadcast::RoomBroadcaster;
use crate::deadline::bounded;
use crate::error::DeleteError;
use crate::session::Identity;

/// Soft delete and restore. Rows are never removed.
pub struct MessageDeletion {
    messages: Arc<dyn MessageStore>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    store_timeout: Duration,
}

impl MessageDeletion {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            broadcaster,
            store_timeout,
        }
    }

    /// Only the sender may delete. Announces `message_deleted` to the room.
    pub async fn delete(
        &self,
        actor: &Identity,
        message_id: Uuid,
    ) -> Result<DateTime<Utc>, DeleteError> {
        let message = bounded(self.store_timeout, self.messages.find_message(message_id))
            .await?
            .ok_or(DeleteError::NotFound)?;

        if message.sender_id != actor.user_id {
            return Err(DeleteError::Forbidden);
        }
        if message.is_deleted {
            return Err(DeleteError::AlreadyDeleted);
        }

        let deleted_at = Utc::now();
        let changed = bounded(
            self.store_timeout,
            self.messages.set_deleted(message_id, actor.user_id, deleted_at),
        )
        .await?;
        // Lost a race with another delete of the same message
        if !changed {
            return Err(DeleteError::AlreadyDeleted);
        }

        info!(%message_id, room = %message.room_id, by = %actor.user_id, "message deleted");
        self.broadcaster.broadcast(
            message.room_id,
            ServerEvent::MessageDeleted {
                id: message_id,
                room: message.room_id,
                deleted_by: actor.user_id,
                deleted_at,
            },
        );
        Ok(deleted_at)
    }

    /// Only whoever deleted the message may restore it.
    pub async fn restore(&self, actor: &Identity, message_id: Uuid) -> Result<(), DeleteError> {
        let message = bounded(self.store_timeout, self.messages.find_message(message_id))
            .await?
            .ok_or(DeleteError::NotFound)?;

        if !message.is_deleted {
            return Err(DeleteError::NotDeleted);
        }
        if message.deleted_by != Some(actor.user_id) {
            return Err(DeleteError::Forbidden);
        }

        if !bounded(self.store_timeout, self.messages.clear_deleted(message_id)).await? {
            return Err(DeleteError::NotDeleted);
        }

        info!(%message_id, room = %message.room_id, by = %actor.user_id, "message restored");
        Ok(())
    }
}
