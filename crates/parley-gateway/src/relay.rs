use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::{MessageStore, RoomStore};
use parley_types::events::{ServerEvent, TypingEvent};

use crate::broadcast::RoomBroadcaster;
use crate::deadline::bounded;
use crate::error::ReadError;
use crate::guard::MembershipGuard;
use crate::session::Identity;

/// Transient typing signals and durable read receipts.
pub struct Relay {
    guard: Arc<MembershipGuard>,
    messages: Arc<dyn MessageStore>,
    rooms: Arc<dyn RoomStore>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    store_timeout: Duration,
}

impl Relay {
    pub fn new(
        guard: Arc<MembershipGuard>,
        messages: Arc<dyn MessageStore>,
        rooms: Arc<dyn RoomStore>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            messages,
            rooms,
            broadcaster,
            store_timeout,
        }
    }

    /// Broadcast straight away. Membership is not checked.
    pub fn typing_start(&self, sender: &Identity, room: Uuid) {
        self.typing(sender, room, true);
    }

    pub fn typing_end(&self, sender: &Identity, room: Uuid) {
        self.typing(sender, room, false);
    }

    fn typing(&self, sender: &Identity, room: Uuid, is_typing: bool) {
        let event = TypingEvent {
            sender_id: sender.user_id,
            sender_name: sender.username.clone(),
            room,
            is_typing,
        };
        self.broadcaster.broadcast(room, ServerEvent::typing(event));
    }

    /// Add the reader to read-by on every message in the room it did not send,
    /// then announce the receipt. Returns how many messages changed.
    pub async fn mark_read(&self, reader: &Identity, room: Uuid) -> Result<u64, ReadError> {
        if !self.guard.is_member(reader.user_id, room).await {
            return Err(ReadError::NotInRoom);
        }

        let now = Utc::now();
        let updated =
            bounded(self.store_timeout, self.messages.mark_read(room, reader.user_id, now)).await?;

        // Counter reset is cosmetic; the receipt already stands
        if let Err(e) = bounded(self.store_timeout, self.rooms.reset_unread(room)).await {
            warn!(%room, "failed to reset unread count: {}", e);
        }

        info!(%room, reader = %reader.user_id, updated, "messages marked read");
        self.broadcaster.broadcast(
            room,
            ServerEvent::MessageRead {
                room,
                user_id: reader.user_id,
                timestamp: now,
            },
        );
        debug!(%room, "read receipt broadcast");
        Ok(updated)
    }
}
