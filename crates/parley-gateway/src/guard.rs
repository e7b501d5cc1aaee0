use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use uuid::Uuid;

use parley_db::{BlockRegistry, RoomStore};
use parley_types::models::Room;

use crate::deadline::bounded;

/// Room access and block-list checks.
///
/// Membership fails closed: a missing room or a failed room lookup denies.
/// The block check fails open per participant: if one participant's block
/// lookup errors, that participant is treated as not blocking.
pub struct MembershipGuard {
    rooms: Arc<dyn RoomStore>,
    blocks: Arc<dyn BlockRegistry>,
    deadline: Duration,
}

impl MembershipGuard {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        blocks: Arc<dyn BlockRegistry>,
        deadline: Duration,
    ) -> Self {
        Self {
            rooms,
            blocks,
            deadline,
        }
    }

    pub async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> bool {
        self.load_room(room_id)
            .await
            .is_some_and(|room| room.admits(user_id))
    }

    /// True if any other participant has blocked `sender_id`. Stops at the first match.
    pub async fn is_blocked_by_someone_in_room(&self, sender_id: Uuid, room_id: Uuid) -> bool {
        let Some(room) = self.load_room(room_id).await else {
            return true;
        };

        for participant in room.others(sender_id) {
            match bounded(self.deadline, self.blocks.is_blocked(participant, sender_id)).await {
                Ok(true) => {
                    warn!(
                        %room_id,
                        sender = %sender_id,
                        blocker = %participant,
                        "sender is blocked in room"
                    );
                    return true;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        %room_id,
                        sender = %sender_id,
                        %participant,
                        "block lookup failed, treating as not blocked: {}",
                        e
                    );
                }
            }
        }

        false
    }

    async fn load_room(&self, room_id: Uuid) -> Option<Room> {
        match bounded(self.deadline, self.rooms.find_room(room_id)).await {
            Ok(room) => room,
            Err(e) => {
                error!(%room_id, "room lookup failed: {}", e);
                None
            }
        }
    }
}
