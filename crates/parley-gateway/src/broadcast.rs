use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use parley_types::events::ServerEvent;

pub type ConnectionId = Uuid;

/// Room event queue of one connection. Bounded; a full queue drops events for
/// that connection only.
pub type Outbound = mpsc::Sender<Arc<ServerEvent>>;

/// Fan-out of events to the connections currently joined to a room.
///
/// Delivery is best-effort per connection and never blocks the caller.
/// Implementations deliver to the membership snapshot taken when
/// `broadcast` is invoked.
pub trait RoomBroadcaster: Send + Sync {
    /// Make a connection reachable. Must precede `join`.
    fn register(&self, conn: ConnectionId, outbound: Outbound);

    /// Forget a connection and its outbound queue.
    fn unregister(&self, conn: ConnectionId);

    fn join(&self, room: Uuid, conn: ConnectionId);

    fn leave(&self, room: Uuid, conn: ConnectionId);

    /// Connections joined to `room` on this node.
    fn members(&self, room: Uuid) -> Vec<ConnectionId>;

    fn broadcast(&self, room: Uuid, event: ServerEvent);
}

/// Single-node broadcaster: room -> connection set, connection -> queue.
#[derive(Default)]
pub struct LocalBroadcaster {
    connections: DashMap<ConnectionId, Outbound>,
    rooms: DashMap<Uuid, HashSet<ConnectionId>>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an already shared event to the current members of `room`.
    /// Returns how many connections accepted it.
    pub fn deliver(&self, room: Uuid, event: Arc<ServerEvent>) -> usize {
        // Snapshot, then release the shard lock before touching queues
        let members = self.members(room);
        let mut delivered = 0;

        for conn in members {
            let Some(outbound) = self.connections.get(&conn).map(|e| e.value().clone()) else {
                continue;
            };
            match outbound.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        %conn,
                        %room,
                        event = event.name(),
                        "outbound queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%conn, %room, "connection closed before delivery");
                }
            }
        }

        trace!(%room, event = event.name(), delivered, "room broadcast");
        delivered
    }
}

impl RoomBroadcaster for LocalBroadcaster {
    fn register(&self, conn: ConnectionId, outbound: Outbound) {
        self.connections.insert(conn, outbound);
    }

    fn unregister(&self, conn: ConnectionId) {
        self.connections.remove(&conn);
    }

    fn join(&self, room: Uuid, conn: ConnectionId) {
        self.rooms.entry(room).or_default().insert(conn);
    }

    fn leave(&self, room: Uuid, conn: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&conn);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }

    fn members(&self, room: Uuid) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn broadcast(&self, room: Uuid, event: ServerEvent) {
        self.deliver(room, Arc::new(event));
    }
}
