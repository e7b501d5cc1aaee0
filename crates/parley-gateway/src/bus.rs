//! Multi-node fan-out. Every node keeps its own `LocalBroadcaster` for the
//! connections it owns and exchanges room events over an `EventBus`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use parley_types::events::ServerEvent;

use crate::broadcast::{ConnectionId, LocalBroadcaster, Outbound, RoomBroadcaster};

/// A room event as it travels between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEnvelope {
    pub room: Uuid,
    pub event: ServerEvent,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no subscribers on the bus")]
    NoSubscribers,
    #[error("bus publish failed: {0}")]
    Publish(String),
}

/// Pub/sub transport shared by all nodes.
pub trait EventBus: Send + Sync {
    fn publish(&self, envelope: RoomEnvelope) -> Result<(), BusError>;
    fn subscribe(&self) -> broadcast::Receiver<RoomEnvelope>;
}

/// Bus backed by a tokio broadcast channel. Suitable for one process hosting
/// several broadcasters, and as the reference implementation for tests.
pub struct InProcessBus {
    tx: broadcast::Sender<RoomEnvelope>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl EventBus for InProcessBus {
    fn publish(&self, envelope: RoomEnvelope) -> Result<(), BusError> {
        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers)
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEnvelope> {
        self.tx.subscribe()
    }
}

/// Publishes broadcasts to the bus; a pump task delivers whatever arrives on
/// the bus to this node's members.
pub struct BusBroadcaster {
    local: Arc<LocalBroadcaster>,
    bus: Arc<dyn EventBus>,
}

impl BusBroadcaster {
    /// Subscribe to the bus and start the delivery pump.
    pub fn spawn(bus: Arc<dyn EventBus>) -> (Arc<Self>, JoinHandle<()>) {
        let local = Arc::new(LocalBroadcaster::new());
        let mut rx = bus.subscribe();
        let pump_local = local.clone();

        let pump = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        pump_local.deliver(envelope.room, Arc::new(envelope.event));
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Bus receiver lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        (Arc::new(Self { local, bus }), pump)
    }
}

impl RoomBroadcaster for BusBroadcaster {
    fn register(&self, conn: ConnectionId, outbound: Outbound) {
        self.local.register(conn, outbound);
    }

    fn unregister(&self, conn: ConnectionId) {
        self.local.unregister(conn);
    }

    fn join(&self, room: Uuid, conn: ConnectionId) {
        self.local.join(room, conn);
    }

    fn leave(&self, room: Uuid, conn: ConnectionId) {
        self.local.leave(room, conn);
    }

    fn members(&self, room: Uuid) -> Vec<ConnectionId> {
        self.local.members(room)
    }

    fn broadcast(&self, room: Uuid, event: ServerEvent) {
        let envelope = RoomEnvelope { room, event };
        if let Err(e) = self.bus.publish(envelope.clone()) {
            // Local members still get it even if the bus is down
            error!(%room, "bus publish failed, delivering locally only: {}", e);
            self.local.deliver(envelope.room, Arc::new(envelope.event));
        }
    }
}
