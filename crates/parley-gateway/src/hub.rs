use std::sync::Arc;
use std::time::Duration;

use parley_crypto::ContentCipher;
use parley_db::{BlockRegistry, Database, MessageStore, RoomStore};

use crate::broadcast::RoomBroadcaster;
use crate::deletion::MessageDeletion;
use crate::guard::MembershipGuard;
use crate::pipeline::MessagePipeline;
use crate::relay::Relay;
use crate::session::SessionRegistry;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub jwt_secret: String,
    /// Deadline for every store and crypto call on the request path.
    pub store_timeout: Duration,
    /// Deadline for the detached room summary update.
    pub summary_timeout: Duration,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            store_timeout: Duration::from_secs(5),
            summary_timeout: Duration::from_secs(10),
            outbound_buffer: 256,
        }
    }
}

/// The persistence collaborators the services read and write.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub rooms: Arc<dyn RoomStore>,
    pub blocks: Arc<dyn BlockRegistry>,
}

impl Stores {
    /// All three views backed by one SQLite database.
    pub fn sqlite(db: &Database) -> Self {
        Self {
            messages: Arc::new(db.clone()),
            rooms: Arc::new(db.clone()),
            blocks: Arc::new(db.clone()),
        }
    }
}

/// Every realtime service, wired together once and shared by the WebSocket
/// gateway and the HTTP API.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: SessionRegistry,
    guard: Arc<MembershipGuard>,
    pipeline: MessagePipeline,
    relay: Relay,
    deletion: MessageDeletion,
}

impl Hub {
    pub fn new(
        config: &HubConfig,
        stores: Stores,
        cipher: Arc<dyn ContentCipher>,
        broadcaster: Arc<dyn RoomBroadcaster>,
    ) -> Self {
        let guard = Arc::new(MembershipGuard::new(
            stores.rooms.clone(),
            stores.blocks.clone(),
            config.store_timeout,
        ));

        let registry = SessionRegistry::new(
            &config.jwt_secret,
            broadcaster.clone(),
            config.outbound_buffer,
        );
        let pipeline = MessagePipeline::new(
            guard.clone(),
            stores.messages.clone(),
            stores.rooms.clone(),
            cipher,
            broadcaster.clone(),
            config.store_timeout,
            config.summary_timeout,
        );
        let relay = Relay::new(
            guard.clone(),
            stores.messages.clone(),
            stores.rooms,
            broadcaster.clone(),
            config.store_timeout,
        );
        let deletion = MessageDeletion::new(stores.messages, broadcaster, config.store_timeout);

        Self {
            inner: Arc::new(HubInner {
                registry,
                guard,
                pipeline,
                relay,
                deletion,
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn guard(&self) -> &MembershipGuard {
        &self.inner.guard
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.inner.pipeline
    }

    pub fn relay(&self) -> &Relay {
        &self.inner.relay
    }

    pub fn deletion(&self) -> &MessageDeletion {
        &self.inner.deletion
    }
}
