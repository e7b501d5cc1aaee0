#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use parley_crypto::{AesGcmCipher, ContentCipher, keys::generate_key};
use parley_db::Database;
use parley_gateway::session::{Session, SessionInbox};
use parley_gateway::{Hub, HubConfig, Identity, LocalBroadcaster, Stores};
use parley_types::events::ServerEvent;

pub type Inbox = SessionInbox;

pub struct Harness {
    pub db: Database,
    pub hub: Hub,
    pub cipher: Arc<AesGcmCipher>,
    pub room: Uuid,
    pub alice: Identity,
    pub bob: Identity,
    pub carol: Identity,
}

pub fn identity(name: &str) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        username: name.into(),
    }
}

pub fn config() -> HubConfig {
    HubConfig {
        jwt_secret: "test-secret".into(),
        store_timeout: Duration::from_millis(200),
        summary_timeout: Duration::from_millis(500),
        outbound_buffer: 32,
    }
}

impl Harness {
    /// Room with alice (creator) and bob. Carol exists but is not a participant.
    pub fn new() -> Self {
        Self::with(|stores, _| stores, None)
    }

    /// Build with replaced stores and/or cipher for failure injection.
    pub fn with<F>(customize: F, cipher: Option<Arc<dyn ContentCipher>>) -> Self
    where
        F: FnOnce(Stores, &Database) -> Stores,
    {
        let db = Database::open_in_memory().unwrap();
        let (alice, bob, carol) = (identity("alice"), identity("bob"), identity("carol"));
        let room = Uuid::new_v4();
        db.create_room(room, "general", alice.user_id, &[alice.user_id, bob.user_id])
            .unwrap();

        let aes = Arc::new(AesGcmCipher::new(&generate_key()));
        let cipher = cipher.unwrap_or_else(|| aes.clone() as Arc<dyn ContentCipher>);
        let stores = customize(Stores::sqlite(&db), &db);
        let hub = Hub::new(&config(), stores, cipher, Arc::new(LocalBroadcaster::new()));

        Self {
            db,
            hub,
            cipher: aes,
            room,
            alice,
            bob,
            carol,
        }
    }

    /// Open a session and join the harness room.
    pub fn connect(&self, who: &Identity) -> (Session, Inbox) {
        let (mut session, rx) = self.hub.registry().open(who.clone());
        self.hub.registry().join(&mut session, self.room);
        (session, rx)
    }
}

pub async fn next_event(rx: &mut Inbox) -> ServerEvent {
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("outbound queue closed");
    (*event).clone()
}

pub fn assert_quiet(rx: &mut Inbox) {
    if let Some(event) = rx.try_recv() {
        panic!("unexpected event: {:?}", event);
    }
}

/// Poll until `check` passes; the room summary update runs detached.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}
