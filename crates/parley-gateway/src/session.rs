use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use parley_types::api::Claims;
use parley_types::events::ServerEvent;

use crate::broadcast::{ConnectionId, RoomBroadcaster};
use crate::error::AuthError;

/// Verified user bound to a connection for its whole life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

/// Credential sources on the upgrade request.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    /// `?token=` query parameter
    pub token: Option<String>,
    /// Raw `Authorization` header
    pub authorization: Option<String>,
}

impl Handshake {
    /// Query token wins over the header. Blank values count as absent.
    pub fn bearer(&self) -> Option<&str> {
        let from_query = self.token.as_deref().map(str::trim);
        let from_header = self
            .authorization
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        from_query
            .filter(|t| !t.is_empty())
            .or(from_header.filter(|t| !t.is_empty()))
    }
}

/// Direct replies to one connection (ready, ack, error, pong). Unbounded so
/// room traffic can never crowd out an acknowledgement.
pub type DirectReply = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Per-connection state, owned by the transport task.
///
/// Exists only after authentication succeeded; `SessionRegistry::disconnect`
/// consumes it, so there is no way back to an unauthenticated state.
pub struct Session {
    id: ConnectionId,
    identity: Identity,
    rooms: HashSet<Uuid>,
    replies: DirectReply,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_joined(&self, room: Uuid) -> bool {
        self.rooms.contains(&room)
    }

    /// Handle for replying to this connection from a spawned task.
    pub fn replies(&self) -> DirectReply {
        self.replies.clone()
    }

    /// Direct reply to this connection only. Returns false if it is gone.
    pub fn reply(&self, event: ServerEvent) -> bool {
        send_direct(&self.replies, event)
    }
}

/// Queue an event for one connection without waiting.
pub fn send_direct(replies: &DirectReply, event: ServerEvent) -> bool {
    let name = event.name();
    match replies.send(Arc::new(event)) {
        Ok(()) => true,
        Err(_) => {
            debug!(event = name, "direct reply dropped, connection closed");
            false
        }
    }
}

/// Everything queued for one connection: direct replies and room events.
pub struct SessionInbox {
    direct: mpsc::UnboundedReceiver<Arc<ServerEvent>>,
    room: mpsc::Receiver<Arc<ServerEvent>>,
}

impl SessionInbox {
    /// Next event, direct replies first. `None` once both queues are closed.
    pub async fn recv(&mut self) -> Option<Arc<ServerEvent>> {
        tokio::select! {
            biased;
            Some(event) = self.direct.recv() => Some(event),
            Some(event) = self.room.recv() => Some(event),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<Arc<ServerEvent>> {
        self.direct
            .try_recv()
            .ok()
            .or_else(|| self.room.try_recv().ok())
    }
}

/// Binds live connections to identities and keeps their room memberships in
/// sync with the broadcaster.
pub struct SessionRegistry {
    decoding_key: DecodingKey,
    validation: Validation,
    broadcaster: Arc<dyn RoomBroadcaster>,
    outbound_buffer: usize,
    live: AtomicUsize,
}

impl SessionRegistry {
    pub fn new(
        jwt_secret: &str,
        broadcaster: Arc<dyn RoomBroadcaster>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation: Validation::default(),
            broadcaster,
            outbound_buffer: outbound_buffer.max(1),
            live: AtomicUsize::new(0),
        }
    }

    /// Verify the handshake's bearer token (signature and expiry).
    pub fn authenticate(&self, handshake: &Handshake) -> Result<Identity, AuthError> {
        let token = handshake.bearer().ok_or(AuthError::MissingCredential)?;
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims.into())
    }

    /// Start a session for an authenticated identity. The inbox is what the
    /// transport drains into the socket.
    pub fn open(&self, identity: Identity) -> (Session, SessionInbox) {
        let (room_tx, room_rx) = mpsc::channel(self.outbound_buffer);
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let session = Session {
            id: Uuid::new_v4(),
            identity,
            rooms: HashSet::new(),
            replies: direct_tx,
        };
        self.broadcaster.register(session.id, room_tx);
        let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            conn = %session.id,
            user = %session.identity.user_id,
            username = %session.identity.username,
            live,
            "session opened"
        );
        (session, SessionInbox { direct: direct_rx, room: room_rx })
    }

    /// Returns false if the room was already joined.
    pub fn join(&self, session: &mut Session, room: Uuid) -> bool {
        if !session.rooms.insert(room) {
            return false;
        }
        self.broadcaster.join(room, session.id);
        info!(conn = %session.id, username = %session.identity.username, %room, "joined room");
        true
    }

    /// Returns false if the room was not joined.
    pub fn leave(&self, session: &mut Session, room: Uuid) -> bool {
        if !session.rooms.remove(&room) {
            return false;
        }
        self.broadcaster.leave(room, session.id);
        info!(conn = %session.id, username = %session.identity.username, %room, "left room");
        true
    }

    /// Drop every room registration for the connection. Durable state is untouched.
    pub fn disconnect(&self, session: Session) {
        for room in &session.rooms {
            self.broadcaster.leave(*room, session.id);
        }
        self.broadcaster.unregister(session.id);

        // Sessions are only created by `open`, so this never underflows
        let live = self.live.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(
            conn = %session.id,
            username = %session.identity.username,
            rooms = session.rooms.len(),
            live,
            "session closed"
        );
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::LocalBroadcaster;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token(secret: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "alice".into(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn registry() -> (SessionRegistry, Arc<LocalBroadcaster>) {
        let broadcaster = Arc::new(LocalBroadcaster::new());
        (SessionRegistry::new(SECRET, broadcaster.clone(), 8), broadcaster)
    }

    #[test]
    fn missing_token_is_rejected() {
        let (registry, _) = registry();
        let err = registry.authenticate(&Handshake::default()).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential));

        let blank = Handshake { token: Some("  ".into()), authorization: None };
        assert!(matches!(registry.authenticate(&blank), Err(AuthError::MissingCredential)));
    }

    #[test]
    fn bad_signature_and_expired_tokens_are_rejected() {
        let (registry, _) = registry();

        let forged = Handshake { token: Some(token("other-secret", 3600)), authorization: None };
        assert!(matches!(registry.authenticate(&forged), Err(AuthError::InvalidCredential(_))));

        let expired = Handshake { token: Some(token(SECRET, -3600)), authorization: None };
        assert!(matches!(registry.authenticate(&expired), Err(AuthError::InvalidCredential(_))));
    }

    #[test]
    fn header_token_is_accepted() {
        let (registry, _) = registry();
        let handshake = Handshake {
            token: None,
            authorization: Some(format!("Bearer {}", token(SECRET, 3600))),
        };
        let identity = registry.authenticate(&handshake).unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn disconnect_drops_every_room_registration() {
        let (registry, broadcaster) = registry();
        let identity = Identity { user_id: Uuid::new_v4(), username: "alice".into() };
        let (mut session, _rx) = registry.open(identity);
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(registry.join(&mut session, r1));
        assert!(!registry.join(&mut session, r1));
        assert!(registry.join(&mut session, r2));
        assert_eq!(registry.live_sessions(), 1);

        let conn = session.id();
        registry.disconnect(session);

        assert!(!broadcaster.members(r1).contains(&conn));
        assert!(!broadcaster.members(r2).contains(&conn));
        assert_eq!(registry.live_sessions(), 0);
    }

    #[test]
    fn leave_is_idempotent() {
        let (registry, broadcaster) = registry();
        let identity = Identity { user_id: Uuid::new_v4(), username: "bob".into() };
        let (mut session, _rx) = registry.open(identity);
        let room = Uuid::new_v4();

        assert!(!registry.leave(&mut session, room));
        registry.join(&mut session, room);
        assert!(registry.leave(&mut session, room));
        assert!(!registry.leave(&mut session, room));
        assert!(broadcaster.members(room).is_empty());
        assert!(!session.is_joined(room));
    }

    #[tokio::test]
    async fn direct_replies_survive_a_full_room_queue() {
        let (registry, broadcaster) = registry();
        let identity = Identity { user_id: Uuid::new_v4(), username: "alice".into() };
        let (mut session, mut inbox) = registry.open(identity);
        let room = Uuid::new_v4();
        registry.join(&mut session, room);

        // Buffer is 8; the ninth broadcast is dropped for this connection
        for _ in 0..9 {
            broadcaster.broadcast(room, ServerEvent::Pong);
        }
        assert!(session.reply(ServerEvent::Error { reason: "x".into() }));

        // Direct reply jumps ahead of the queued room traffic
        assert!(matches!(*inbox.recv().await.unwrap(), ServerEvent::Error { .. }));
        let mut room_events = 0;
        while inbox.try_recv().is_some() {
            room_events += 1;
        }
        assert_eq!(room_events, 8);
    }
}
