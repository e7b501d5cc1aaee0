//! Realtime side of parley: WebSocket sessions, room fan-out and the
//! message pipeline shared with the HTTP API.

pub mod broadcast;
pub mod bus;
pub mod connection;
pub mod deadline;
pub mod deletion;
pub mod error;
pub mod guard;
pub mod hub;
pub mod pipeline;
pub mod relay;
pub mod session;
pub mod validate;

pub use broadcast::{LocalBroadcaster, RoomBroadcaster};
pub use hub::{Hub, HubConfig, Stores};
pub use session::{Handshake, Identity};
