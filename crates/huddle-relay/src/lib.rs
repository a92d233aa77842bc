//! Huddle relay core.
//!
//! Keeps persistent connections grouped into named rooms and fans out two
//! kinds of frames to each room:
//! - chat text, delivered to every member including the sender;
//! - binary media, delivered to every member except the sender.
//!
//! Best-effort, in-memory, at-most-once. The transport layer (handshake,
//! framing, room-name parsing) stays outside: it calls [`Relay::on_join`],
//! [`Relay::on_message`] and [`Relay::on_disconnect`], and drains each
//! connection's [`OutboundReceiver`].
//!
//! # Quick start
//!
//! ```rust
//! use bytes::Bytes;
//! use huddle_relay::{Frame, Relay, RelayConfig, RoomId};
//!
//! # fn main() -> Result<(), huddle_relay::RelayError> {
//! let relay = Relay::new(RelayConfig::new());
//! let room = RoomId::parse("lobby")?;
//!
//! let (alice, _alice_rx) = relay.connect();
//! let (bob, mut bob_rx) = relay.connect();
//! relay.on_join(&room, &alice)?;
//! relay.on_join(&room, &bob)?;
//!
//! relay.on_message(&room, &alice, Bytes::from_static(b"\x00video"), true)?;
//! assert!(matches!(bob_rx.try_recv(), Some(Frame::Binary(_))));
//!
//! relay.on_disconnect(&alice);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod message;
pub mod registry;
pub mod relay;
pub mod types;

pub use config::{RelayConfig, DEFAULT_OUTBOUND_BUFFER};
pub use connection::{ConnectionHandle, Frame, Outbound, OutboundReceiver};
pub use error::{RelayError, SendError};
pub use fanout::{DeliveryReport, FanoutEngine, FanoutStats, SlowMemberPolicy};
pub use message::{Message, Routing};
pub use registry::{JoinOutcome, RoomInfo, RoomRegistry};
pub use relay::{Relay, RelayStats};
pub use types::{now_ms, ConnectionId, RoomId};
