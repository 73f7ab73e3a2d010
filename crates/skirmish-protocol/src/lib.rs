//! Wire protocol for Skirmish.
//!
//! This crate defines what clients and the relay server say to each other:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`],
//!   [`SessionSnapshot`], ...): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures
//!   become bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about sessions or sockets. It sits
//! between the transport (bytes) and the lobby (session rules):
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Lobby (session actors)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Channel, ChatEntry, ClientMessage, ConnectionHandle, Envelope, JoinCode,
    PlayerView, Pose, PositionSample, Recipient, ServerMessage, SessionId,
    SessionSnapshot, Visibility,
};

/// Version announced in the `connected` greeting.
pub const PROTOCOL_VERSION: u32 = 1;
