//! Player identity for Skirmish.
//!
//! Two concerns live here:
//!
//! 1. **Rosters** ([`Roster`], [`Player`]): the ordered member list of one
//!    session, including host promotion and the durable-token lookup used
//!    when a player comes back on a new connection.
//! 2. **The registry** ([`IdentityRegistry`]): which session a live
//!    connection currently belongs to. Every lobby command starts with
//!    this lookup.
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby Layer (above)  ← owns one Roster per session, one registry overall
//!     ↕
//! Identity Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← ConnectionHandle, SessionId, PlayerView
//! ```

mod error;
mod registry;
mod roster;

pub use error::IdentityError;
pub use registry::IdentityRegistry;
pub use roster::{Departure, Player, Resolution, Roster};
