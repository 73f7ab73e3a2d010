//! # Skirmish
//!
//! Session lifecycle and position relay for small browser shooters.
//!
//! Players create or join sessions by 6-digit code (or quick-match into a
//! public one), chat in the lobby, and once the host starts the match the
//! server fans each player's pose out to everyone else. A player who drops
//! can rejoin and reclaim their roster slot with a durable token.
//!
//! This crate wires the layers together: transport → protocol → lobby.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skirmish::prelude::*;
//!
//! # async fn run() -> Result<(), SkirmishError> {
//! let server = SkirmishServer::builder()
//!     .bind("0.0.0.0:3000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::SkirmishError;
pub use server::{SkirmishServer, SkirmishServerBuilder};

pub mod prelude {
    pub use crate::{
        ServerConfig, SkirmishError, SkirmishServer, SkirmishServerBuilder,
    };
    pub use skirmish_lobby::LobbyConfig;
    pub use skirmish_protocol::{
        ClientMessage, ConnectionHandle, Envelope, ServerMessage,
        PROTOCOL_VERSION,
    };
}
