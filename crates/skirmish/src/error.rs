//! Unified error type for the Skirmish server.

use skirmish_lobby::LobbyError;
use skirmish_protocol::ProtocolError;
use skirmish_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SkirmishError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid join code).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby-level error (not found, full, not host, ...).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
