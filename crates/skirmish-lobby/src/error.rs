//! Error types for the lobby layer.
//!
//! The `Display` text of the first five variants is exactly the `reason`
//! string clients see in `join_rejected` / `command_rejected`.

use skirmish_protocol::SessionId;

/// Errors that can occur during session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// No live session has this code (or the code was malformed).
    #[error("Lobby not found")]
    LobbyNotFound,

    /// The roster is at capacity.
    #[error("Lobby is full")]
    LobbyFull,

    /// Join-by-code into a running match, or starting one twice.
    #[error("Game already started")]
    AlreadyStarted,

    /// A host-only command from a non-host member.
    #[error("Only the host can do that")]
    NotHost,

    /// The connection is not a member of any session.
    #[error("Not in a session")]
    NotInSession,

    /// The session actor's command channel is closed.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}

impl LobbyError {
    /// The reason string sent to the client.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
