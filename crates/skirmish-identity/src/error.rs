//! Error types for the identity layer.

use skirmish_protocol::{ConnectionHandle, SessionId};

/// Errors that can occur while binding connections to sessions or
/// resolving players.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The connection is not a member of any session.
    #[error("connection {0} is not bound to a session")]
    NotBound(ConnectionHandle),

    /// The connection already belongs to another session. A connection is
    /// in at most one session at a time; callers leave first.
    #[error("connection {connection} is already bound to session {session}")]
    AlreadyBound {
        connection: ConnectionHandle,
        session: SessionId,
    },

    /// No roster slot matched and the roster has no room for a new one.
    #[error("roster is full ({0} members)")]
    RosterFull(usize),
}
