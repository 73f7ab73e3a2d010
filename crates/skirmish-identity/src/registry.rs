//! The connection → session reverse index.
//!
//! Plain `HashMap`, not thread-safe on its own. The lifecycle manager owns
//! the only registry and is itself behind the server's mutex.

use std::collections::HashMap;

use skirmish_protocol::{ConnectionHandle, SessionId};

use crate::IdentityError;

/// Tracks which session each live connection belongs to.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: HashMap<ConnectionHandle, SessionId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `connection` is a member of `session`.
    ///
    /// Binding a connection to the session it is already in is a no-op.
    ///
    /// # Errors
    /// Returns [`IdentityError::AlreadyBound`] if the connection belongs to
    /// a different session.
    pub fn bind(
        &mut self,
        connection: ConnectionHandle,
        session: SessionId,
    ) -> Result<(), IdentityError> {
        if let Some(existing) = self.entries.get(&connection) {
            if *existing != session {
                return Err(IdentityError::AlreadyBound {
                    connection,
                    session: existing.clone(),
                });
            }
            return Ok(());
        }
        self.entries.insert(connection, session);
        Ok(())
    }

    /// Forgets a connection. Returns the session it was bound to.
    pub fn unbind(&mut self, connection: ConnectionHandle) -> Option<SessionId> {
        self.entries.remove(&connection)
    }

    pub fn session_of(&self, connection: ConnectionHandle) -> Option<&SessionId> {
        self.entries.get(&connection)
    }

    /// Moves a session membership from a stale connection to a new one.
    ///
    /// The stale entry is dropped only if it still points at `session`; it
    /// may already be gone if the old connection was cleaned up first.
    ///
    /// # Errors
    /// Returns [`IdentityError::AlreadyBound`] if `current` belongs to a
    /// different session.
    pub fn rebind(
        &mut self,
        previous: ConnectionHandle,
        current: ConnectionHandle,
        session: &SessionId,
    ) -> Result<(), IdentityError> {
        if let Some(existing) = self.entries.get(&current) {
            if existing != session {
                return Err(IdentityError::AlreadyBound {
                    connection: current,
                    session: existing.clone(),
                });
            }
        }
        if previous != current && self.entries.get(&previous) == Some(session)
        {
            self.entries.remove(&previous);
        }
        self.entries.insert(current, session.clone());
        Ok(())
    }

    /// Drops every entry pointing at `session`. Returns the handles removed.
    pub fn unbind_session(&mut self, session: &SessionId) -> Vec<ConnectionHandle> {
        let handles: Vec<ConnectionHandle> = self
            .entries
            .iter()
            .filter(|(_, s)| *s == session)
            .map(|(h, _)| *h)
            .collect();
        for handle in &handles {
            self.entries.remove(handle);
        }
        handles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
