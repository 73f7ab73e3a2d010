//! Players and the ordered roster of one session.
//!
//! Join order matters: when the host leaves, the earliest-joined remaining
//! member is promoted. A `Vec` keeps that order for free, and rosters are
//! small (16 at most by default), so linear scans are fine.

use skirmish_protocol::{ConnectionHandle, PlayerView};

use crate::IdentityError;

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One member of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// The live connection currently driving this player. Replaced in
    /// place when the player rejoins on a new connection.
    pub connection: ConnectionHandle,
    pub display_name: String,
    pub is_host: bool,
    /// Client-retained proof used to reclaim this slot after a reconnect.
    /// Never leaves the server.
    pub durable_token: Option<String>,
}

impl Player {
    /// Creates a non-host player.
    pub fn new(
        connection: ConnectionHandle,
        display_name: impl Into<String>,
        durable_token: Option<String>,
    ) -> Self {
        Self {
            connection,
            display_name: display_name.into(),
            is_host: false,
            durable_token,
        }
    }

    /// The outward-facing view of this player, without the token.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            connection_handle: self.connection,
            display_name: self.display_name.clone(),
            is_host: self.is_host,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened when a member was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The removed player, as they were just before removal.
    pub player: Player,
    /// The member promoted to host, if the departing player was host and
    /// anyone is left.
    pub promoted: Option<ConnectionHandle>,
}

/// How [`Roster::resolve_or_create`] placed a returning connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// An existing slot was taken over; `previous` is the handle it had.
    Rebound { previous: ConnectionHandle },
    /// No slot matched, so a new non-host member was appended.
    Created,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// The members of one session in join order.
///
/// Holds the host invariant: whenever the roster is non-empty exactly one
/// member has `is_host == true`.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: Vec<Player>,
}

impl Roster {
    /// Creates a roster whose first member is the host.
    pub fn with_host(mut host: Player) -> Self {
        host.is_host = true;
        Self {
            members: vec![host],
        }
    }

    /// Appends a member. The first member of an empty roster becomes host;
    /// everyone else joins as a regular member.
    pub fn push_member(&mut self, mut player: Player) {
        player.is_host = self.members.is_empty();
        self.members.push(player);
    }

    /// Removes the member with this handle.
    ///
    /// If the host leaves, the earliest-joined remaining member is
    /// promoted. Returns `None` if no member has this handle.
    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<Departure> {
        let index = self.position(handle)?;
        let player = self.members.remove(index);

        let promoted = if player.is_host {
            self.members.first_mut().map(|next| {
                next.is_host = true;
                next.connection
            })
        } else {
            None
        };

        Some(Departure { player, promoted })
    }

    /// Places a returning connection onto the roster.
    ///
    /// Matching order:
    /// 1. A member carrying the same durable token.
    /// 2. Otherwise a member with the same display name **and no token at
    ///    all**. A member holding a different token is never matched by
    ///    name. If several qualify, the earliest-joined wins.
    ///
    /// A matched member keeps its host flag, name, token, and position; only
    /// its connection changes. Without a match a non-host member is
    /// appended, provided the roster has fewer than `capacity` members.
    ///
    /// # Errors
    /// Returns [`IdentityError::RosterFull`] when nothing matched and the
    /// roster is at capacity.
    pub fn resolve_or_create(
        &mut self,
        connection: ConnectionHandle,
        durable_token: Option<&str>,
        display_name: &str,
        capacity: usize,
    ) -> Result<Resolution, IdentityError> {
        let by_token = durable_token.and_then(|token| {
            self.members
                .iter()
                .position(|p| p.durable_token.as_deref() == Some(token))
        });
        let found = by_token.or_else(|| {
            self.members.iter().position(|p| {
                p.durable_token.is_none() && p.display_name == display_name
            })
        });

        if let Some(index) = found {
            let slot = &mut self.members[index];
            let previous = slot.connection;
            slot.connection = connection;
            return Ok(Resolution::Rebound { previous });
        }

        if self.members.len() >= capacity {
            return Err(IdentityError::RosterFull(self.members.len()));
        }

        self.push_member(Player::new(
            connection,
            display_name,
            durable_token.map(str::to_string),
        ));
        Ok(Resolution::Created)
    }

    pub fn host(&self) -> Option<&Player> {
        self.members.iter().find(|p| p.is_host)
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&Player> {
        self.members.iter().find(|p| p.connection == handle)
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.position(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.members.iter()
    }

    /// Token-free views of every member, in join order.
    pub fn views(&self) -> Vec<PlayerView> {
        self.members.iter().map(Player::view).collect()
    }

    fn position(&self, handle: ConnectionHandle) -> Option<usize> {
        self.members.iter().position(|p| p.connection == handle)
    }
}
