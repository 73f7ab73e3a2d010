//! Lobby configuration and the session phase machine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Limits and defaults shared by every session.
///
/// One instance is created by the server and shared (behind an `Arc`) with
/// every session actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Roster capacity of a session.
    pub max_members: usize,

    /// Chat entries kept per session; the oldest is dropped beyond this.
    pub chat_capacity: usize,

    /// Characters kept from a chat message.
    pub chat_text_limit: usize,

    /// Chat entries included in a session snapshot.
    pub snapshot_chat_tail: usize,

    /// Characters kept from a display name.
    pub display_name_limit: usize,

    /// Name used when a client sends none (or only whitespace).
    pub default_display_name: String,

    /// Map announced when a match starts.
    pub map: String,

    /// Bounded command channel size of each session actor.
    pub channel_size: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_members: 16,
            chat_capacity: 100,
            chat_text_limit: 200,
            snapshot_chat_tail: 50,
            display_name_limit: 24,
            default_display_name: "Player".to_string(),
            map: "arabic_city".to_string(),
            channel_size: 64,
        }
    }
}

impl LobbyConfig {
    pub fn with_max_members(mut self, max_members: usize) -> Self {
        self.max_members = max_members;
        self
    }

    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.map = map.into();
        self
    }

    pub fn with_chat_capacity(mut self, chat_capacity: usize) -> Self {
        self.chat_capacity = chat_capacity;
        self
    }

    /// Cleans up a client-supplied display name.
    ///
    /// Trims surrounding whitespace and keeps at most
    /// `display_name_limit` characters. Missing or blank names become
    /// `default_display_name`.
    pub fn display_name(&self, raw: Option<&str>) -> String {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return self.default_display_name.clone();
        }
        trimmed.chars().take(self.display_name_limit).collect()
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where a session is in its life.
///
/// ```text
/// Lobby ──(explicit start / quick-match)──→ Running
/// ```
///
/// There is no terminal phase: a session ends by being destroyed when its
/// last member leaves, whichever phase it is in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum SessionPhase {
    /// Gathering players. Join-by-code is allowed.
    #[default]
    Lobby,
    /// Match in progress. Only quick-match and rejoin may add members.
    Running,
}

impl SessionPhase {
    pub fn is_running(self) -> bool {
        self == SessionPhase::Running
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Running => write!(f, "Running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_config_default() {
        let config = LobbyConfig::default();
        assert_eq!(config.max_members, 16);
        assert_eq!(config.chat_capacity, 100);
        assert_eq!(config.chat_text_limit, 200);
        assert_eq!(config.snapshot_chat_tail, 50);
        assert_eq!(config.default_display_name, "Player");
        assert_eq!(config.map, "arabic_city");
    }

    #[test]
    fn test_lobby_config_builder_methods() {
        let config = LobbyConfig::default()
            .with_max_members(2)
            .with_map("dust")
            .with_chat_capacity(5);
        assert_eq!(config.max_members, 2);
        assert_eq!(config.map, "dust");
        assert_eq!(config.chat_capacity, 5);
    }

    #[test]
    fn test_display_name_defaults_when_missing_or_blank() {
        let config = LobbyConfig::default();
        assert_eq!(config.display_name(None), "Player");
        assert_eq!(config.display_name(Some("")), "Player");
        assert_eq!(config.display_name(Some("   ")), "Player");
    }

    #[test]
    fn test_display_name_trims_and_clamps_by_chars() {
        let config = LobbyConfig::default();
        assert_eq!(config.display_name(Some("  Ana ")), "Ana");

        let long = "é".repeat(40);
        let clamped = config.display_name(Some(&long));
        assert_eq!(clamped.chars().count(), 24);
    }

    #[test]
    fn test_session_phase_default_and_display() {
        assert_eq!(SessionPhase::default(), SessionPhase::Lobby);
        assert!(!SessionPhase::Lobby.is_running());
        assert!(SessionPhase::Running.is_running());
        assert_eq!(SessionPhase::Running.to_string(), "Running");
    }
}
