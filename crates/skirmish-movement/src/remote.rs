//! Remote avatars driven by relay events.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use skirmish_protocol::{ConnectionHandle, PlayerView, Pose, ServerMessage};

/// Fraction of the remaining distance covered per [`RemoteRoster::smooth`].
pub const SMOOTHING: f32 = 0.18;

/// Avatar centre sits this far below the reported eye.
pub const AVATAR_DROP: f32 = 0.9;

const FALLBACK_NAME: &str = "Player";

/// Another member's avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub display_name: String,
    /// Where the avatar is drawn this frame.
    pub current: Vec3,
    /// Where the last pose puts it.
    pub target: Vec3,
    pub yaw: f32,
}

impl RemotePlayer {
    fn new(display_name: String, target: Vec3, yaw: f32) -> Self {
        Self {
            display_name,
            current: target,
            target,
            yaw,
        }
    }
}

/// Every remote avatar this client knows about.
#[derive(Debug, Default)]
pub struct RemoteRoster {
    own: Option<ConnectionHandle>,
    names: HashMap<ConnectionHandle, String>,
    players: BTreeMap<ConnectionHandle, RemotePlayer>,
}

impl RemoteRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The local connection; its own poses are never turned into avatars.
    pub fn own_handle(&self) -> Option<ConnectionHandle> {
        self.own
    }

    /// Folds one server event into the roster. Events that carry neither
    /// poses nor names are ignored.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Connected { connection_handle, .. } => {
                self.own = Some(*connection_handle);
                self.players.remove(connection_handle);
            }
            ServerMessage::SessionCreated { snapshot, .. }
            | ServerMessage::SessionJoined { snapshot, .. }
            | ServerMessage::RosterUpdated { snapshot } => {
                self.learn_names(&snapshot.roster);
            }
            ServerMessage::MatchStarted { roster, .. } => {
                self.learn_names(roster);
            }
            ServerMessage::PoseBroadcast {
                connection_handle,
                pose,
            } => self.upsert(*connection_handle, *pose, None),
            ServerMessage::PoseSnapshot { poses } => {
                for (handle, sample) in poses {
                    self.upsert(*handle, sample.pose(), Some(&sample.display_name));
                }
            }
            ServerMessage::MemberLeft { connection_handle } => {
                self.players.remove(connection_handle);
                self.names.remove(connection_handle);
            }
            _ => {}
        }
    }

    /// Moves every avatar a fixed fraction toward its target.
    pub fn smooth(&mut self) {
        for player in self.players.values_mut() {
            player.current = player.current.lerp(player.target, SMOOTHING);
        }
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&RemotePlayer> {
        self.players.get(&handle)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&ConnectionHandle, &RemotePlayer)> {
        self.players.iter()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Drops every avatar, e.g. after leaving a session.
    pub fn clear(&mut self) {
        self.players.clear();
        self.names.clear();
    }

    fn learn_names(&mut self, roster: &[PlayerView]) {
        for view in roster {
            self.names
                .insert(view.connection_handle, view.display_name.clone());
            if let Some(player) = self.players.get_mut(&view.connection_handle) {
                player.display_name = view.display_name.clone();
            }
        }
    }

    /// Retargets an avatar, creating it on first sight. A new avatar takes
    /// its name from the roster, then from `hint`, then the fallback.
    fn upsert(&mut self, handle: ConnectionHandle, pose: Pose, hint: Option<&str>) {
        if Some(handle) == self.own {
            return;
        }
        let target = Vec3::new(pose.x, pose.y - AVATAR_DROP, pose.z);
        match self.players.get_mut(&handle) {
            Some(player) => {
                player.target = target;
                player.yaw = pose.yaw;
            }
            None => {
                let name = self
                    .names
                    .get(&handle)
                    .cloned()
                    .or_else(|| {
                        hint.filter(|name| !name.is_empty()).map(str::to_string)
                    })
                    .unwrap_or_else(|| FALLBACK_NAME.to_string());
                self.players
                    .insert(handle, RemotePlayer::new(name, target, pose.yaw));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_protocol::{
        JoinCode, PositionSample, SessionId, SessionSnapshot, Visibility,
    };

    fn sample(x: f32, y: f32, z: f32, name: &str) -> PositionSample {
        PositionSample::new(Pose { x, y, z, yaw: 0.3, pitch: 0.0 }, name)
    }

    fn broadcast(n: u64, x: f32) -> ServerMessage {
        ServerMessage::PoseBroadcast {
            connection_handle: ConnectionHandle(n),
            pose: Pose { x, y: 1.8, z: 0.0, yaw: 0.3, pitch: 0.0 },
        }
    }

    #[test]
    fn test_first_pose_places_avatar_directly() {
        let mut roster = RemoteRoster::new();
        roster.apply(&broadcast(2, 4.0));

        let player = roster.get(ConnectionHandle(2)).unwrap();
        assert_eq!(player.current, Vec3::new(4.0, 0.9, 0.0));
        assert_eq!(player.current, player.target);
        assert_eq!(player.display_name, "Player");
    }

    #[test]
    fn test_smooth_moves_fraction_toward_target() {
        let mut roster = RemoteRoster::new();
        roster.apply(&broadcast(2, 0.0));
        roster.apply(&broadcast(2, 10.0));

        roster.smooth();

        let player = roster.get(ConnectionHandle(2)).unwrap();
        assert!((player.current.x - 1.8).abs() < 1e-5);
        assert_eq!(player.target.x, 10.0);
    }

    #[test]
    fn test_own_poses_are_ignored() {
        let mut roster = RemoteRoster::new();
        roster.apply(&ServerMessage::Connected {
            connection_handle: ConnectionHandle(1),
            protocol_version: 1,
        });
        roster.apply(&broadcast(1, 0.0));

        assert!(roster.is_empty());
        assert_eq!(roster.own_handle(), Some(ConnectionHandle(1)));
    }

    #[test]
    fn test_snapshot_uses_sample_names() {
        let mut roster = RemoteRoster::new();
        let mut poses = BTreeMap::new();
        poses.insert(ConnectionHandle(2), sample(0.0, 1.8, 0.0, "Ana"));
        poses.insert(ConnectionHandle(3), sample(5.0, 1.8, 0.0, ""));

        roster.apply(&ServerMessage::PoseSnapshot { poses });

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get(ConnectionHandle(2)).unwrap().display_name, "Ana");
        assert_eq!(
            roster.get(ConnectionHandle(3)).unwrap().display_name,
            "Player"
        );
    }

    #[test]
    fn test_roster_names_win_and_update_avatars() {
        let mut roster = RemoteRoster::new();
        roster.apply(&broadcast(2, 0.0));

        let snapshot = SessionSnapshot {
            id: SessionId::new("s"),
            code: JoinCode::new(123_456).unwrap(),
            host_connection_handle: ConnectionHandle(2),
            visibility: Visibility::Public,
            started: true,
            map: "arabic_city".to_string(),
            roster: vec![PlayerView {
                connection_handle: ConnectionHandle(2),
                display_name: "Bo".to_string(),
                is_host: true,
            }],
            max_members: 16,
            chat: Vec::new(),
        };
        roster.apply(&ServerMessage::RosterUpdated { snapshot });

        assert_eq!(roster.get(ConnectionHandle(2)).unwrap().display_name, "Bo");
    }

    #[test]
    fn test_member_left_removes_avatar() {
        let mut roster = RemoteRoster::new();
        roster.apply(&broadcast(2, 0.0));
        roster.apply(&broadcast(3, 0.0));

        roster.apply(&ServerMessage::MemberLeft {
            connection_handle: ConnectionHandle(2),
        });

        assert!(roster.get(ConnectionHandle(2)).is_none());
        assert_eq!(roster.len(), 1);
    }
}
