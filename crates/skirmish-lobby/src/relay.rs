//! Last-known pose per member, for syncing late joiners and rejoiners.
//!
//! The fan-out itself happens in the session actor; this cache only
//! remembers what was fanned out. Entries are overwritten, never
//! historized.

use std::collections::{BTreeMap, HashMap};

use skirmish_protocol::{ConnectionHandle, Pose, PositionSample};

#[derive(Debug, Clone, Default)]
pub struct PoseCache {
    poses: HashMap<ConnectionHandle, PositionSample>,
}

impl PoseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the member's last pose.
    pub fn record(
        &mut self,
        connection: ConnectionHandle,
        pose: Pose,
        display_name: &str,
    ) {
        self.poses
            .insert(connection, PositionSample::new(pose, display_name));
    }

    /// Every cached pose except `excluding`'s.
    pub fn snapshot(
        &self,
        excluding: Option<ConnectionHandle>,
    ) -> BTreeMap<ConnectionHandle, PositionSample> {
        self.poses
            .iter()
            .filter(|(handle, _)| Some(**handle) != excluding)
            .map(|(handle, sample)| (*handle, sample.clone()))
            .collect()
    }

    pub fn forget(&mut self, connection: ConnectionHandle) {
        self.poses.remove(&connection);
    }

    pub fn get(&self, connection: ConnectionHandle) -> Option<&PositionSample> {
        self.poses.get(&connection)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
