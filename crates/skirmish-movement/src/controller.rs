//! Local player: gravity, probe-based collision, jumping and mouse look.

use std::f32::consts::FRAC_PI_2;

use glam::Vec3;
use skirmish_protocol::Pose;

use crate::world::{Aabb, CollisionWorld};

/// Tuning for [`LocalPlayer::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct MovementConfig {
    /// Horizontal speed in units per second.
    pub walk_speed: f32,
    /// Vertical acceleration (negative is down).
    pub gravity: f32,
    /// Vertical velocity set by a jump.
    pub jump_impulse: f32,
    /// Eye height above the surface the player stands on.
    pub eye_height: f32,
    /// Length of the forward wall probe.
    pub wall_probe: f32,
    /// Extra length of the ground probe beyond `eye_height`.
    pub ground_slack: f32,
    /// Frame delta cap, in seconds.
    pub max_frame_delta: f32,
    /// Column radius for collision candidates.
    pub render_distance: i32,
    /// Squared distance cutoff for collision candidates.
    pub collision_radius_sq: f32,
    /// Below this eye height the player respawns.
    pub kill_height: f32,
    /// Height the respawn probe starts from.
    pub respawn_probe_height: f32,
    /// Radians of turn per unit of mouse movement.
    pub look_sensitivity: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 9.0,
            gravity: -22.0,
            jump_impulse: 9.0,
            eye_height: 1.8,
            wall_probe: 0.55,
            ground_slack: 0.3,
            max_frame_delta: 0.05,
            render_distance: 3,
            collision_radius_sq: 400.0,
            kill_height: -80.0,
            respawn_probe_height: 200.0,
            look_sensitivity: 0.002,
        }
    }
}

/// Keys held during a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

impl MoveInput {
    /// Unit horizontal direction for these keys at `yaw`, or zero.
    pub fn direction(&self, yaw: f32) -> Vec3 {
        let (sin, cos) = yaw.sin_cos();
        let forward = Vec3::new(-sin, 0.0, -cos);
        let right = Vec3::new(cos, 0.0, -sin);

        let mut dir = Vec3::ZERO;
        if self.forward {
            dir += forward;
        }
        if self.back {
            dir -= forward;
        }
        if self.right {
            dir += right;
        }
        if self.left {
            dir -= right;
        }
        dir.normalize_or_zero()
    }
}

/// The player this client controls. `position` is the eye.
#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub position: Vec3,
    pub velocity_y: f32,
    pub yaw: f32,
    pub pitch: f32,
    /// Set on landing, cleared by a jump.
    pub grounded: bool,
    config: MovementConfig,
}

impl LocalPlayer {
    /// A player at the world's spawn point.
    pub fn spawn(world: &CollisionWorld, config: MovementConfig) -> Self {
        let position =
            world.spawn_point(config.respawn_probe_height, config.eye_height);
        Self {
            position,
            velocity_y: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            grounded: true,
            config,
        }
    }

    pub fn at(position: Vec3, config: MovementConfig) -> Self {
        Self {
            position,
            velocity_y: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            grounded: false,
            config,
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Advances one frame of `dt` seconds.
    ///
    /// Order: jump, gravity, horizontal move (all-or-nothing against the
    /// wall probe), vertical move, ground snap, respawn below the kill
    /// height.
    pub fn step(&mut self, world: &CollisionWorld, input: MoveInput, dt: f32) {
        let cfg = &self.config;
        let dt = dt.clamp(0.0, cfg.max_frame_delta);

        if input.jump && self.grounded {
            self.velocity_y = cfg.jump_impulse;
            self.grounded = false;
        }

        self.velocity_y += cfg.gravity * dt;

        let candidates: Vec<&Aabb> = world.nearby(
            self.position,
            cfg.render_distance,
            cfg.collision_radius_sq,
        );

        let dir = input.direction(self.yaw);
        if dir != Vec3::ZERO
            && CollisionWorld::cast(&candidates, self.position, dir, cfg.wall_probe)
                .is_none()
        {
            self.position += dir * cfg.walk_speed * dt;
        }

        self.position.y += self.velocity_y * dt;

        let probe = self.position - Vec3::Y * 0.1;
        let reach = cfg.eye_height + cfg.ground_slack;
        if let Some(d) =
            CollisionWorld::cast(&candidates, probe, Vec3::NEG_Y, reach)
        {
            if self.velocity_y <= 0.0 {
                self.position.y = probe.y - d + cfg.eye_height;
                self.velocity_y = 0.0;
                self.grounded = true;
            }
        }

        if self.position.y < cfg.kill_height {
            self.respawn(world);
        }
    }

    /// Applies a mouse delta. Pitch stays just short of straight up/down.
    pub fn look(&mut self, dx: f32, dy: f32) {
        let limit = FRAC_PI_2 - 0.01;
        self.yaw -= dx * self.config.look_sensitivity;
        self.pitch = (self.pitch - dy * self.config.look_sensitivity)
            .clamp(-limit, limit);
    }

    pub fn respawn(&mut self, world: &CollisionWorld) {
        self.position = world.spawn_point(
            self.config.respawn_probe_height,
            self.config.eye_height,
        );
        self.velocity_y = 0.0;
        self.grounded = true;
    }

    /// The pose to submit to the server.
    pub fn pose(&self) -> Pose {
        Pose {
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}
