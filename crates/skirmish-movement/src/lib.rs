//! Client-side movement for Skirmish.
//!
//! Headless, renderer-agnostic pieces a native or wasm client needs to
//! take part in a match:
//!
//! - [`CollisionWorld`]: static boxes bucketed into square columns, with
//!   ray probes
//! - [`LocalPlayer`]: gravity, wall/ground probes, jumping, mouse look
//! - [`RemoteRoster`]: other members' avatars, fed by relay events and
//!   smoothed toward their last pose
//! - [`SendCadence`]: fixed-interval pose submission
//!
//! Nothing here talks to the network. The client feeds decoded
//! [`ServerMessage`](skirmish_protocol::ServerMessage)s in and pulls
//! [`Pose`](skirmish_protocol::Pose)s out.

mod cadence;
mod controller;
mod remote;
mod world;

pub use cadence::SendCadence;
pub use controller::{LocalPlayer, MoveInput, MovementConfig};
pub use remote::{RemotePlayer, RemoteRoster};
pub use world::{Aabb, CollisionWorld};
