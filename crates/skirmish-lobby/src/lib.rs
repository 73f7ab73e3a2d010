//! Session lifecycle and position relay for Skirmish.
//!
//! Each session runs as an isolated Tokio task (actor model) owning its
//! roster, chat log, and pose cache. The [`LifecycleManager`] sits in
//! front of them and owns the [`SessionStore`], which indexes sessions by
//! id and join code and tracks which connection is in which session.
//!
//! # Key types
//!
//! - [`LifecycleManager`]: create/join/quick-match/leave/rejoin entry point
//! - [`SessionStore`]: id and code indexes plus the identity registry
//! - [`SessionHandle`]: send commands to a running session actor
//! - [`SessionPhase`]: `Lobby` → `Running`
//! - [`LobbyConfig`]: capacities, limits, and defaults

mod chat;
mod config;
mod error;
mod manager;
mod reconnect;
mod relay;
mod session;
mod store;

pub use chat::{ChatLog, now_millis};
pub use config::{LobbyConfig, SessionPhase};
pub use error::LobbyError;
pub use manager::LifecycleManager;
pub use reconnect::RejoinRequest;
pub use relay::PoseCache;
pub use session::{
    JoinMode, LeaveOutcome, MemberSender, SessionHandle, SessionInfo,
};
pub use store::SessionStore;
