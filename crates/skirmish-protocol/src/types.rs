//! Core protocol types for Skirmish's wire format.
//!
//! Everything in this module is serialized onto the wire. Payloads are
//! internally tagged with a snake_case `"type"` field and carry camelCase
//! fields, which is what the browser client reads and writes directly:
//!
//! ```json
//! {"seq":3,"timestamp":120,"channel":"Unreliable",
//!  "payload":{"type":"pose_broadcast","connectionHandle":7,"pose":{...}}}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use skirmish_transport::ConnectionId;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The wire form of a live connection's identity.
///
/// This is the transport's [`ConnectionId`] as a plain JSON number. It
/// changes on every reconnect; the durable token is what survives.
///
/// `Ord` because pose snapshots are keyed by handle in a `BTreeMap`, which
/// keeps the JSON output stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
#[serde(transparent)]
pub struct ConnectionHandle(pub u64);

// Hand-written so a handle also decodes from a string. Map keys arrive as
// strings, and inside an internally tagged payload serde buffers them
// before the integer visitor ever sees them.
impl<'de> Deserialize<'de> for ConnectionHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HandleVisitor;

        impl serde::de::Visitor<'_> for HandleVisitor {
            type Value = ConnectionHandle;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a connection handle as an integer or string")
            }

            fn visit_u64<E: serde::de::Error>(
                self,
                v: u64,
            ) -> Result<Self::Value, E> {
                Ok(ConnectionHandle(v))
            }

            fn visit_i64<E: serde::de::Error>(
                self,
                v: i64,
            ) -> Result<Self::Value, E> {
                u64::try_from(v).map(ConnectionHandle).map_err(|_| {
                    E::invalid_value(serde::de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_str<E: serde::de::Error>(
                self,
                v: &str,
            ) -> Result<Self::Value, E> {
                v.parse().map(ConnectionHandle).map_err(|_| {
                    E::invalid_value(serde::de::Unexpected::Str(v), &self)
                })
            }
        }

        deserializer.deserialize_any(HandleVisitor)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

impl From<ConnectionId> for ConnectionHandle {
    fn from(id: ConnectionId) -> Self {
        Self(id.into_inner())
    }
}

/// Opaque, globally unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A six-digit, human-shareable join code.
///
/// Always in `100000..=999999`, so its decimal form is exactly six ASCII
/// digits with no leading zero. On the wire it is a JSON string (`"482913"`)
/// because that is what players type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(u32);

impl JoinCode {
    /// Smallest valid code.
    pub const MIN: u32 = 100_000;
    /// Largest valid code.
    pub const MAX: u32 = 999_999;

    /// Wraps a numeric code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidJoinCode`] if `value` is outside
    /// `MIN..=MAX`.
    pub fn new(value: u32) -> Result<Self, ProtocolError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ProtocolError::InvalidJoinCode(value.to_string()))
        }
    }

    /// Parses user input into a code.
    ///
    /// Only exactly six ASCII digits are accepted: no sign, no whitespace,
    /// no leading zero.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidJoinCode`] for anything else.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidJoinCode(input.to_string());
        if input.len() != 6 || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u32 = input.parse().map_err(|_| invalid())?;
        Self::new(value).map_err(|_| invalid())
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.to_string()
    }
}

// ---------------------------------------------------------------------------
// Recipient / Channel
// ---------------------------------------------------------------------------

/// Who inside a session should receive a server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every member, including the one whose command caused the message.
    All,
    /// One specific member.
    Connection(ConnectionHandle),
    /// Every member except one. Used by the position relay.
    AllExcept(ConnectionHandle),
}

impl Recipient {
    /// Whether a member with this handle is addressed.
    pub fn includes(&self, handle: ConnectionHandle) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Connection(target) => *target == handle,
            Recipient::AllExcept(excluded) => *excluded != handle,
        }
    }
}

/// The delivery guarantee for a message.
///
/// Pose broadcasts go out `Unreliable`; a lost pose is superseded 50 ms
/// later. Everything else is `ReliableOrdered`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Session data
// ---------------------------------------------------------------------------

/// Whether quick-match may place strangers into a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn from_public(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }
}

/// A position and view orientation. Angles are radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Pose {
    /// False if any component is NaN or infinite, e.g. a JSON number too
    /// large for `f32`. Such a pose cannot be re-encoded as JSON.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.yaw, self.pitch]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// The last pose a member submitted, tagged with their name so late
/// joiners can label the avatar without waiting for a roster update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub display_name: String,
}

impl PositionSample {
    pub fn new(pose: Pose, display_name: impl Into<String>) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            yaw: pose.yaw,
            pitch: pose.pitch,
            display_name: display_name.into(),
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            z: self.z,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// One line of a session's chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// `true` for join/leave notices generated by the server.
    pub is_system: bool,
    /// Display name of the author; `None` for system entries.
    pub sender: Option<String>,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ChatEntry {
    pub fn system(text: impl Into<String>, timestamp: u64) -> Self {
        Self {
            is_system: true,
            sender: None,
            text: text.into(),
            timestamp,
        }
    }

    pub fn player(
        sender: impl Into<String>,
        text: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            is_system: false,
            sender: Some(sender.into()),
            text: text.into(),
            timestamp,
        }
    }
}

/// A roster entry as other clients see it. Never carries the durable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub connection_handle: ConnectionHandle,
    pub display_name: String,
    pub is_host: bool,
}

/// Everything a client needs to render the lobby screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub code: JoinCode,
    pub host_connection_handle: ConnectionHandle,
    pub visibility: Visibility,
    pub started: bool,
    pub map: String,
    /// Members in join order.
    pub roster: Vec<PlayerView>,
    pub max_members: usize,
    /// The most recent chat entries, oldest first.
    pub chat: Vec<ChatEntry>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Client → server commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    CreateSession {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        visibility: Visibility,
        #[serde(default)]
        durable_token: Option<String>,
    },

    /// `code` stays a raw string here: a malformed code is a
    /// "Lobby not found" rejection, not a decode failure.
    JoinByCode {
        code: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        durable_token: Option<String>,
    },

    QuickMatch {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        durable_token: Option<String>,
    },

    SetVisibility {
        is_public: bool,
    },

    StartSession,

    PostChat {
        text: String,
    },

    SubmitPose(Pose),

    LeaveSession,

    Rejoin {
        code: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        durable_token: Option<String>,
    },

    RequestAllPoses,

    /// Keeps an idle connection alive. `client_time` is echoed back.
    Heartbeat {
        #[serde(default)]
        client_time: u64,
    },
}

impl ClientMessage {
    /// Short name of the command, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateSession { .. } => "create_session",
            ClientMessage::JoinByCode { .. } => "join_by_code",
            ClientMessage::QuickMatch { .. } => "quick_match",
            ClientMessage::SetVisibility { .. } => "set_visibility",
            ClientMessage::StartSession => "start_session",
            ClientMessage::PostChat { .. } => "post_chat",
            ClientMessage::SubmitPose(_) => "submit_pose",
            ClientMessage::LeaveSession => "leave_session",
            ClientMessage::Rejoin { .. } => "rejoin",
            ClientMessage::RequestAllPoses => "request_all_poses",
            ClientMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// First message on every connection.
    Connected {
        connection_handle: ConnectionHandle,
        protocol_version: u32,
    },

    SessionCreated {
        session_id: SessionId,
        code: JoinCode,
        snapshot: SessionSnapshot,
    },

    SessionJoined {
        session_id: SessionId,
        code: JoinCode,
        snapshot: SessionSnapshot,
    },

    JoinRejected {
        reason: String,
    },

    /// A start, visibility, or chat command was refused.
    CommandRejected {
        reason: String,
    },

    RosterUpdated {
        snapshot: SessionSnapshot,
    },

    ChatPosted {
        entry: ChatEntry,
    },

    MatchStarted {
        map: String,
        roster: Vec<PlayerView>,
        session_id: SessionId,
        code: JoinCode,
    },

    PoseBroadcast {
        connection_handle: ConnectionHandle,
        pose: Pose,
    },

    MemberLeft {
        connection_handle: ConnectionHandle,
    },

    ResendPoseRequest,

    PoseSnapshot {
        poses: BTreeMap<ConnectionHandle, PositionSample>,
    },

    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
}

impl ServerMessage {
    /// The channel this message should be delivered on.
    pub fn channel(&self) -> Channel {
        match self {
            ServerMessage::PoseBroadcast { .. } => Channel::Unreliable,
            _ => Channel::ReliableOrdered,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The outer wrapper around every message on the wire.
///
/// Inbound, only `payload` is required; browsers rarely bother with the
/// rest. Outbound, the server stamps a per-connection `seq` and its own
/// clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub channel: Channel,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload for the default reliable channel.
    pub fn reliable(seq: u64, timestamp: u64, payload: T) -> Self {
        Self {
            seq,
            timestamp,
            channel: Channel::ReliableOrdered,
            payload,
        }
    }
}

impl Envelope<ServerMessage> {
    /// Wraps a server message on the channel it asks for.
    pub fn outbound(seq: u64, timestamp: u64, payload: ServerMessage) -> Self {
        Self {
            seq,
            timestamp,
            channel: payload.channel(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
