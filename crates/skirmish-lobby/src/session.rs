//! Session actor: an isolated Tokio task that owns one lobby/match.
//!
//! Everything that mutates a session (roster, chat, pose cache, phase)
//! happens inside its actor, one command at a time. The outside world
//! talks to it through a [`SessionHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use skirmish_identity::{IdentityError, Player, Resolution, Roster};
use skirmish_protocol::{
    ConnectionHandle, JoinCode, Pose, Recipient, ServerMessage, SessionId,
    SessionSnapshot, Visibility,
};
use tokio::sync::{mpsc, oneshot};

use crate::{ChatLog, LobbyConfig, LobbyError, PoseCache, SessionPhase};

/// Channel sender for delivering outbound messages to one connection.
///
/// Unbounded so an actor never waits on a slow client; the connection's
/// writer task drains it.
pub type MemberSender = mpsc::UnboundedSender<ServerMessage>;

/// How a member is being added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Join-by-code. Refused once the match is running.
    ByCode,
    /// Quick-match. May enter a running match, and starts a waiting one.
    QuickMatch,
}

/// What a leave did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The member left and others remain.
    Left { promoted: Option<ConnectionHandle> },
    /// The last member left. The actor has stopped.
    Emptied,
    /// The connection was not on the roster.
    NotMember,
}

/// A snapshot of session metadata (not the roster itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub code: JoinCode,
    pub phase: SessionPhase,
    pub visibility: Visibility,
    pub member_count: usize,
    pub max_members: usize,
}

impl SessionInfo {
    /// Public with a free slot, in either phase.
    pub fn is_joinable_public(&self) -> bool {
        self.visibility.is_public() && self.member_count < self.max_members
    }

    /// Whether a new member could join this way right now.
    ///
    /// # Errors
    /// [`LobbyError::AlreadyStarted`] for a by-code join into a running
    /// match, then [`LobbyError::LobbyFull`].
    pub fn admits(&self, mode: JoinMode) -> Result<(), LobbyError> {
        if mode == JoinMode::ByCode && self.phase.is_running() {
            return Err(LobbyError::AlreadyStarted);
        }
        if self.member_count >= self.max_members {
            return Err(LobbyError::LobbyFull);
        }
        Ok(())
    }
}

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    Join {
        player: Player,
        sender: MemberSender,
        mode: JoinMode,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    Leave {
        connection: ConnectionHandle,
        reply: oneshot::Sender<LeaveOutcome>,
    },

    Start {
        connection: ConnectionHandle,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    SetVisibility {
        connection: ConnectionHandle,
        visibility: Visibility,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    Chat {
        connection: ConnectionHandle,
        text: String,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// Fire-and-forget; poses are superseded every 50 ms anyway.
    SubmitPose {
        connection: ConnectionHandle,
        pose: Pose,
    },

    RequestPoses {
        connection: ConnectionHandle,
    },

    Rejoin {
        connection: ConnectionHandle,
        display_name: String,
        durable_token: Option<String>,
        sender: MemberSender,
        reply: oneshot::Sender<Result<Resolution, LobbyError>>,
    },

    GetInfo {
        reply: oneshot::Sender<SessionInfo>,
    },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone: an `mpsc::Sender` plus the session's two keys.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    code: JoinCode,
    sender: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Start { .. } => "Start",
            Self::SetVisibility { .. } => "SetVisibility",
            Self::Chat { .. } => "Chat",
            Self::SubmitPose { .. } => "SubmitPose",
            Self::RequestPoses { .. } => "RequestPoses",
            Self::Rejoin { .. } => "Rejoin",
            Self::GetInfo { .. } => "GetInfo",
            Self::Snapshot { .. } => "Snapshot",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn code(&self) -> JoinCode {
        self.code
    }

    /// Adds a member. The joiner gets `session_joined`; everyone gets the
    /// join notice and a roster update.
    pub async fn join(
        &self,
        player: Player,
        sender: MemberSender,
        mode: JoinMode,
    ) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::Join {
            player,
            sender,
            mode,
            reply,
        })
        .await?
    }

    /// Removes a member.
    pub async fn leave(
        &self,
        connection: ConnectionHandle,
    ) -> Result<LeaveOutcome, LobbyError> {
        self.request(|reply| SessionCommand::Leave { connection, reply })
            .await
    }

    /// Host-only: moves the session from `Lobby` to `Running`.
    pub async fn start(
        &self,
        connection: ConnectionHandle,
    ) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::Start { connection, reply })
            .await?
    }

    /// Host-only: changes whether quick-match may place players here.
    pub async fn set_visibility(
        &self,
        connection: ConnectionHandle,
        visibility: Visibility,
    ) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::SetVisibility {
            connection,
            visibility,
            reply,
        })
        .await?
    }

    pub async fn chat(
        &self,
        connection: ConnectionHandle,
        text: String,
    ) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::Chat {
            connection,
            text,
            reply,
        })
        .await?
    }

    /// Relays a pose without waiting. A full command queue drops the pose.
    pub fn submit_pose(
        &self,
        connection: ConnectionHandle,
        pose: Pose,
    ) -> Result<(), LobbyError> {
        match self
            .sender
            .try_send(SessionCommand::SubmitPose { connection, pose })
        {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(
                    session_id = %self.id,
                    %connection,
                    "session queue full, dropping pose"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(LobbyError::Unavailable(self.id.clone()))
            }
        }
    }

    /// Sends the requester every cached pose and asks everyone else to
    /// resend theirs.
    pub async fn request_poses(
        &self,
        connection: ConnectionHandle,
    ) -> Result<(), LobbyError> {
        self.sender
            .send(SessionCommand::RequestPoses { connection })
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))
    }

    /// Places a returning connection onto the roster.
    pub async fn rejoin(
        &self,
        connection: ConnectionHandle,
        display_name: String,
        durable_token: Option<String>,
        sender: MemberSender,
    ) -> Result<Resolution, LobbyError> {
        self.request(|reply| SessionCommand::Rejoin {
            connection,
            display_name,
            durable_token,
            sender,
            reply,
        })
        .await?
    }

    pub async fn info(&self) -> Result<SessionInfo, LobbyError> {
        self.request(|reply| SessionCommand::GetInfo { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, LobbyError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Tells the actor to stop without notifying members.
    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))
    }

    /// Sends a command carrying a reply channel and waits for the answer.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.id.clone()))
    }
}

/// The internal session state. Runs inside a Tokio task.
struct SessionActor {
    id: SessionId,
    code: JoinCode,
    phase: SessionPhase,
    visibility: Visibility,
    config: Arc<LobbyConfig>,
    roster: Roster,
    /// Per-member outbound channels.
    senders: HashMap<ConnectionHandle, MemberSender>,
    chat: ChatLog,
    poses: PoseCache,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Runs the actor loop until shutdown or the roster empties.
    async fn run(mut self) {
        tracing::debug!(session_id = %self.id, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Join {
                    player,
                    sender,
                    mode,
                    reply,
                } => {
                    let result = self.handle_join(player, sender, mode);
                    let _ = reply.send(result);
                }
                SessionCommand::Leave { connection, reply } => {
                    let outcome = self.handle_leave(connection);
                    let _ = reply.send(outcome);
                    if outcome == LeaveOutcome::Emptied {
                        break;
                    }
                }
                SessionCommand::Start { connection, reply } => {
                    let _ = reply.send(self.handle_start(connection));
                }
                SessionCommand::SetVisibility {
                    connection,
                    visibility,
                    reply,
                } => {
                    let result =
                        self.handle_set_visibility(connection, visibility);
                    let _ = reply.send(result);
                }
                SessionCommand::Chat {
                    connection,
                    text,
                    reply,
                } => {
                    let _ = reply.send(self.handle_chat(connection, &text));
                }
                SessionCommand::SubmitPose { connection, pose } => {
                    self.handle_pose(connection, pose);
                }
                SessionCommand::RequestPoses { connection } => {
                    self.handle_request_poses(connection);
                }
                SessionCommand::Rejoin {
                    connection,
                    display_name,
                    durable_token,
                    sender,
                    reply,
                } => {
                    let result = self.handle_rejoin(
                        connection,
                        &display_name,
                        durable_token.as_deref(),
                        sender,
                    );
                    let _ = reply.send(result);
                }
                SessionCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                SessionCommand::Shutdown => {
                    tracing::debug!(session_id = %self.id, "session shutting down");
                    break;
                }
            }
        }

        tracing::debug!(session_id = %self.id, "session actor stopped");
    }

    fn handle_join(
        &mut self,
        player: Player,
        sender: MemberSender,
        mode: JoinMode,
    ) -> Result<(), LobbyError> {
        self.info().admits(mode)?;

        let connection = player.connection;
        let name = player.display_name.clone();
        self.roster.push_member(player);
        self.senders.insert(connection, sender);
        tracing::info!(
            session_id = %self.id,
            %connection,
            members = self.roster.len(),
            "member joined"
        );

        let entry = self.chat.push_system(format!("{name} joined the lobby"));
        self.dispatch(Recipient::All, ServerMessage::ChatPosted { entry });
        self.dispatch(
            Recipient::All,
            ServerMessage::RosterUpdated {
                snapshot: self.snapshot(),
            },
        );
        self.send_to(
            connection,
            ServerMessage::SessionJoined {
                session_id: self.id.clone(),
                code: self.code,
                snapshot: self.snapshot(),
            },
        );

        if mode == JoinMode::QuickMatch {
            if self.phase.is_running() {
                // Late joiner: catch up alone.
                self.send_to(connection, self.match_started());
                self.send_to(
                    connection,
                    ServerMessage::PoseSnapshot {
                        poses: self.poses.snapshot(Some(connection)),
                    },
                );
            } else {
                self.begin_match();
            }
        }

        Ok(())
    }

    fn handle_leave(&mut self, connection: ConnectionHandle) -> LeaveOutcome {
        let Some(departure) = self.roster.remove(connection) else {
            return LeaveOutcome::NotMember;
        };
        self.senders.remove(&connection);
        self.poses.forget(connection);

        tracing::info!(
            session_id = %self.id,
            %connection,
            members = self.roster.len(),
            "member left"
        );

        if self.roster.is_empty() {
            return LeaveOutcome::Emptied;
        }

        if let Some(host) = departure.promoted {
            tracing::info!(session_id = %self.id, %host, "host promoted");
        }

        let entry = self.chat.push_system(format!(
            "{} left the lobby",
            departure.player.display_name
        ));
        self.dispatch(Recipient::All, ServerMessage::ChatPosted { entry });
        self.dispatch(
            Recipient::All,
            ServerMessage::RosterUpdated {
                snapshot: self.snapshot(),
            },
        );
        self.dispatch(
            Recipient::All,
            ServerMessage::MemberLeft {
                connection_handle: connection,
            },
        );

        LeaveOutcome::Left {
            promoted: departure.promoted,
        }
    }

    fn handle_start(
        &mut self,
        connection: ConnectionHandle,
    ) -> Result<(), LobbyError> {
        self.require_host(connection)?;
        if self.phase.is_running() {
            return Err(LobbyError::AlreadyStarted);
        }
        self.begin_match();
        Ok(())
    }

    fn handle_set_visibility(
        &mut self,
        connection: ConnectionHandle,
        visibility: Visibility,
    ) -> Result<(), LobbyError> {
        self.require_host(connection)?;
        self.visibility = visibility;
        tracing::debug!(session_id = %self.id, ?visibility, "visibility changed");
        self.dispatch(
            Recipient::All,
            ServerMessage::RosterUpdated {
                snapshot: self.snapshot(),
            },
        );
        Ok(())
    }

    fn handle_chat(
        &mut self,
        connection: ConnectionHandle,
        text: &str,
    ) -> Result<(), LobbyError> {
        let sender = self
            .roster
            .get(connection)
            .map(|p| p.display_name.clone())
            .ok_or(LobbyError::NotInSession)?;
        let entry = self.chat.push_player(&sender, text);
        self.dispatch(Recipient::All, ServerMessage::ChatPosted { entry });
        Ok(())
    }

    fn handle_pose(&mut self, connection: ConnectionHandle, pose: Pose) {
        let Some(player) = self.roster.get(connection) else {
            tracing::debug!(
                session_id = %self.id,
                %connection,
                "pose from non-member, ignoring"
            );
            return;
        };
        self.poses.record(connection, pose, &player.display_name);
        self.dispatch(
            Recipient::AllExcept(connection),
            ServerMessage::PoseBroadcast {
                connection_handle: connection,
                pose,
            },
        );
    }

    fn handle_request_poses(&mut self, connection: ConnectionHandle) {
        if !self.roster.contains(connection) {
            return;
        }
        self.resync(connection);
    }

    fn handle_rejoin(
        &mut self,
        connection: ConnectionHandle,
        display_name: &str,
        durable_token: Option<&str>,
        sender: MemberSender,
    ) -> Result<Resolution, LobbyError> {
        if self.roster.contains(connection) {
            // Already seated on this connection: just resync.
            self.senders.insert(connection, sender);
            self.resync(connection);
            return Ok(Resolution::Rebound {
                previous: connection,
            });
        }

        let resolution = self
            .roster
            .resolve_or_create(
                connection,
                durable_token,
                display_name,
                self.config.max_members,
            )
            .map_err(|e| match e {
                IdentityError::RosterFull(_) => LobbyError::LobbyFull,
                _ => LobbyError::NotInSession,
            })?;

        if let Resolution::Rebound { previous } = resolution {
            if previous != connection {
                self.senders.remove(&previous);
                self.poses.forget(previous);
            }
            tracing::info!(
                session_id = %self.id,
                %previous,
                %connection,
                "member rebound"
            );
        } else {
            tracing::info!(
                session_id = %self.id,
                %connection,
                members = self.roster.len(),
                "rejoin added member"
            );
        }
        self.senders.insert(connection, sender);

        self.resync(connection);
        self.dispatch(
            Recipient::All,
            ServerMessage::RosterUpdated {
                snapshot: self.snapshot(),
            },
        );
        Ok(resolution)
    }

    /// Pose snapshot to `connection`, resend requests to everyone else.
    fn resync(&self, connection: ConnectionHandle) {
        self.send_to(
            connection,
            ServerMessage::PoseSnapshot {
                poses: self.poses.snapshot(Some(connection)),
            },
        );
        self.dispatch(
            Recipient::AllExcept(connection),
            ServerMessage::ResendPoseRequest,
        );
    }

    fn require_host(
        &self,
        connection: ConnectionHandle,
    ) -> Result<(), LobbyError> {
        match self.roster.get(connection) {
            None => Err(LobbyError::NotInSession),
            Some(p) if !p.is_host => Err(LobbyError::NotHost),
            Some(_) => Ok(()),
        }
    }

    fn begin_match(&mut self) {
        self.phase = SessionPhase::Running;
        tracing::info!(
            session_id = %self.id,
            members = self.roster.len(),
            map = %self.config.map,
            "match started"
        );
        self.dispatch(Recipient::All, self.match_started());
    }

    fn match_started(&self) -> ServerMessage {
        ServerMessage::MatchStarted {
            map: self.config.map.clone(),
            roster: self.roster.views(),
            session_id: self.id.clone(),
            code: self.code,
        }
    }

    /// Delivers a message to every addressed member, in join order.
    fn dispatch(&self, recipient: Recipient, msg: ServerMessage) {
        for player in self.roster.iter() {
            if recipient.includes(player.connection) {
                self.send_to(player.connection, msg.clone());
            }
        }
    }

    /// Sends to a single member. Drops the message if their writer is
    /// gone; the connection's own leave will follow.
    fn send_to(&self, connection: ConnectionHandle, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection) {
            if sender.send(msg).is_err() {
                tracing::debug!(
                    session_id = %self.id,
                    %connection,
                    "member channel closed, dropping message"
                );
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            code: self.code,
            host_connection_handle: self
                .roster
                .host()
                .map(|p| p.connection)
                .unwrap_or(ConnectionHandle(0)),
            visibility: self.visibility,
            started: self.phase.is_running(),
            map: self.config.map.clone(),
            roster: self.roster.views(),
            max_members: self.config.max_members,
            chat: self.chat.tail(self.config.snapshot_chat_tail),
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            code: self.code,
            phase: self.phase,
            visibility: self.visibility,
            member_count: self.roster.len(),
            max_members: self.config.max_members,
        }
    }
}

/// Spawns a session actor with `host` as its only member and returns a
/// handle to it. The host receives `session_created` before this returns.
pub(crate) fn spawn_session(
    id: SessionId,
    code: JoinCode,
    host: Player,
    host_sender: MemberSender,
    visibility: Visibility,
    config: Arc<LobbyConfig>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let host_connection = host.connection;

    let mut senders = HashMap::new();
    senders.insert(host_connection, host_sender);

    let actor = SessionActor {
        id: id.clone(),
        code,
        phase: SessionPhase::Lobby,
        visibility,
        chat: ChatLog::new(config.chat_capacity, config.chat_text_limit),
        poses: PoseCache::new(),
        roster: Roster::with_host(host),
        senders,
        config,
        receiver: rx,
    };

    actor.send_to(
        host_connection,
        ServerMessage::SessionCreated {
            session_id: id.clone(),
            code,
            snapshot: actor.snapshot(),
        },
    );

    tokio::spawn(actor.run());

    SessionHandle {
        id,
        code,
        sender: tx,
    }
}
