//! Lifecycle manager: the entry point for every lobby command.
//!
//! The server keeps one `LifecycleManager` behind a `tokio::sync::Mutex`.
//! Holding that lock while a command runs is what makes index updates on
//! create/destroy atomic with respect to every other command. Session
//! actors never do I/O, so the awaits under the lock are short.

use std::sync::Arc;

use skirmish_identity::{Player, Resolution};
use skirmish_protocol::{
    ConnectionHandle, JoinCode, Pose, SessionId, Visibility,
};

use crate::reconnect::{self, RejoinRequest};
use crate::{
    JoinMode, LeaveOutcome, LobbyConfig, LobbyError, MemberSender,
    SessionHandle, SessionStore,
};

/// Creates and destroys sessions and routes connections to them.
pub struct LifecycleManager {
    store: SessionStore,
    config: Arc<LobbyConfig>,
}

impl LifecycleManager {
    pub fn new(config: LobbyConfig) -> Self {
        let config = Arc::new(config);
        Self {
            store: SessionStore::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Creates a session with the caller as host.
    ///
    /// The caller receives `session_created`. A connection already in a
    /// session leaves it first.
    pub async fn create_session(
        &mut self,
        connection: ConnectionHandle,
        display_name: Option<&str>,
        visibility: Visibility,
        durable_token: Option<String>,
        sender: MemberSender,
    ) -> SessionId {
        self.leave(connection).await;
        let player = self.player(connection, display_name, durable_token);
        let handle = self.store.create(player, sender, visibility);
        handle.id().clone()
    }

    /// Joins the session with this code as a regular member.
    ///
    /// The target is checked before the caller leaves any session it is
    /// in, so a refused join keeps the caller where it was. Joining the
    /// session the caller is already in is a no-op.
    ///
    /// # Errors
    /// In order of checking: [`LobbyError::LobbyNotFound`] (also for a
    /// malformed code), [`LobbyError::AlreadyStarted`],
    /// [`LobbyError::LobbyFull`].
    pub async fn join_by_code(
        &mut self,
        connection: ConnectionHandle,
        code: &str,
        display_name: Option<&str>,
        durable_token: Option<String>,
        sender: MemberSender,
    ) -> Result<SessionId, LobbyError> {
        let handle = self.resolve_code(code).ok_or(LobbyError::LobbyNotFound)?;
        if self.session_of(connection).as_ref() == Some(handle.id()) {
            return Ok(handle.id().clone());
        }
        handle.info().await?.admits(JoinMode::ByCode)?;

        self.leave(connection).await;
        let player = self.player(connection, display_name, durable_token);
        handle.join(player, sender, JoinMode::ByCode).await?;
        self.bind(connection, handle.id());
        Ok(handle.id().clone())
    }

    /// Places the caller in any other public session with room, starting
    /// it if it was still in the lobby. Without a candidate, creates a
    /// public session and starts it immediately.
    ///
    /// # Errors
    /// Only [`LobbyError::Unavailable`] if a freshly created session's
    /// actor vanished.
    pub async fn quick_match(
        &mut self,
        connection: ConnectionHandle,
        display_name: Option<&str>,
        durable_token: Option<String>,
        sender: MemberSender,
    ) -> Result<SessionId, LobbyError> {
        let current = self.session_of(connection);
        let candidate = self.store.find_joinable_public(current.as_ref()).await;
        self.leave(connection).await;

        if let Some(handle) = candidate {
            let player =
                self.player(connection, display_name, durable_token.clone());
            match handle.join(player, sender.clone(), JoinMode::QuickMatch).await
            {
                Ok(()) => {
                    self.bind(connection, handle.id());
                    return Ok(handle.id().clone());
                }
                Err(e) => {
                    tracing::debug!(
                        session_id = %handle.id(),
                        error = %e,
                        "quick-match candidate refused, creating a session"
                    );
                }
            }
        }

        let player = self.player(connection, display_name, durable_token);
        let handle = self.store.create(player, sender, Visibility::Public);
        handle.start(connection).await?;
        Ok(handle.id().clone())
    }

    /// Host-only: starts the match.
    ///
    /// # Errors
    /// [`LobbyError::NotInSession`], [`LobbyError::NotHost`], or
    /// [`LobbyError::AlreadyStarted`].
    pub async fn explicit_start(
        &mut self,
        connection: ConnectionHandle,
    ) -> Result<(), LobbyError> {
        self.handle_of(connection)?.start(connection).await
    }

    /// Host-only: makes the session public or private.
    ///
    /// # Errors
    /// [`LobbyError::NotInSession`] or [`LobbyError::NotHost`].
    pub async fn set_visibility(
        &mut self,
        connection: ConnectionHandle,
        is_public: bool,
    ) -> Result<(), LobbyError> {
        self.handle_of(connection)?
            .set_visibility(connection, Visibility::from_public(is_public))
            .await
    }

    /// Posts a chat message to the caller's session.
    ///
    /// # Errors
    /// [`LobbyError::NotInSession`].
    pub async fn post_chat(
        &mut self,
        connection: ConnectionHandle,
        text: String,
    ) -> Result<(), LobbyError> {
        self.handle_of(connection)?.chat(connection, text).await
    }

    /// Removes the caller from their session, destroying it if they were
    /// the last member. A connection in no session is a no-op.
    pub async fn leave(
        &mut self,
        connection: ConnectionHandle,
    ) -> Option<LeaveOutcome> {
        let id = self.store.registry_mut().unbind(connection)?;
        let handle = self.store.find_by_id(&id).cloned()?;

        match handle.leave(connection).await {
            Ok(LeaveOutcome::Emptied) => {
                self.store.remove(&id);
                Some(LeaveOutcome::Emptied)
            }
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "session unavailable on leave, removing");
                self.store.remove(&id);
                None
            }
        }
    }

    /// Relays a pose. Ignored for a connection in no session.
    pub fn submit_pose(&self, connection: ConnectionHandle, pose: Pose) {
        let Ok(handle) = self.handle_of(connection) else {
            return;
        };
        if let Err(e) = handle.submit_pose(connection, pose) {
            tracing::debug!(%connection, error = %e, "pose dropped");
        }
    }

    /// Sends the caller every cached pose and asks the other members to
    /// resend theirs. Ignored for a connection in no session.
    pub async fn request_all_poses(&self, connection: ConnectionHandle) {
        let Ok(handle) = self.handle_of(connection) else {
            return;
        };
        if let Err(e) = handle.request_poses(connection).await {
            tracing::debug!(%connection, error = %e, "pose resync dropped");
        }
    }

    /// Rebinds the caller into the session with this code, reclaiming a
    /// roster slot by durable token (or, for token-less members, by name).
    ///
    /// Never fails from the caller's point of view; `None` means the
    /// rejoin was dropped.
    pub async fn rejoin(
        &mut self,
        connection: ConnectionHandle,
        code: &str,
        display_name: Option<&str>,
        durable_token: Option<String>,
        sender: MemberSender,
    ) -> Option<Resolution> {
        let target = self.resolve_code(code).map(|h| h.id().clone());
        let current = self.session_of(connection);
        if target.is_some() && current.is_some() && current != target {
            self.leave(connection).await;
        }

        let request = RejoinRequest {
            code: code.to_string(),
            display_name: self.config.display_name(display_name),
            durable_token,
        };
        reconnect::rejoin(&mut self.store, connection, request, sender).await
    }

    /// The session this connection is in, if any.
    pub fn session_of(&self, connection: ConnectionHandle) -> Option<SessionId> {
        self.store.registry().session_of(connection).cloned()
    }

    /// Looks a session up by id or join code.
    pub fn find(&self, id_or_code: &str) -> Option<SessionHandle> {
        self.store.find(id_or_code).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Stops every session actor and clears the store.
    pub async fn shutdown(&mut self) {
        for id in self.store.session_ids() {
            if let Some(handle) = self.store.remove(&id) {
                let _ = handle.shutdown().await;
            }
        }
    }

    fn resolve_code(&self, code: &str) -> Option<SessionHandle> {
        JoinCode::parse(code)
            .ok()
            .and_then(|code| self.store.find_by_code(code))
            .cloned()
    }

    fn handle_of(
        &self,
        connection: ConnectionHandle,
    ) -> Result<SessionHandle, LobbyError> {
        let id = self
            .store
            .registry()
            .session_of(connection)
            .ok_or(LobbyError::NotInSession)?;
        self.store
            .find_by_id(id)
            .cloned()
            .ok_or(LobbyError::NotInSession)
    }

    fn player(
        &self,
        connection: ConnectionHandle,
        display_name: Option<&str>,
        durable_token: Option<String>,
    ) -> Player {
        Player::new(
            connection,
            self.config.display_name(display_name),
            durable_token,
        )
    }

    fn bind(&mut self, connection: ConnectionHandle, id: &SessionId) {
        if let Err(e) = self.store.registry_mut().bind(connection, id.clone()) {
            tracing::warn!(%connection, error = %e, "registry bind failed");
        }
    }
}
