//! Reconnection: moving a returning player onto their old roster slot.
//!
//! A browser that lost its socket reconnects with a new connection handle
//! and presents the session's join code plus the durable token it kept.
//! Nothing here ever reports failure to the client; a rejoin that cannot
//! be honoured is logged and dropped.

use skirmish_identity::Resolution;
use skirmish_protocol::{ConnectionHandle, JoinCode};

use crate::{LobbyError, MemberSender, SessionStore};

/// What a client sent in its `rejoin` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejoinRequest {
    pub code: String,
    pub display_name: String,
    pub durable_token: Option<String>,
}

/// Rebinds `connection` into the session named by `request.code`.
///
/// On success the connection is registered in the store's registry (the
/// stale handle's entry is dropped) and the session has already sent the
/// pose snapshot, resend requests, and roster update. Returns `None` when
/// the rejoin was dropped: malformed or unknown code, a full roster with
/// no matching slot, or a dead session actor.
pub(crate) async fn rejoin(
    store: &mut SessionStore,
    connection: ConnectionHandle,
    request: RejoinRequest,
    sender: MemberSender,
) -> Option<Resolution> {
    let Ok(code) = JoinCode::parse(&request.code) else {
        tracing::warn!(%connection, code = %request.code, "rejoin with malformed code, ignoring");
        return None;
    };
    let Some(handle) = store.find_by_code(code).cloned() else {
        tracing::warn!(%connection, %code, "rejoin for unknown session, ignoring");
        return None;
    };

    let result = handle
        .rejoin(
            connection,
            request.display_name,
            request.durable_token,
            sender,
        )
        .await;

    let resolution = match result {
        Ok(resolution) => resolution,
        Err(LobbyError::LobbyFull) => {
            tracing::warn!(session_id = %handle.id(), %connection, "rejoin into full session, ignoring");
            return None;
        }
        Err(e) => {
            tracing::warn!(session_id = %handle.id(), %connection, error = %e, "rejoin failed");
            return None;
        }
    };

    let registry = store.registry_mut();
    let bound = match resolution {
        Resolution::Rebound { previous } => {
            registry.rebind(previous, connection, handle.id())
        }
        Resolution::Created => registry.bind(connection, handle.id().clone()),
    };
    if let Err(e) = bound {
        tracing::warn!(session_id = %handle.id(), %connection, error = %e, "rejoin registry update failed");
    }

    Some(resolution)
}
