//! Per-connection handler: greeting, command routing, and outbound delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn a writer task draining this connection's outbound queue
//!   2. Queue `connected` so the client learns its handle
//!   3. Loop: receive envelopes → dispatch to the lifecycle manager
//!   4. On close, error, or idle timeout: leave the session

use std::sync::Arc;

use skirmish_lobby::MemberSender;
use skirmish_protocol::{
    Channel, ClientMessage, Codec, ConnectionHandle, Envelope, ServerMessage,
    PROTOCOL_VERSION,
};
use skirmish_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;

/// Leaves whatever session the connection is in once its handler is gone,
/// whether it returned or unwound. `leave` needs the lobby lock, so the
/// drop hands it to a spawned task.
struct MembershipGuard<C: Codec> {
    connection: ConnectionHandle,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for MembershipGuard<C> {
    fn drop(&mut self) {
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut lobby = state.lobby.lock().await;
            lobby.leave(connection).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) {
    let connection = ConnectionHandle::from(conn.id());
    let conn = Arc::new(conn);
    tracing::info!(%connection, "connection accepted");

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        rx,
        Arc::clone(&state),
        connection,
    ));
    let _guard = MembershipGuard {
        connection,
        state: Arc::clone(&state),
    };

    let _ = tx.send(ServerMessage::Connected {
        connection_handle: connection,
        protocol_version: PROTOCOL_VERSION,
    });

    loop {
        let data =
            match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
                Ok(Ok(Some(data))) => data,
                Ok(Ok(None)) => {
                    tracing::info!(%connection, "connection closed cleanly");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::debug!(%connection, error = %e, "recv error");
                    break;
                }
                Err(_) => {
                    tracing::info!(%connection, "connection timed out");
                    break;
                }
            };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(
                    %connection, error = %e, "failed to decode envelope"
                );
                continue;
            }
        };

        dispatch(&state, connection, envelope.payload, &tx).await;
    }

    writer.abort();
    // _guard drops here → leave fires.
}

/// Routes one command to the lifecycle manager.
///
/// Join failures are answered with `join_rejected`, other refused
/// commands with `command_rejected`. Everything else the client sees
/// arrives through the session's broadcasts.
async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    connection: ConnectionHandle,
    msg: ClientMessage,
    tx: &MemberSender,
) {
    let kind = msg.kind();
    tracing::trace!(%connection, kind, "command");

    match msg {
        ClientMessage::CreateSession {
            display_name,
            visibility,
            durable_token,
        } => {
            let mut lobby = state.lobby.lock().await;
            lobby
                .create_session(
                    connection,
                    display_name.as_deref(),
                    visibility,
                    durable_token,
                    tx.clone(),
                )
                .await;
        }

        ClientMessage::JoinByCode {
            code,
            display_name,
            durable_token,
        } => {
            let result = state
                .lobby
                .lock()
                .await
                .join_by_code(
                    connection,
                    &code,
                    display_name.as_deref(),
                    durable_token,
                    tx.clone(),
                )
                .await;
            if let Err(e) = result {
                tracing::debug!(%connection, %code, error = %e, "join rejected");
                reply(tx, ServerMessage::JoinRejected { reason: e.reason() });
            }
        }

        ClientMessage::QuickMatch {
            display_name,
            durable_token,
        } => {
            let result = state
                .lobby
                .lock()
                .await
                .quick_match(
                    connection,
                    display_name.as_deref(),
                    durable_token,
                    tx.clone(),
                )
                .await;
            if let Err(e) = result {
                reply(tx, ServerMessage::JoinRejected { reason: e.reason() });
            }
        }

        ClientMessage::SetVisibility { is_public } => {
            let result = state
                .lobby
                .lock()
                .await
                .set_visibility(connection, is_public)
                .await;
            reject_on_error(tx, connection, kind, result);
        }

        ClientMessage::StartSession => {
            let result =
                state.lobby.lock().await.explicit_start(connection).await;
            reject_on_error(tx, connection, kind, result);
        }

        ClientMessage::PostChat { text } => {
            let result =
                state.lobby.lock().await.post_chat(connection, text).await;
            reject_on_error(tx, connection, kind, result);
        }

        ClientMessage::SubmitPose(pose) => {
            if !pose.is_finite() {
                tracing::debug!(%connection, ?pose, "non-finite pose dropped");
                return;
            }
            // PERF: the lock is held only to resolve the session handle;
            // the relay itself is a non-blocking send to the actor.
            state.lobby.lock().await.submit_pose(connection, pose);
        }

        ClientMessage::LeaveSession => {
            state.lobby.lock().await.leave(connection).await;
        }

        ClientMessage::Rejoin {
            code,
            display_name,
            durable_token,
        } => {
            state
                .lobby
                .lock()
                .await
                .rejoin(
                    connection,
                    &code,
                    display_name.as_deref(),
                    durable_token,
                    tx.clone(),
                )
                .await;
        }

        ClientMessage::RequestAllPoses => {
            state.lobby.lock().await.request_all_poses(connection).await;
        }

        ClientMessage::Heartbeat { client_time } => {
            reply(
                tx,
                ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: state.clock(),
                },
            );
        }
    }
}

fn reject_on_error(
    tx: &MemberSender,
    connection: ConnectionHandle,
    kind: &str,
    result: Result<(), skirmish_lobby::LobbyError>,
) {
    if let Err(e) = result {
        tracing::debug!(%connection, kind, error = %e, "command rejected");
        reply(tx, ServerMessage::CommandRejected { reason: e.reason() });
    }
}

/// Queues a direct reply. The writer only goes away with the connection,
/// so a failed send has nobody left to tell.
fn reply(tx: &MemberSender, msg: ServerMessage) {
    let _ = tx.send(msg);
}

/// Drains the outbound queue onto the socket, stamping each message with
/// this connection's sequence number and the server clock.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    state: Arc<ServerState<C>>,
    connection: ConnectionHandle,
) {
    let mut seq: u64 = 0;

    while let Some(msg) = rx.recv().await {
        let envelope = Envelope::outbound(next_seq(&mut seq), state.clock(), msg);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(%connection, error = %e, "failed to encode envelope");
                continue;
            }
        };

        let sent = match envelope.channel {
            Channel::Unreliable => conn.send_unreliable(&bytes).await,
            Channel::ReliableOrdered | Channel::ReliableUnordered => {
                conn.send(&bytes).await
            }
        };
        if let Err(e) = sent {
            tracing::debug!(%connection, error = %e, "send failed, stopping writer");
            break;
        }
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
