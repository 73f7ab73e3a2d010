//! `SkirmishServer` builder and server loop.
//!
//! This is the entry point for running a Skirmish server. It ties
//! together all the layers: transport → protocol → lobby.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use skirmish_lobby::{LifecycleManager, LobbyConfig};
use skirmish_protocol::{Codec, JsonCodec};
use skirmish_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{ServerConfig, SkirmishError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// lifecycle manager sits behind one lock: every lobby command, and every
/// index update it makes, is serialized through it.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) lobby: Mutex<LifecycleManager>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
    started: Instant,
}

impl<C: Codec> ServerState<C> {
    /// Milliseconds since the server started.
    pub(crate) fn clock(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Skirmish server.
///
/// # Example
///
/// ```rust,ignore
/// use skirmish::prelude::*;
///
/// let server = SkirmishServer::builder()
///     .bind("0.0.0.0:3000")
///     .lobby_config(LobbyConfig::default().with_max_members(8))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct SkirmishServerBuilder {
    config: ServerConfig,
}

impl SkirmishServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the lobby configuration.
    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.config.lobby = config;
        self
    }

    /// Sets how long a connection may stay silent before it is dropped.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<SkirmishServer<JsonCodec>, SkirmishError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;

        let state = Arc::new(ServerState {
            lobby: Mutex::new(LifecycleManager::new(self.config.lobby)),
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
            started: Instant::now(),
        });

        Ok(SkirmishServer { transport, state })
    }
}

impl Default for SkirmishServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Skirmish server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SkirmishServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl SkirmishServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> SkirmishServerBuilder {
        SkirmishServerBuilder::new()
    }
}

impl<C: Codec> SkirmishServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), SkirmishError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops every
    /// session.
    ///
    /// Each accepted connection gets its own handler task.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SkirmishError> {
        tracing::info!(addr = ?self.local_addr().ok(), "skirmish server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(handle_connection(conn, state));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("shutting down");
        self.state.lobby.lock().await.shutdown().await;
        Ok(())
    }
}
