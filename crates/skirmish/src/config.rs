//! Server configuration.

use std::time::Duration;

use skirmish_lobby::LobbyConfig;

use crate::SkirmishError;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Default time without an inbound frame before a connection is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// A connection with no inbound frame for this long is treated as
    /// gone. Clients keep it alive with `heartbeat`.
    pub idle_timeout: Duration,
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            lobby: LobbyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment.
    ///
    /// - `SKIRMISH_BIND`: full listen address
    /// - `PORT`: port on `0.0.0.0`, used when `SKIRMISH_BIND` is unset
    /// - `SKIRMISH_IDLE_TIMEOUT_SECS`: idle timeout in whole seconds
    ///
    /// # Errors
    /// [`SkirmishError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, SkirmishError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SkirmishError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("SKIRMISH_BIND") {
            let bind = bind.trim();
            if bind.is_empty() {
                return Err(SkirmishError::Config(
                    "SKIRMISH_BIND is empty".into(),
                ));
            }
            config.bind = bind.to_string();
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port.trim().parse().map_err(|_| {
                SkirmishError::Config(format!("PORT={port} is not a port"))
            })?;
            config.bind = format!("0.0.0.0:{port}");
        }

        if let Some(secs) = lookup("SKIRMISH_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                SkirmishError::Config(format!(
                    "SKIRMISH_IDLE_TIMEOUT_SECS={secs} is not a number"
                ))
            })?;
            if secs == 0 {
                return Err(SkirmishError::Config(
                    "SKIRMISH_IDLE_TIMEOUT_SECS must be positive".into(),
                ));
            }
            config.idle_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
