//! Session store: every live session, indexed by id and by join code.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use skirmish_identity::{IdentityRegistry, Player};
use skirmish_protocol::{JoinCode, SessionId, Visibility};

use crate::session::spawn_session;
use crate::{LobbyConfig, MemberSender, SessionHandle};

/// In-memory collection of sessions plus the connection → session index.
///
/// Both session indexes are written only by [`create`](Self::create) and
/// [`remove`](Self::remove), so an id and its code always resolve to the
/// same session and disappear together.
pub struct SessionStore {
    by_id: HashMap<SessionId, SessionHandle>,
    by_code: HashMap<JoinCode, SessionId>,
    registry: IdentityRegistry,
    config: Arc<LobbyConfig>,
}

impl SessionStore {
    pub fn new(config: Arc<LobbyConfig>) -> Self {
        Self {
            by_id: HashMap::new(),
            by_code: HashMap::new(),
            registry: IdentityRegistry::new(),
            config,
        }
    }

    /// Spawns a session with `host` as its only member.
    ///
    /// Allocates a fresh id and a join code not held by any live session.
    /// The host is bound in the registry and has been sent
    /// `session_created` by the time this returns.
    pub fn create(
        &mut self,
        host: Player,
        host_sender: MemberSender,
        visibility: Visibility,
    ) -> SessionHandle {
        let id = generate_session_id();
        let code = allocate_code(&self.by_code, || {
            rand::rng().random_range(JoinCode::MIN..=JoinCode::MAX)
        });
        let host_connection = host.connection;

        let handle = spawn_session(
            id.clone(),
            code,
            host,
            host_sender,
            visibility,
            Arc::clone(&self.config),
        );

        self.by_code.insert(code, id.clone());
        self.by_id.insert(id.clone(), handle.clone());
        // A fresh id cannot collide with an existing binding.
        let _ = self.registry.bind(host_connection, id.clone());

        tracing::info!(
            session_id = %id,
            %code,
            host = %host_connection,
            ?visibility,
            "session created"
        );
        handle
    }

    /// Looks a session up by id or by join code.
    pub fn find(&self, id_or_code: &str) -> Option<&SessionHandle> {
        match JoinCode::parse(id_or_code) {
            Ok(code) => self.find_by_code(code),
            Err(_) => self.find_by_id(&SessionId::new(id_or_code)),
        }
    }

    pub fn find_by_id(&self, id: &SessionId) -> Option<&SessionHandle> {
        self.by_id.get(id)
    }

    pub fn find_by_code(&self, code: JoinCode) -> Option<&SessionHandle> {
        self.by_code.get(&code).and_then(|id| self.by_id.get(id))
    }

    /// Removes both index entries and every registry binding of a session.
    ///
    /// Returns the handle if the session was present.
    pub fn remove(&mut self, id: &SessionId) -> Option<SessionHandle> {
        let handle = self.by_id.remove(id)?;
        self.by_code.remove(&handle.code());
        self.registry.unbind_session(id);
        tracing::info!(session_id = %id, code = %handle.code(), "session destroyed");
        Some(handle)
    }

    /// The first public session with a free slot, in either phase, other
    /// than `excluding`.
    ///
    /// Asks each actor for its current info; sessions whose actor is gone
    /// are skipped.
    pub async fn find_joinable_public(
        &self,
        excluding: Option<&SessionId>,
    ) -> Option<SessionHandle> {
        for handle in self.by_id.values() {
            if Some(handle.id()) == excluding {
                continue;
            }
            match handle.info().await {
                Ok(info) if info.is_joinable_public() => {
                    return Some(handle.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %handle.id(), error = %e, "skipping session");
                }
            }
        }
        None
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.registry
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ids of every live session.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.by_id.keys().cloned().collect()
    }
}

/// Draws codes until one is not in use.
fn allocate_code<V>(
    taken: &HashMap<JoinCode, V>,
    mut draw: impl FnMut() -> u32,
) -> JoinCode {
    loop {
        if let Ok(code) = JoinCode::new(draw()) {
            if !taken.contains_key(&code) {
                return code;
            }
        }
    }
}

/// 128 random bits as 32 lowercase hex characters.
fn generate_session_id() -> SessionId {
    let bytes: [u8; 16] = rand::rng().random();
    SessionId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}
