//! Integration tests for the lobby: full lifecycle flows driven through
//! `LifecycleManager`, observing what each member's channel receives.

use skirmish_identity::Resolution;
use skirmish_lobby::{
    LeaveOutcome, LifecycleManager, LobbyConfig, LobbyError, MemberSender,
    SessionPhase,
};
use skirmish_protocol::{
    ConnectionHandle, Pose, ServerMessage, SessionSnapshot, Visibility,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

// =========================================================================
// Helpers
// =========================================================================

struct Client {
    handle: ConnectionHandle,
    tx: MemberSender,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn new(n: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ConnectionHandle(n),
            tx,
            rx,
        }
    }

    fn sender(&self) -> MemberSender {
        self.tx.clone()
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn last_snapshot(&mut self) -> SessionSnapshot {
        self.drain()
            .into_iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::RosterUpdated { snapshot }
                | ServerMessage::SessionCreated { snapshot, .. }
                | ServerMessage::SessionJoined { snapshot, .. } => Some(snapshot),
                _ => None,
            })
            .expect("client should have received a snapshot")
    }
}

fn manager() -> LifecycleManager {
    LifecycleManager::new(LobbyConfig::default())
}

async fn create(
    lobby: &mut LifecycleManager,
    client: &Client,
    name: &str,
    visibility: Visibility,
) -> String {
    let id = lobby
        .create_session(client.handle, Some(name), visibility, None, client.sender())
        .await;
    lobby.find(id.as_str()).unwrap().code().to_string()
}

fn host_count(snapshot: &SessionSnapshot) -> usize {
    snapshot.roster.iter().filter(|p| p.is_host).count()
}

// =========================================================================
// Create / join
// =========================================================================

#[tokio::test]
async fn test_create_session_sends_session_created() {
    let mut lobby = manager();
    let mut ana = Client::new(1);

    let id = lobby
        .create_session(ana.handle, Some("Ana"), Visibility::Private, None, ana.sender())
        .await;

    match ana.drain().as_slice() {
        [ServerMessage::SessionCreated { session_id, snapshot, .. }] => {
            assert_eq!(*session_id, id);
            assert_eq!(snapshot.visibility, Visibility::Private);
            assert_eq!(snapshot.host_connection_handle, ana.handle);
            assert_eq!(snapshot.max_members, 16);
        }
        other => panic!("expected SessionCreated, got {other:?}"),
    }
    assert_eq!(lobby.session_of(ana.handle), Some(id));
}

#[tokio::test]
async fn test_create_session_defaults_blank_name() {
    let mut lobby = manager();
    let mut ana = Client::new(1);

    lobby
        .create_session(ana.handle, None, Visibility::Public, None, ana.sender())
        .await;

    let snapshot = ana.last_snapshot();
    assert_eq!(snapshot.roster[0].display_name, "Player");
}

#[tokio::test]
async fn test_join_by_code_broadcasts_notice_and_roster() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let mut bo = Client::new(2);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    ana.drain();

    lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    let ana_msgs = ana.drain();
    assert!(matches!(
        &ana_msgs[0],
        ServerMessage::ChatPosted { entry } if entry.is_system && entry.text == "Bo joined the lobby"
    ));
    let snapshot = bo.last_snapshot();
    assert_eq!(snapshot.roster.len(), 2);
    assert!(!snapshot.roster[1].is_host);
}

#[tokio::test]
async fn test_join_by_code_unknown_or_malformed_code() {
    let mut lobby = manager();
    let bo = Client::new(2);

    for code in ["999999", "12345", "abcdef", ""] {
        let result = lobby
            .join_by_code(bo.handle, code, Some("Bo"), None, bo.sender())
            .await;
        assert_eq!(result, Err(LobbyError::LobbyNotFound), "code {code:?}");
    }
    assert_eq!(lobby.session_of(bo.handle), None);
}

#[tokio::test]
async fn test_join_by_code_full_session() {
    let mut lobby =
        LifecycleManager::new(LobbyConfig::default().with_max_members(2));
    let ana = Client::new(1);
    let bo = Client::new(2);
    let cy = Client::new(3);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    let result = lobby
        .join_by_code(cy.handle, &code, Some("Cy"), None, cy.sender())
        .await;

    assert_eq!(result, Err(LobbyError::LobbyFull));
    assert_eq!(lobby.session_of(cy.handle), None);
}

#[tokio::test]
async fn test_join_by_code_started_session() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    lobby.explicit_start(ana.handle).await.unwrap();

    let result = lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await;

    assert_eq!(result, Err(LobbyError::AlreadyStarted));
}

#[tokio::test]
async fn test_member_of_one_session_leaves_before_creating_another() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let mut bo = Client::new(2);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await
        .unwrap();
    let first = lobby.session_of(bo.handle).unwrap();
    bo.drain();

    let second = lobby
        .create_session(bo.handle, Some("Bo"), Visibility::Public, None, bo.sender())
        .await;

    assert_ne!(first, second);
    assert_eq!(lobby.session_of(bo.handle), Some(second));
    let snapshot = lobby.find(first.as_str()).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.roster.len(), 1);
}

#[tokio::test]
async fn test_refused_join_by_code_keeps_current_session() {
    let mut lobby =
        LifecycleManager::new(LobbyConfig::default().with_max_members(1));
    let ana = Client::new(1);
    let mut bo = Client::new(2);
    let full = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    let own = create(&mut lobby, &bo, "Bo", Visibility::Private).await;
    let id = lobby.session_of(bo.handle).unwrap();
    bo.drain();

    for (code, expected) in [
        ("555555", LobbyError::LobbyNotFound),
        ("nope", LobbyError::LobbyNotFound),
        (full.as_str(), LobbyError::LobbyFull),
    ] {
        let result = lobby
            .join_by_code(bo.handle, code, Some("Bo"), None, bo.sender())
            .await;
        assert_eq!(result, Err(expected), "code {code:?}");
    }
    lobby.explicit_start(ana.handle).await.unwrap();
    let result = lobby
        .join_by_code(bo.handle, &full, Some("Bo"), None, bo.sender())
        .await;
    assert_eq!(result, Err(LobbyError::AlreadyStarted));

    assert_eq!(lobby.session_of(bo.handle), Some(id.clone()));
    assert_eq!(lobby.find(&own).map(|h| h.id().clone()), Some(id));
    assert!(bo.drain().is_empty());
}

#[tokio::test]
async fn test_join_by_code_into_own_session_is_noop() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    let id = lobby.session_of(ana.handle).unwrap();
    ana.drain();

    let result = lobby
        .join_by_code(ana.handle, &code, Some("Ana"), None, ana.sender())
        .await;

    assert_eq!(result, Ok(id.clone()));
    assert_eq!(lobby.session_of(ana.handle), Some(id));
    assert!(ana.drain().is_empty());
    let snapshot = lobby.find(&code).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.roster.len(), 1);
    assert_eq!(snapshot.host_connection_handle, ana.handle);
}

#[tokio::test]
async fn test_join_by_code_moves_member_between_sessions() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let target = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    let old = create(&mut lobby, &bo, "Bo", Visibility::Private).await;

    lobby
        .join_by_code(bo.handle, &target, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    assert!(lobby.find(&old).is_none());
    assert_eq!(lobby.session_count(), 1);
    let snapshot = lobby.find(&target).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.roster.len(), 2);
}

// =========================================================================
// Quick-match
// =========================================================================

#[tokio::test]
async fn test_quick_match_joins_public_session_and_starts_it() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let mut bo = Client::new(2);
    create(&mut lobby, &ana, "Ana", Visibility::Public).await;
    ana.drain();

    let id = lobby
        .quick_match(bo.handle, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    assert_eq!(lobby.session_of(ana.handle), Some(id.clone()));
    assert_eq!(lobby.session_count(), 1);
    let info = lobby.find(id.as_str()).unwrap().info().await.unwrap();
    assert_eq!(info.phase, SessionPhase::Running);
    for client in [&mut ana, &mut bo] {
        let msgs = client.drain();
        match msgs.last() {
            Some(ServerMessage::MatchStarted { map, roster, .. }) => {
                assert_eq!(map, "arabic_city");
                assert_eq!(roster.len(), 2);
            }
            other => panic!("expected MatchStarted, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_quick_match_skips_private_sessions() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let mut bo = Client::new(2);
    create(&mut lobby, &ana, "Ana", Visibility::Private).await;

    let id = lobby
        .quick_match(bo.handle, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    assert_eq!(lobby.session_count(), 2);
    assert_ne!(lobby.session_of(ana.handle), Some(id));
    let msgs = bo.drain();
    assert!(matches!(msgs[0], ServerMessage::SessionCreated { .. }));
    assert!(matches!(msgs.last(), Some(ServerMessage::MatchStarted { .. })));
}

#[tokio::test]
async fn test_quick_match_without_candidates_creates_running_session() {
    let mut lobby = manager();
    let bo = Client::new(2);

    let id = lobby
        .quick_match(bo.handle, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    let info = lobby.find(id.as_str()).unwrap().info().await.unwrap();
    assert_eq!(info.phase, SessionPhase::Running);
    assert!(info.visibility.is_public());
    assert_eq!(info.member_count, 1);
}

// =========================================================================
// Host-only commands / chat
// =========================================================================

#[tokio::test]
async fn test_commands_from_unmapped_connection() {
    let mut lobby = manager();
    let ghost = ConnectionHandle(99);

    assert_eq!(
        lobby.explicit_start(ghost).await,
        Err(LobbyError::NotInSession)
    );
    assert_eq!(
        lobby.set_visibility(ghost, false).await,
        Err(LobbyError::NotInSession)
    );
    assert_eq!(
        lobby.post_chat(ghost, "hi".into()).await,
        Err(LobbyError::NotInSession)
    );
    assert_eq!(lobby.leave(ghost).await, None);
    lobby.submit_pose(ghost, Pose::default());
    lobby.request_all_poses(ghost).await;
}

#[tokio::test]
async fn test_non_host_cannot_start_or_change_visibility() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    assert_eq!(lobby.explicit_start(bo.handle).await, Err(LobbyError::NotHost));
    assert_eq!(
        lobby.set_visibility(bo.handle, true).await,
        Err(LobbyError::NotHost)
    );
    assert_eq!(lobby.explicit_start(ana.handle).await, Ok(()));
    assert_eq!(
        lobby.explicit_start(ana.handle).await,
        Err(LobbyError::AlreadyStarted)
    );
}

#[tokio::test]
async fn test_chat_log_is_capped_oldest_first() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let id = lobby
        .create_session(ana.handle, Some("Ana"), Visibility::Private, None, ana.sender())
        .await;

    for i in 0..130 {
        lobby.post_chat(ana.handle, format!("line {i}")).await.unwrap();
    }

    let chat_posts = ana
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::ChatPosted { .. }))
        .count();
    assert_eq!(chat_posts, 130);
    let snapshot = lobby.find(id.as_str()).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.chat.len(), 50);
    assert_eq!(snapshot.chat[0].text, "line 80");
}

// =========================================================================
// Leave / teardown
// =========================================================================

#[tokio::test]
async fn test_host_leaves_running_session_promotes_next() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let mut bo = Client::new(2);
    create(&mut lobby, &ana, "Ana", Visibility::Public).await;
    lobby
        .quick_match(bo.handle, Some("Bo"), None, bo.sender())
        .await
        .unwrap();
    bo.drain();

    let outcome = lobby.leave(ana.handle).await;

    assert_eq!(
        outcome,
        Some(LeaveOutcome::Left {
            promoted: Some(bo.handle)
        })
    );
    let msgs = bo.drain();
    assert_eq!(
        msgs.last(),
        Some(&ServerMessage::MemberLeft {
            connection_handle: ana.handle
        })
    );
    let snapshot = msgs
        .iter()
        .find_map(|m| match m {
            ServerMessage::RosterUpdated { snapshot } => Some(snapshot.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(snapshot.host_connection_handle, bo.handle);
    assert!(snapshot.started);
    assert_eq!(host_count(&snapshot), 1);
    assert_eq!(lobby.session_count(), 1);
    assert_eq!(lobby.session_of(ana.handle), None);
}

#[tokio::test]
async fn test_last_member_leaving_destroys_session() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let id = lobby
        .create_session(ana.handle, Some("Ana"), Visibility::Public, None, ana.sender())
        .await;
    let code = lobby.find(id.as_str()).unwrap().code().to_string();

    assert_eq!(lobby.leave(ana.handle).await, Some(LeaveOutcome::Emptied));

    assert_eq!(lobby.session_count(), 0);
    assert!(lobby.find(id.as_str()).is_none());
    assert!(lobby.find(&code).is_none());
    let result = lobby
        .join_by_code(bo.handle, &code, Some("Bo"), None, bo.sender())
        .await;
    assert_eq!(result, Err(LobbyError::LobbyNotFound));
}

#[tokio::test]
async fn test_single_host_across_join_leave_sequence() {
    let mut lobby = manager();
    let mut clients: Vec<Client> = (1..=6).map(Client::new).collect();
    let code = create(&mut lobby, &clients[0], "c1", Visibility::Private).await;
    for c in clients.iter().skip(1) {
        lobby
            .join_by_code(c.handle, &code, Some("c"), None, c.sender())
            .await
            .unwrap();
    }

    // Leave in an order that removes the host twice.
    for leaving in [0usize, 3, 1, 5] {
        lobby.leave(clients[leaving].handle).await;
        let survivor = clients
            .iter_mut()
            .find(|c| lobby.session_of(c.handle).is_some())
            .unwrap();
        let snapshot = survivor.last_snapshot();
        assert_eq!(host_count(&snapshot), 1);
    }
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_pose_reaches_every_other_member() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let mut bo = Client::new(2);
    let mut cy = Client::new(3);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    for c in [&bo, &cy] {
        lobby
            .join_by_code(c.handle, &code, Some("x"), None, c.sender())
            .await
            .unwrap();
    }
    ana.drain();
    bo.drain();
    cy.drain();

    lobby.submit_pose(
        ana.handle,
        Pose {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            yaw: 0.1,
            pitch: 0.2,
        },
    );
    // Ordered behind the pose on the actor's queue.
    lobby.request_all_poses(cy.handle).await;
    let id = lobby.session_of(cy.handle).unwrap();
    lobby.find(id.as_str()).unwrap().info().await.unwrap();

    assert!(
        !ana.drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::PoseBroadcast { .. }))
    );
    for c in [&mut bo, &mut cy] {
        let msgs = c.drain();
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::PoseBroadcast { connection_handle, pose }
                if *connection_handle == ConnectionHandle(1) && pose.z == 3.0
        )));
    }
}

// =========================================================================
// Rejoin
// =========================================================================

#[tokio::test]
async fn test_rejoin_with_token_rebinds_in_place() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let mut cy = Client::new(3);
    let id = lobby
        .create_session(ana.handle, Some("Ana"), Visibility::Public, None, ana.sender())
        .await;
    let code = lobby.find(id.as_str()).unwrap().code().to_string();
    lobby
        .join_by_code(bo.handle, &code, Some("Bo"), Some("tok123".into()), bo.sender())
        .await
        .unwrap();
    lobby
        .join_by_code(cy.handle, &code, Some("Cy"), None, cy.sender())
        .await
        .unwrap();
    lobby.explicit_start(ana.handle).await.unwrap();
    lobby.submit_pose(bo.handle, Pose::default());
    lobby.submit_pose(cy.handle, Pose::default());
    let before = lobby.find(&code).unwrap().snapshot().await.unwrap();
    cy.drain();

    // Bo's socket dropped; Bo comes back on a new connection.
    let mut bo2 = Client::new(20);
    let resolution = lobby
        .rejoin(bo2.handle, &code, Some("Bo"), Some("tok123".into()), bo2.sender())
        .await;

    assert_eq!(
        resolution,
        Some(Resolution::Rebound {
            previous: bo.handle
        })
    );
    let after = lobby.find(&code).unwrap().snapshot().await.unwrap();
    assert_eq!(after.roster.len(), before.roster.len());
    assert_eq!(after.roster[1].connection_handle, bo2.handle);
    assert_eq!(after.roster[1].display_name, "Bo");
    assert!(!after.roster[1].is_host);
    assert!(after.started);

    assert_eq!(lobby.session_of(bo2.handle), Some(id.clone()));
    assert_eq!(lobby.session_of(bo.handle), None);
    // The stale connection's late disconnect is a no-op.
    assert_eq!(lobby.leave(bo.handle).await, None);
    assert_eq!(lobby.find(&code).unwrap().snapshot().await.unwrap().roster.len(), 3);

    match bo2.drain().first() {
        Some(ServerMessage::PoseSnapshot { poses }) => {
            assert!(poses.contains_key(&cy.handle));
            assert!(!poses.contains_key(&bo.handle));
        }
        other => panic!("expected PoseSnapshot, got {other:?}"),
    }
    let cy_msgs = cy.drain();
    assert_eq!(cy_msgs[0], ServerMessage::ResendPoseRequest);
    assert!(matches!(cy_msgs[1], ServerMessage::RosterUpdated { .. }));
    drop(bo);
}

#[tokio::test]
async fn test_rejoin_without_match_appends_one_member() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Public).await;
    let zed = Client::new(9);

    let resolution = lobby
        .rejoin(zed.handle, &code, Some("Zed"), Some("tok-zed".into()), zed.sender())
        .await;

    assert_eq!(resolution, Some(Resolution::Created));
    let snapshot = lobby.find(&code).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.roster.len(), 2);
    assert!(!snapshot.roster[1].is_host);
    assert!(lobby.session_of(zed.handle).is_some());
}

#[tokio::test]
async fn test_rejoin_unknown_code_is_dropped() {
    let mut lobby = manager();
    let zed = Client::new(9);

    assert_eq!(
        lobby
            .rejoin(zed.handle, "555555", Some("Zed"), None, zed.sender())
            .await,
        None
    );
    assert_eq!(
        lobby
            .rejoin(zed.handle, "nope", Some("Zed"), None, zed.sender())
            .await,
        None
    );
    assert_eq!(lobby.session_of(zed.handle), None);
}

#[tokio::test]
async fn test_rejoin_unknown_code_keeps_current_session() {
    let mut lobby = manager();
    let mut ana = Client::new(1);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Private).await;
    let id = lobby.session_of(ana.handle).unwrap();
    ana.drain();

    for bad in ["555555", "nope"] {
        let resolution = lobby
            .rejoin(ana.handle, bad, Some("Ana"), None, ana.sender())
            .await;
        assert_eq!(resolution, None, "code {bad:?}");
    }

    assert_eq!(lobby.session_of(ana.handle), Some(id));
    assert_eq!(lobby.session_count(), 1);
    assert!(lobby.find(&code).is_some());
    assert!(ana.drain().is_empty());
}

#[tokio::test]
async fn test_quick_match_moves_host_out_of_own_public_session() {
    let mut lobby = manager();
    let ana = Client::new(1);
    let bo = Client::new(2);
    let other = create(&mut lobby, &ana, "Ana", Visibility::Public).await;
    let own = create(&mut lobby, &bo, "Bo", Visibility::Public).await;

    let id = lobby
        .quick_match(bo.handle, Some("Bo"), None, bo.sender())
        .await
        .unwrap();

    assert_eq!(lobby.find(&other).map(|h| h.id().clone()), Some(id));
    assert!(lobby.find(&own).is_none());
    assert_eq!(lobby.session_count(), 1);
}

#[tokio::test]
async fn test_rejoin_full_session_without_match_is_dropped() {
    let mut lobby =
        LifecycleManager::new(LobbyConfig::default().with_max_members(1));
    let ana = Client::new(1);
    let code = create(&mut lobby, &ana, "Ana", Visibility::Public).await;
    let zed = Client::new(9);

    let resolution = lobby
        .rejoin(zed.handle, &code, Some("Zed"), Some("x".into()), zed.sender())
        .await;

    assert_eq!(resolution, None);
    assert_eq!(lobby.session_of(zed.handle), None);
}
