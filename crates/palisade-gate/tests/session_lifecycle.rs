//! Session state machine tests against the manager: login admission,
//! duplicate-login transfer, resume, strikes, and GC.

use std::sync::Arc;
use std::time::Duration;

use palisade_gate::{
    ConnKind, GateConn, GateTransport, LoginDecision, ResumeError, Session, SessionManager,
    SessionState,
};
use palisade_transport::{ConnTimeouts, FramedTcp};
use tokio::net::{TcpListener, TcpStream};

const LONG: Duration = Duration::from_secs(3600);

async fn loopback_conn(id: u64, kind: ConnKind) -> Arc<GateConn> {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let _client = TcpStream::connect(addr).await.expect("connect");
    let (server, _) = listener.accept().await.expect("accept");
    let transport = GateTransport::Tcp(FramedTcp::new(server, 4096, ConnTimeouts::default()));
    GateConn::spawn(id, kind, transport)
}

async fn new_session(manager: &SessionManager, conn_id: u64) -> (i64, Arc<GateConn>) {
    let conn = loopback_conn(conn_id, ConnKind::Tcp).await;
    let id = manager.allocate_id();
    conn.bind_session(id);
    manager.insert(Session::new(id, format!("token-{id}"), Arc::clone(&conn)));
    (id, conn)
}

#[tokio::test]
async fn test_new_session_is_online_and_indexed() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;

    let info = manager.info(id).expect("indexed");
    assert_eq!(info.state, SessionState::Online);
    assert_eq!(info.player_id, 0);
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn test_session_ids_are_monotonic() {
    let manager = SessionManager::new();
    let a = manager.allocate_id();
    let b = manager.allocate_id();
    assert!(b > a);
    assert!(a > 0, "0 is the unset sentinel, never allocated");
}

#[tokio::test]
async fn test_admit_login_walks_online_authing_authenticated() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;

    assert_eq!(manager.admit_login(id, 0, LONG), LoginDecision::Begin);
    assert_eq!(manager.info(id).expect("info").state, SessionState::Authing);

    // A duplicate while authing is dropped.
    assert_eq!(manager.admit_login(id, 0, LONG), LoginDecision::AlreadyAuthing);

    manager.bind_player(id, 500).expect("bind");
    assert_eq!(
        manager.info(id).expect("info").state,
        SessionState::Authenticated
    );
    assert_eq!(
        manager.admit_login(id, 0, LONG),
        LoginDecision::AlreadyAuthenticated
    );
}

#[tokio::test]
async fn test_admit_login_rate_limit_sliding_window() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;

    // Two attempts allowed per window. First consumes the Online→Authing
    // edge; the second is a duplicate but still inside the allowance; the
    // third trips the limiter before any state logic runs.
    assert_eq!(manager.admit_login(id, 2, LONG), LoginDecision::Begin);
    assert_eq!(manager.admit_login(id, 2, LONG), LoginDecision::AlreadyAuthing);
    assert_eq!(manager.admit_login(id, 2, LONG), LoginDecision::RateLimited);
}

#[tokio::test]
async fn test_bind_player_transfers_ownership_and_reports_kick() {
    let manager = SessionManager::new();
    let (old_id, _old_conn) = new_session(&manager, 1).await;
    let (new_id, _new_conn) = new_session(&manager, 2).await;

    manager.admit_login(old_id, 0, LONG);
    manager.bind_player(old_id, 500).expect("bind old");
    assert_eq!(manager.session_of_player(500), Some(old_id));

    manager.admit_login(new_id, 0, LONG);
    let outcome = manager.bind_player(new_id, 500).expect("bind new");

    let (kicked_id, kicked_conn) = outcome.kicked.expect("old session kicked");
    assert_eq!(kicked_id, old_id);
    assert!(kicked_conn.is_some());
    // Ownership transferred: the index and the new session agree, and the
    // old session no longer speaks for the player.
    assert_eq!(manager.session_of_player(500), Some(new_id));
    assert_eq!(manager.info(new_id).expect("info").player_id, 500);
    assert_eq!(manager.info(old_id).expect("info").player_id, 0);
}

#[tokio::test]
async fn test_offline_then_resume_restores_authenticated() {
    let manager = SessionManager::new();
    let (id, conn) = new_session(&manager, 1).await;
    manager.admit_login(id, 0, LONG);
    manager.bind_player(id, 500).expect("bind");

    let info = manager.mark_offline(id).expect("offline");
    assert_eq!(info.player_id, 500);
    assert!(info.conn.is_some());
    assert_eq!(manager.info(id).expect("info").state, SessionState::Offline);
    // Idempotent.
    assert!(manager.mark_offline(id).is_none());
    drop(conn);

    let new_conn = loopback_conn(2, ConnKind::Tcp).await;
    let outcome = manager.try_resume(id, new_conn).expect("resume");
    assert_eq!(outcome.player_id, 500);
    assert_eq!(outcome.restored, SessionState::Authenticated);
    assert!(outcome.old_conn.is_none(), "offline session had no conn");
    assert_eq!(
        manager.info(id).expect("info").state,
        SessionState::Authenticated
    );
}

#[tokio::test]
async fn test_resume_without_player_restores_online() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;
    manager.mark_offline(id).expect("offline");

    let new_conn = loopback_conn(2, ConnKind::Tcp).await;
    let outcome = manager.try_resume(id, new_conn).expect("resume");
    assert_eq!(outcome.restored, SessionState::Online);
}

#[tokio::test]
async fn test_resume_replaces_stale_live_conn() {
    let manager = SessionManager::new();
    let (id, old_conn) = new_session(&manager, 1).await;

    let new_conn = loopback_conn(2, ConnKind::Tcp).await;
    let outcome = manager.try_resume(id, new_conn).expect("resume");
    let stale = outcome.old_conn.expect("stale conn handed back");
    assert_eq!(stale.id(), old_conn.id());
}

#[tokio::test]
async fn test_resume_refused_while_authing_or_closed() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;
    manager.admit_login(id, 0, LONG);

    let new_conn = loopback_conn(2, ConnKind::Tcp).await;
    assert_eq!(
        manager.try_resume(id, new_conn).expect_err("authing"),
        ResumeError::Authing
    );

    let missing = loopback_conn(3, ConnKind::Tcp).await;
    assert_eq!(
        manager.try_resume(9999, missing).expect_err("missing"),
        ResumeError::NotFound
    );
}

#[tokio::test]
async fn test_stale_conn_death_does_not_take_down_resumed_session() {
    let manager = SessionManager::new();
    let (id, old_conn) = new_session(&manager, 1).await;

    let new_conn = loopback_conn(2, ConnKind::Tcp).await;
    manager.try_resume(id, Arc::clone(&new_conn)).expect("resume");

    // The old conn's read loop reports its death late.
    assert!(manager.mark_offline_if_conn(id, old_conn.id()).is_none());
    assert_eq!(manager.info(id).expect("info").state, SessionState::Online);

    // The bound conn's death does count.
    assert!(manager.mark_offline_if_conn(id, new_conn.id()).is_some());
    assert_eq!(manager.info(id).expect("info").state, SessionState::Offline);
}

#[tokio::test]
async fn test_unknown_msg_strikes_accumulate_to_kick() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;

    assert_eq!(manager.note_unknown_msg(id, 3), (1, false));
    assert_eq!(manager.note_unknown_msg(id, 3), (2, false));
    assert_eq!(manager.note_unknown_msg(id, 3), (3, true));
    // Limit 0 disables the kick.
    assert_eq!(manager.note_unknown_msg(id, 0), (4, false));
}

#[tokio::test]
async fn test_gc_removes_only_expired_offline_sessions() {
    let manager = SessionManager::new();
    let (offline_id, _c1) = new_session(&manager, 1).await;
    let (live_id, _c2) = new_session(&manager, 2).await;
    manager.admit_login(offline_id, 0, LONG);
    manager.bind_player(offline_id, 500).expect("bind");
    manager.mark_offline(offline_id).expect("offline");

    // Nothing expires inside the window.
    assert!(manager.gc(LONG).is_empty());
    assert_eq!(manager.len(), 2);

    // With a zero window every Offline session is past due.
    let closed = manager.gc(Duration::ZERO);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id, offline_id);
    assert_eq!(closed[0].player_id, 500);

    // Gone from both indices; the live session is untouched.
    assert!(manager.info(offline_id).is_none());
    assert_eq!(manager.session_of_player(500), None);
    assert!(manager.info(live_id).is_some());
}

#[tokio::test]
async fn test_authing_timeout_scan_finds_overdue_sessions() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;
    manager.admit_login(id, 0, LONG);

    assert!(manager.authing_timeouts(LONG).is_empty());
    assert_eq!(manager.authing_timeouts(Duration::ZERO), vec![id]);
}

#[tokio::test]
async fn test_reply_route_distinguishes_missing_session_from_missing_conn() {
    let manager = SessionManager::new();
    let (id, _conn) = new_session(&manager, 1).await;

    assert!(manager.reply_route(id).is_ok());
    assert!(matches!(
        manager.reply_route(9999).expect_err("no session"),
        palisade_gate::GateError::SessionNotFound(9999)
    ));

    manager.mark_offline(id).expect("offline");
    assert!(matches!(
        manager.reply_route(id).expect_err("no conn"),
        palisade_gate::GateError::NoGateConnection(_)
    ));
}

#[tokio::test]
async fn test_websocket_conns_get_grace_on_idle_scan() {
    let manager = SessionManager::new();
    // Same transport, labelled WS: the scan keys off the conn kind.
    let ws_conn = loopback_conn(1, ConnKind::WebSocket).await;
    let id = manager.allocate_id();
    ws_conn.bind_session(id);
    manager.insert(Session::new(id, "t".into(), Arc::clone(&ws_conn)));

    let (tcp_id, _tcp_conn) = new_session(&manager, 2).await;

    std::thread::sleep(Duration::from_millis(30));
    // Threshold of 25ms: the TCP conn (idle ~30ms) is over it, the WS
    // conn rides its 1.5× grace (37.5ms) and survives.
    let idle = manager.idle_conn_sessions(Duration::from_millis(25));
    let ids: Vec<i64> = idle.iter().map(|(id, _)| *id).collect();
    assert!(ids.contains(&tcp_id));
    assert!(!ids.contains(&id));
}
