//! End-to-end tests for the connection manager against a loopback
//! WebSocket server and mocked REST auth endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_api::ParleyApi;
use parley_auth::{SessionAuthority, create_memory_store};
use parley_session::{
    ChatSession, ConnectionState, FixedDelay, SessionConfig, SessionError, Subscription,
};
use parley_types::{ChatMessage, MessageKind};

// ────────────────────────────────────────────────────────────────────────────
// Test harness
// ────────────────────────────────────────────────────────────────────────────

/// One accepted socket, as seen from the server side.
struct TestConn {
    /// Request URI of the handshake (path + query).
    uri: String,
    /// Frames to push to the client. Dropping this closes the connection.
    to_client: mpsc::UnboundedSender<WsMessage>,
    /// Frames received from the client.
    from_client: mpsc::UnboundedReceiver<WsMessage>,
}

impl TestConn {
    fn send_json(&self, value: serde_json::Value) {
        self.to_client
            .send(WsMessage::Text(value.to_string().into()))
            .expect("connection closed");
    }
}

struct ChatServer {
    url: String,
    addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<TestConn>,
    guard: JoinHandle<()>,
}

impl ChatServer {
    async fn next_conn(&mut self) -> TestConn {
        tokio::time::timeout(Duration::from_secs(5), self.conns.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("server stopped")
    }

    async fn expect_no_conn(&mut self, wait: Duration) {
        if tokio::time::timeout(wait, self.conns.recv()).await.is_ok() {
            panic!("unexpected connection arrived");
        }
    }

    /// Stop accepting new connections; live ones keep running.
    fn stop_listening(&self) {
        self.guard.abort();
    }
}

async fn spawn_chat_server() -> ChatServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    spawn_chat_server_on(listener)
}

/// Rebind on a specific address, waiting out the previous listener.
async fn spawn_chat_server_at(addr: SocketAddr) -> ChatServer {
    let listener = loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => break listener,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    spawn_chat_server_on(listener)
}

fn spawn_chat_server_on(listener: TcpListener) -> ChatServer {
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conns) = mpsc::unbounded_channel();

    let guard = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let mut uri = String::new();
                let ws = tokio_tungstenite::accept_hdr_async(
                    stream,
                    |req: &Request, resp: Response| {
                        uri = req.uri().to_string();
                        Ok(resp)
                    },
                )
                .await;
                let Ok(ws) = ws else { return };

                let (mut sink, mut source) = ws.split();
                let (to_client, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
                let (in_tx, from_client) = mpsc::unbounded_channel::<WsMessage>();

                if conn_tx
                    .send(TestConn {
                        uri,
                        to_client,
                        from_client,
                    })
                    .is_err()
                {
                    return;
                }

                loop {
                    tokio::select! {
                        msg = out_rx.recv() => match msg {
                            Some(msg) => {
                                if sink.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            // Test dropped the sender: close from our side.
                            None => {
                                let _ = sink.close().await;
                                break;
                            }
                        },
                        msg = source.next() => match msg {
                            Some(Ok(msg)) => {
                                let _ = in_tx.send(msg);
                            }
                            _ => break,
                        },
                    }
                }
            });
        }
    });

    ChatServer {
        url: format!("http://{addr}"),
        addr,
        conns,
        guard,
    }
}

async fn logged_in_authority(rest: &MockServer) -> SessionAuthority {
    mock_auth_endpoints(rest, "acc-1").await;
    let api = ParleyApi::builder().base_url(rest.uri()).build().unwrap();
    let authority = SessionAuthority::new(api, create_memory_store());
    authority.login("ada", "pw").await.unwrap();
    authority
}

async fn mock_auth_endpoints(rest: &MockServer, access: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access": access,
            "refresh": "ref-1"
        })))
        .mount(rest)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/user/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "username": "ada",
            "email": ""
        })))
        .mount(rest)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(rest)
        .await;
}

fn fast_policy(delay_ms: u64, max_attempts: u32) -> Arc<FixedDelay> {
    Arc::new(FixedDelay::new(Duration::from_millis(delay_ms), max_attempts))
}

fn collect(session: &ChatSession) -> (Subscription, mpsc::UnboundedReceiver<ChatMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = session.subscribe(move |msg| {
        let _ = tx.send(msg.clone());
    });
    (sub, rx)
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.expect("state watch closed");
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for state {want}");
}

async fn recv_message(rx: &mut mpsc::UnboundedReceiver<ChatMessage>) -> ChatMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("bus subscription dropped")
}

async fn recv_client_text(conn: &mut TestConn) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), conn.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("connection closed");
        if let WsMessage::Text(text) = msg {
            return text.to_string();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connects_when_authenticated_and_delivers_in_order() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority);
    let (_sub, mut messages) = collect(&session);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let conn = server.next_conn().await;
    assert!(conn.uri.starts_with("/ws/chat/"));
    assert!(conn.uri.contains("token=acc-1"));
    assert!(conn.uri.contains("auth_type=jwt"));

    conn.send_json(serde_json::json!({"type": "message", "id": "m1", "content": "hi"}));
    conn.send_json(serde_json::json!({"type": "message", "id": "m2", "content": "there"}));

    let first = recv_message(&mut messages).await;
    let second = recv_message(&mut messages).await;
    assert_eq!(first.id, "m1");
    assert!(!first.from_user);
    assert_eq!(second.id, "m2");

    session.shutdown().await;
}

#[tokio::test]
async fn test_repeated_id_delivered_once() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority);
    let (_sub, mut messages) = collect(&session);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let conn = server.next_conn().await;

    for _ in 0..3 {
        conn.send_json(serde_json::json!({"type": "message", "id": "m1", "content": "hi"}));
    }
    conn.send_json(serde_json::json!({"type": "message", "id": "m2", "content": "marker"}));

    assert_eq!(recv_message(&mut messages).await.id, "m1");
    // The marker comes straight after: both re-sends of m1 were suppressed.
    assert_eq!(recv_message(&mut messages).await.id, "m2");

    session.shutdown().await;
}

#[tokio::test]
async fn test_send_echoes_locally_and_suppresses_server_relay() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority);
    let (_sub, mut messages) = collect(&session);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let mut conn = server.next_conn().await;

    let echo = session.send("hello").await.unwrap();
    assert!(echo.from_user);
    assert_eq!(echo.kind, MessageKind::Chat);

    // Local echo arrives on the bus without waiting for the server.
    let local = recv_message(&mut messages).await;
    assert_eq!(local.id, echo.id);
    assert!(local.from_user);

    // The wire frame carries the same id and content.
    let frame: serde_json::Value =
        serde_json::from_str(&recv_client_text(&mut conn).await).unwrap();
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["id"], echo.id.as_str());
    assert_eq!(frame["content"], "hello");

    // The server relays our message back; the relay must be suppressed.
    conn.send_json(serde_json::json!({
        "type": "message", "id": echo.id, "content": "hello", "isUser": true
    }));
    conn.send_json(serde_json::json!({"type": "message", "id": "m9", "content": "next"}));
    assert_eq!(recv_message(&mut messages).await.id, "m9");

    session.shutdown().await;
}

#[tokio::test]
async fn test_send_while_unauthenticated_fails() {
    let rest = MockServer::start().await;
    let api = ParleyApi::builder().base_url(rest.uri()).build().unwrap();
    let authority = SessionAuthority::new(api, create_memory_store());

    let session = ChatSession::spawn(SessionConfig::new("http://127.0.0.1:9"), authority);
    let err = session.send("x").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert_eq!(session.state(), ConnectionState::Idle);

    session.shutdown().await;
}

#[tokio::test]
async fn test_loading_error_and_malformed_frames() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority);
    let (_sub, mut messages) = collect(&session);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let conn = server.next_conn().await;

    conn.send_json(serde_json::json!({"type": "loading", "status": "started"}));
    // Malformed and unknown frames are dropped without killing the socket.
    conn.to_client
        .send(WsMessage::Text("definitely not json".into()))
        .unwrap();
    conn.send_json(serde_json::json!({"type": "user_info", "user": "ada"}));
    conn.send_json(serde_json::json!({"type": "loading", "status": "completed"}));
    conn.send_json(serde_json::json!({"type": "error", "error": "boom"}));

    assert_eq!(
        recv_message(&mut messages).await.kind,
        MessageKind::LoadingStarted
    );
    assert_eq!(
        recv_message(&mut messages).await.kind,
        MessageKind::LoadingDone
    );
    let error = recv_message(&mut messages).await;
    assert_eq!(error.kind, MessageKind::Error);
    assert_eq!(error.content, "boom");
    assert_eq!(session.state(), ConnectionState::Connected);

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let config = SessionConfig::new(&server.url).with_policy(fast_policy(200, 5));
    let session = ChatSession::spawn(config, authority);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let conn = server.next_conn().await;
    drop(conn); // server closes the socket

    wait_for_state(&mut state, ConnectionState::Disconnected).await;
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let replacement = server.next_conn().await;
    assert!(replacement.uri.contains("token=acc-1"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_retries_capped_then_manual_reconnect_recovers() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;
    let addr = server.addr;

    let config = SessionConfig::new(&server.url).with_policy(fast_policy(30, 2));
    let session = ChatSession::spawn(config, authority);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let conn = server.next_conn().await;

    // Take the listener down, then drop the live socket: every reconnect
    // attempt now fails until the cap is hit.
    server.stop_listening();
    drop(conn);

    wait_for_state(&mut state, ConnectionState::Failed).await;
    assert!(matches!(
        session.send("x").await.unwrap_err(),
        SessionError::NotConnected
    ));

    // Nothing fires on its own from the failed state; a manual reconnect
    // with the listener back recovers with a reset attempt counter.
    let mut revived = spawn_chat_server_at(addr).await;
    session.reconnect().unwrap();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    revived.next_conn().await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_logout_during_backoff_cancels_reconnect() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let config = SessionConfig::new(&server.url).with_policy(fast_policy(300, 5));
    let session = ChatSession::spawn(config, authority.clone());
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let conn = server.next_conn().await;

    drop(conn);
    wait_for_state(&mut state, ConnectionState::Disconnected).await;

    // Logout lands inside the 300 ms backoff window.
    authority.logout().await.unwrap();
    wait_for_state(&mut state, ConnectionState::Idle).await;

    // The pending reconnect must never fire.
    server.expect_no_conn(Duration::from_millis(600)).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_logout_closes_live_socket() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority.clone());
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let mut conn = server.next_conn().await;

    authority.logout().await.unwrap();
    wait_for_state(&mut state, ConnectionState::Idle).await;

    // The server side observes the close.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match conn.from_client.recv().await {
                Some(WsMessage::Close(_)) | None => return,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket was not closed on logout");

    session.shutdown().await;
}

#[tokio::test]
async fn test_refresh_rotates_token_for_next_connection() {
    let rest = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access": "acc-2",
            "refresh": "ref-2"
        })))
        .mount(&rest)
        .await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let config = SessionConfig::new(&server.url).with_policy(fast_policy(30, 5));
    let session = ChatSession::spawn(config, authority.clone());
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;

    let conn = server.next_conn().await;
    assert!(conn.uri.contains("token=acc-1"));

    // Rotation does not disturb the live socket...
    authority.refresh_now().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);

    // ...but the next attempt must use the new token.
    drop(conn);
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let replacement = server.next_conn().await;
    assert!(
        replacement.uri.contains("token=acc-2"),
        "stale token used after refresh: {}",
        replacement.uri
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_refresh_failure_logs_out_and_stops_session() {
    let rest = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "revoked"})),
        )
        .mount(&rest)
        .await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority.clone());
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let _conn = server.next_conn().await;

    assert!(authority.refresh_now().await.is_err());

    // Identity dropped: socket closes, no reconnect is scheduled.
    wait_for_state(&mut state, ConnectionState::Idle).await;
    server.expect_no_conn(Duration::from_millis(400)).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_manual_reconnect_replaces_live_socket() {
    let rest = MockServer::start().await;
    let authority = logged_in_authority(&rest).await;
    let mut server = spawn_chat_server().await;

    let session = ChatSession::spawn(SessionConfig::new(&server.url), authority);
    let mut state = session.state_watch();
    wait_for_state(&mut state, ConnectionState::Connected).await;
    let mut first = server.next_conn().await;

    session.reconnect().unwrap();

    // The old socket is force-closed before the new one opens.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.from_client.recv().await {
                Some(WsMessage::Close(_)) | None => return,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "old socket not closed on manual reconnect");

    let _second = server.next_conn().await;
    wait_for_state(&mut state, ConnectionState::Connected).await;

    session.shutdown().await;
}
