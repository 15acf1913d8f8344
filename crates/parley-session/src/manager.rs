//! Connection manager: binds one socket to the session's credential.
//!
//! A single spawned task owns the socket handle and the attempt counter.
//! Every transition runs inside that task, so handlers never interleave;
//! the rest of the program talks to it through a command channel and a
//! state watch. The task re-reads identity and access token from the
//! authority at the moment it needs them — never from a snapshot taken
//! when a timer was scheduled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use parley_auth::SessionAuthority;
use parley_types::{ChatMessage, ClientFrame, Identity, ServerFrame};

use crate::bus::{MessageBus, Subscription};
use crate::dedup::{DEFAULT_WINDOW, DedupWindow};
use crate::error::{Result, SessionError};
use crate::policy::{DisconnectCause, FixedDelay, ReconnectDecision, ReconnectPolicy};

/// Connection lifecycle states, published on the session's state watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no intent to open one (unauthenticated, or pre-start).
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open and sends are accepted.
    Connected,
    /// The socket dropped; a retry is pending or being decided.
    Disconnected,
    /// Retries exhausted. Only a manual reconnect or a fresh login leaves
    /// this state.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How the socket URI tags its bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    Jwt,
    OAuth2,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a chat session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Server base URL (http/https); converted to ws/wss for the socket.
    pub server_url: String,
    /// Auth-type tag embedded in the socket URI.
    pub auth_scheme: AuthScheme,
    /// Decides retry-or-give-up after unexpected disconnections.
    pub policy: Arc<dyn ReconnectPolicy>,
    /// Capacity of the duplicate-suppression window.
    pub dedup_window: usize,
}

impl SessionConfig {
    /// Config with the shipped defaults: jwt tag, 5 s × 5 fixed-delay
    /// policy, 100-id dedup window.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            auth_scheme: AuthScheme::default(),
            policy: Arc::new(FixedDelay::default()),
            dedup_window: DEFAULT_WINDOW,
        }
    }

    /// Replace the reconnect policy.
    pub fn with_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Set the auth-type tag.
    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }
}

/// Build the socket URI for the chat endpoint.
///
/// `http`/`ws` become `ws`, `https`/`wss` become `wss`; the path is fixed
/// and the access token and auth-type ride in the query string.
pub fn chat_socket_url(server_url: &str, token: &str, scheme: AuthScheme) -> Result<String> {
    let mut url =
        Url::parse(server_url).map_err(|e| SessionError::InvalidUrl(e.to_string()))?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SessionError::InvalidUrl(format!(
                "Unsupported URL scheme: {other}"
            )));
        }
    };

    url.set_scheme(ws_scheme)
        .map_err(|_| SessionError::InvalidUrl("Failed to set scheme".to_string()))?;
    url.set_path("/ws/chat/");
    url.query_pairs_mut()
        .clear()
        .append_pair("token", token)
        .append_pair("auth_type", scheme.as_str());

    Ok(url.to_string())
}

/// Commands accepted by the manager task.
enum Command {
    Send {
        content: String,
        reply: oneshot::Sender<Result<ChatMessage>>,
    },
    Reconnect,
}

/// Handle to a running chat session.
///
/// Cheap operations only; the work happens in the manager task. Dropping
/// the handle shuts the task down and closes any open socket.
pub struct ChatSession {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    bus: MessageBus,
    task: JoinHandle<()>,
}

impl ChatSession {
    /// Spawn the manager task for this configuration.
    ///
    /// The session starts in `Idle` and connects as soon as the
    /// authority's identity signal is authenticated.
    pub fn spawn(config: SessionConfig, authority: SessionAuthority) -> Self {
        let bus = MessageBus::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let manager = ConnectionManager {
            dedup: DedupWindow::new(config.dedup_window),
            identity_rx: authority.identity(),
            authority,
            config,
            bus: bus.clone(),
            state_tx,
            commands: command_rx,
            attempts: 0,
        };
        let task = tokio::spawn(manager.run());

        Self {
            commands: command_tx,
            state_rx,
            bus,
            task,
        }
    }

    /// The connection state as of now.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The bus carrying accepted inbound messages and local echoes.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Convenience: subscribe a handler to the message bus.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Send a chat message over the live socket.
    ///
    /// On success the returned message is the local echo already handed to
    /// the bus. Fails with [`SessionError::NotConnected`] in any state but
    /// `Connected` — there is no queueing and no silent drop.
    pub async fn send(&self, content: impl Into<String>) -> Result<ChatMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                content: content.into(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Force a reconnect: close any open socket, reset the attempt
    /// counter, and connect again immediately, bypassing backoff.
    pub fn reconnect(&self) -> Result<()> {
        self.commands
            .send(Command::Reconnect)
            .map_err(|_| SessionError::Closed)
    }

    /// Shut the session down and wait for the task to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Outcome of the connected phase.
enum SessionEvent {
    /// The socket dropped for the given cause.
    Dropped(DisconnectCause),
    /// A manual reconnect was requested.
    ManualReconnect,
    /// Identity became unauthenticated.
    LoggedOut,
    /// The handle was dropped.
    Shutdown,
}

/// Outcome of a backoff wait.
enum BackoffOutcome {
    Elapsed,
    ManualReconnect,
    LoggedOut,
    Shutdown,
}

/// Outcome of the failed state.
enum FailedOutcome {
    Resume,
    LoggedOut,
    Shutdown,
}

/// Whether to return to idle or exit the task.
enum Flow {
    Continue,
    Shutdown,
}

/// The task-side state machine. Exclusively owns the socket handle, the
/// attempt counter, and the dedup window.
struct ConnectionManager {
    config: SessionConfig,
    authority: SessionAuthority,
    identity_rx: watch::Receiver<Identity>,
    bus: MessageBus,
    state_tx: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    attempts: u32,
    dedup: DedupWindow,
}

impl ConnectionManager {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Idle);
            self.attempts = 0;

            if !self.wait_for_auth().await {
                return;
            }

            match self.run_authenticated().await {
                Flow::Continue => {}
                Flow::Shutdown => return,
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            tracing::debug!(%state, "Connection state changed");
        }
        self.state_tx.send_replace(state);
    }

    fn authenticated(&self) -> bool {
        self.identity_rx.borrow().is_authenticated()
    }

    /// Idle: wait until the identity is authenticated and a token exists.
    /// Returns false when the handle is gone.
    async fn wait_for_auth(&mut self) -> bool {
        loop {
            if self.authenticated() && self.authority.access_token().is_some() {
                return true;
            }

            tokio::select! {
                changed = self.identity_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotConnected));
                    }
                    // Nothing to reconnect to without a credential.
                    Some(Command::Reconnect) => {}
                    None => return false,
                },
            }
        }
    }

    /// The connect/retry cycle. Returns when identity drops (back to
    /// idle) or the handle is gone.
    async fn run_authenticated(&mut self) -> Flow {
        loop {
            // Re-read both signals at attempt time: a refresh may have
            // rotated the token, a logout may have landed during backoff.
            if !self.authenticated() {
                return Flow::Continue;
            }
            let Some(token) = self.authority.access_token() else {
                return Flow::Continue;
            };

            self.set_state(ConnectionState::Connecting);
            let url = match chat_socket_url(&self.config.server_url, &token, self.config.auth_scheme)
            {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot build chat socket URL");
                    self.set_state(ConnectionState::Failed);
                    match self.wait_in_failed().await {
                        FailedOutcome::Resume => continue,
                        FailedOutcome::LoggedOut => return Flow::Continue,
                        FailedOutcome::Shutdown => return Flow::Shutdown,
                    }
                }
            };

            tracing::info!(server = %self.config.server_url, attempt = self.attempts, "Connecting to chat socket");
            let cause = match connect_async(&url).await {
                Ok((stream, _)) => {
                    self.attempts = 0;
                    self.set_state(ConnectionState::Connected);
                    tracing::info!("Chat socket connected");

                    match self.drive(stream).await {
                        SessionEvent::Dropped(cause) => cause,
                        SessionEvent::ManualReconnect => {
                            self.attempts = 0;
                            continue;
                        }
                        SessionEvent::LoggedOut => return Flow::Continue,
                        SessionEvent::Shutdown => return Flow::Shutdown,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Chat socket connection failed");
                    DisconnectCause::Error
                }
            };

            // No reconnect is ever scheduled for a logged-out identity.
            if !self.authenticated() {
                return Flow::Continue;
            }
            self.set_state(ConnectionState::Disconnected);

            match self.config.policy.decide(self.attempts, cause) {
                ReconnectDecision::Retry { delay } => {
                    self.attempts += 1;
                    tracing::info!(
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );
                    match self.backoff(delay).await {
                        BackoffOutcome::Elapsed => continue,
                        BackoffOutcome::ManualReconnect => {
                            self.attempts = 0;
                            continue;
                        }
                        BackoffOutcome::LoggedOut => return Flow::Continue,
                        BackoffOutcome::Shutdown => return Flow::Shutdown,
                    }
                }
                ReconnectDecision::GiveUp => {
                    tracing::error!(attempts = self.attempts, "Reconnect attempts exhausted");
                    self.set_state(ConnectionState::Failed);
                    match self.wait_in_failed().await {
                        FailedOutcome::Resume => {
                            self.attempts = 0;
                            continue;
                        }
                        FailedOutcome::LoggedOut => return Flow::Continue,
                        FailedOutcome::Shutdown => return Flow::Shutdown,
                    }
                }
            }
        }
    }

    /// Drive an open socket until something ends it.
    async fn drive(&mut self, stream: WsStream) -> SessionEvent {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { content, reply }) => {
                        if let Some(event) = self.handle_send(&mut sink, content, reply).await {
                            return event;
                        }
                    }
                    Some(Command::Reconnect) => {
                        tracing::info!("Manual reconnect, closing current socket");
                        let _ = sink.close().await;
                        return SessionEvent::ManualReconnect;
                    }
                    None => {
                        let _ = sink.close().await;
                        return SessionEvent::Shutdown;
                    }
                },

                frame = source.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(&text),
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sink.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::info!("Server closed connection");
                        return SessionEvent::Dropped(DisconnectCause::ClosedByServer);
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        tracing::warn!("Ignoring unexpected binary frame");
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Chat socket error");
                        return SessionEvent::Dropped(DisconnectCause::Error);
                    }
                    None => {
                        return SessionEvent::Dropped(DisconnectCause::ClosedByServer);
                    }
                },

                changed = self.identity_rx.changed() => {
                    let _ = changed;
                    if !self.authenticated() {
                        tracing::info!("Identity cleared, closing chat socket");
                        let _ = sink.close().await;
                        return SessionEvent::LoggedOut;
                    }
                    // A credential rotation does not disturb a live socket;
                    // the new token is picked up by the next attempt.
                }
            }
        }
    }

    /// Write a frame and publish the local echo. Returns an event if the
    /// write killed the connection.
    async fn handle_send(
        &mut self,
        sink: &mut WsSink,
        content: String,
        reply: oneshot::Sender<Result<ChatMessage>>,
    ) -> Option<SessionEvent> {
        let message = ChatMessage::outbound(content);
        let frame = ClientFrame::from_message(&message);

        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound frame");
                let _ = reply.send(Err(SessionError::NotConnected));
                return None;
            }
        };

        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
            tracing::warn!(error = %e, "Socket write failed");
            let _ = reply.send(Err(SessionError::NotConnected));
            return Some(SessionEvent::Dropped(DisconnectCause::Error));
        }

        // Fire-and-forget: the echo goes to the bus now, not when the
        // server acknowledges. Recording the id first suppresses the
        // server's relay of this same message.
        self.dedup.accept(&message.id);
        self.bus.publish(&message);
        let _ = reply.send(Ok(message));
        None
    }

    /// Decode one inbound frame and deliver it if it is new.
    fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => {
                if let Some(message) = frame.into_message() {
                    if self.dedup.accept(&message.id) {
                        self.bus.publish(&message);
                    } else {
                        tracing::debug!(id = %message.id, "Suppressing duplicate message");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
            }
        }
    }

    /// Sleep out a retry delay. The wait is cancelled by logout or manual
    /// reconnect; sends keep failing fast throughout.
    async fn backoff(&mut self, delay: Duration) -> BackoffOutcome {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    // Re-validate at fire time, not schedule time.
                    return if self.authenticated() {
                        BackoffOutcome::Elapsed
                    } else {
                        BackoffOutcome::LoggedOut
                    };
                }
                changed = self.identity_rx.changed() => {
                    let _ = changed;
                    if !self.authenticated() {
                        tracing::info!("Logged out during backoff, cancelling reconnect");
                        return BackoffOutcome::LoggedOut;
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotConnected));
                    }
                    Some(Command::Reconnect) => return BackoffOutcome::ManualReconnect,
                    None => return BackoffOutcome::Shutdown,
                },
            }
        }
    }

    /// Failed: no automatic attempts. Leave on manual reconnect, fresh
    /// authentication, or logout.
    async fn wait_in_failed(&mut self) -> FailedOutcome {
        loop {
            tokio::select! {
                changed = self.identity_rx.changed() => {
                    if changed.is_err() {
                        return FailedOutcome::Shutdown;
                    }
                    if self.authenticated() {
                        tracing::info!("Fresh authentication, leaving failed state");
                        return FailedOutcome::Resume;
                    }
                    return FailedOutcome::LoggedOut;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotConnected));
                    }
                    Some(Command::Reconnect) => return FailedOutcome::Resume,
                    None => return FailedOutcome::Shutdown,
                },
            }
        }
    }
}
