//! BattlEye RCON protocol engine.
//!
//! Datagram-oriented: every request carries an 8-bit sequence number
//! that the server echoes in its reply. The server also pushes
//! messages at any time; each one is acknowledged and delivered to
//! subscribers. An empty command every 45 seconds keeps the
//! authenticated session alive on the server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use crate::battleye::packet::{self, BePayload};
use crate::config::RconConfig;
use crate::error::{RconError, Result};
use crate::event::{EventBus, RconEvent};
use crate::state::{ConnectionState, Session};

/// Interval between keep-alive heartbeats while authenticated.
///
/// The protocol drops sessions silent for 45 seconds; any packet
/// within that window retains them, and an empty command is harmless.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);

/// Receive buffer for inbound datagrams.
const RECV_BUFFER_LEN: usize = 4096;

// ── Shared engine state ──────────────────────────────────────────

struct Shared {
    session: Session,
    /// In-flight commands keyed by sequence number. At most one live
    /// entry per sequence value.
    pending: HashMap<u8, oneshot::Sender<Result<Vec<u8>>>>,
    login: Option<oneshot::Sender<Result<()>>>,
    next_seq: u8,
    events: EventBus,
}

impl Shared {
    fn new() -> Self {
        Self {
            session: Session::new(),
            pending: HashMap::new(),
            login: None,
            next_seq: 0,
            events: EventBus::new(),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        let (new, old) = self.session.transition(next);
        self.events.emit(RconEvent::StateChange { new, old });
    }

    /// Claim the next sequence number.
    ///
    /// Returns `None` when that sequence is still outstanding from 256
    /// requests ago — the caller observes this as backpressure.
    fn alloc_seq(&mut self) -> Option<u8> {
        let seq = self.next_seq;
        if self.pending.contains_key(&seq) {
            return None;
        }
        self.next_seq = seq.wrapping_add(1);
        Some(seq)
    }

    fn fail_all_pending(&mut self) {
        for (_, done) in self.pending.drain() {
            let _ = done.send(Err(RconError::connection_closed()));
        }
        if let Some(login) = self.login.take() {
            let _ = login.send(Err(RconError::connection_closed()));
        }
    }

    fn close_session(&mut self, had_error: bool) {
        self.fail_all_pending();
        if self.session.state().is_disconnected() {
            return;
        }
        self.transition(ConnectionState::Disconnected);
        self.events.emit(RconEvent::Disconnected);
        self.events.emit(RconEvent::Close { had_error });
    }

    fn fail_session(&mut self, message: String) {
        self.events.emit(RconEvent::Error(message));
        self.fail_all_pending();
        if self.session.state().is_active() {
            self.transition(ConnectionState::Error);
        }
        self.events.emit(RconEvent::Close { had_error: true });
    }

    /// Resolve the login handshake from the server's result byte.
    fn resolve_login(&mut self, result: u8) {
        if let Some(login) = self.login.take() {
            if result == 0x01 {
                self.transition(ConnectionState::Authenticated);
                self.events.emit(RconEvent::Authenticated);
                let _ = login.send(Ok(()));
            } else {
                let _ = login.send(Err(RconError::AuthFailed));
            }
        } else {
            trace!(result, "login response without handshake in flight");
        }
    }

    /// Route a command response to its waiter.
    ///
    /// Returns `true` when a waiter existed; heartbeat echoes and
    /// late replies have none and are dropped.
    fn complete_command(&mut self, seq: u8, body: Vec<u8>) -> bool {
        match self.pending.remove(&seq) {
            Some(done) => {
                let _ = done.send(Ok(body));
                true
            }
            None => {
                trace!(seq, "response without waiter (heartbeat echo or late reply)");
                false
            }
        }
    }

    /// Deliver a server-pushed message to subscribers.
    fn push_message(&mut self, body: &[u8]) {
        let text = String::from_utf8_lossy(body).into_owned();
        self.events.emit(RconEvent::ServerMessage(text));
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── BattlEyeClient ───────────────────────────────────────────────

/// A BattlEye RCON client.
///
/// One UDP socket per client lifetime. All waits in this protocol run
/// under the connect timeout; `io_timeout` has no separate role here.
pub struct BattlEyeClient {
    config: RconConfig,
    shared: Arc<Mutex<Shared>>,
    socket: Option<Arc<UdpSocket>>,
    tasks: Vec<JoinHandle<()>>,
    /// Signalled whenever a pending slot frees up, waking callers
    /// blocked on sequence backpressure.
    slot_freed: Arc<Notify>,
}

impl BattlEyeClient {
    /// Build a client in the `Disconnected` state.
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared::new())),
            socket: None,
            tasks: Vec::new(),
            slot_freed: Arc::new(Notify::new()),
        }
    }

    /// The immutable configuration this client was built from.
    pub fn config(&self) -> &RconConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).session.state()
    }

    /// Whether `execute` is currently accepted.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Number of in-flight requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared).pending.len()
    }

    /// Register a lifecycle event subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RconEvent> {
        lock(&self.shared).events.subscribe()
    }

    // ── Connect ──────────────────────────────────────────────────

    /// Open the socket and log in.
    ///
    /// A missing login response counts as rejection, exactly like a
    /// wrong password; authentication is never retried.
    pub async fn connect(&mut self) -> Result<()> {
        {
            let mut shared = lock(&self.shared);
            if !shared.session.state().is_disconnected() {
                return Err(RconError::ConnectionFailed(
                    "client is not disconnected".to_string(),
                ));
            }
            shared.transition(ConnectionState::Connecting);
        }

        let socket = match self.open_socket().await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                lock(&self.shared).transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.socket = Some(Arc::clone(&socket));
        self.spawn_reader(Arc::clone(&socket));

        {
            let mut shared = lock(&self.shared);
            shared.transition(ConnectionState::Connected);
            shared.transition(ConnectionState::Authenticating);
            // The sequence space is per-session and starts at zero.
            shared.next_seq = 0;
        }

        let (done_tx, done_rx) = oneshot::channel();
        lock(&self.shared).login = Some(done_tx);

        let login = packet::build(&packet::login_payload(self.config.password.as_bytes()));
        if let Err(e) = socket.send(&login).await {
            self.shutdown_io();
            lock(&self.shared).close_session(false);
            return Err(RconError::ConnectionFailed(format!("login send failed: {e}")));
        }

        match timeout(self.config.connect_timeout, done_rx).await {
            Ok(Ok(Ok(()))) => {
                self.spawn_heartbeat(socket);
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.shutdown_io();
                lock(&self.shared).close_session(false);
                Err(e)
            }
            Ok(Err(_)) => {
                self.shutdown_io();
                lock(&self.shared).close_session(false);
                Err(RconError::connection_closed())
            }
            Err(_) => {
                // No verdict within the deadline counts as rejection.
                self.shutdown_io();
                lock(&self.shared).close_session(false);
                Err(RconError::AuthFailed)
            }
        }
    }

    // ── Execute ──────────────────────────────────────────────────

    /// Run a command and return the server's response.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        let body = self
            .config
            .payload_encoding
            .encode(command)
            .map_err(RconError::into_command_failure)?;

        let wait = self.config.connect_timeout;
        let deadline = Instant::now() + wait;

        // Claim a sequence slot; a live entry for the next sequence
        // (256 requests still outstanding) blocks us until one frees.
        let (seq, done_rx) = loop {
            {
                let mut shared = lock(&self.shared);
                if !shared.session.state().is_authenticated() {
                    return Err(RconError::NotAuthenticated);
                }
                if let Some(seq) = shared.alloc_seq() {
                    let (done_tx, done_rx) = oneshot::channel();
                    shared.pending.insert(seq, done_tx);
                    break (seq, done_rx);
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || timeout(remaining, self.slot_freed.notified()).await.is_err()
            {
                return Err(RconError::Timeout(wait));
            }
        };

        let socket = match &self.socket {
            Some(socket) => Arc::clone(socket),
            None => {
                self.release_slot(seq);
                return Err(RconError::connection_closed().into_command_failure());
            }
        };

        let datagram = packet::build(&packet::command_payload(seq, &body));
        if self.config.debug {
            debug!(seq, len = body.len(), "command sent");
        }
        if let Err(e) = socket.send(&datagram).await {
            self.release_slot(seq);
            return Err(RconError::SocketError(e));
        }

        match timeout(wait, done_rx).await {
            Ok(Ok(Ok(bytes))) => Ok(self.config.payload_encoding.decode(&bytes)),
            Ok(Ok(Err(e))) => Err(e.into_command_failure()),
            Ok(Err(_)) => Err(RconError::connection_closed().into_command_failure()),
            Err(_) => {
                self.release_slot(seq);
                Err(RconError::Timeout(wait))
            }
        }
    }

    // ── Disconnect ───────────────────────────────────────────────

    /// Tear down the session. Never fails; in-flight requests are
    /// failed with a connection-closed error.
    pub async fn disconnect(&mut self) {
        self.shutdown_io();
        lock(&self.shared).close_session(false);
        self.slot_freed.notify_waiters();
    }

    // ── Internals ────────────────────────────────────────────────

    async fn open_socket(&self) -> Result<UdpSocket> {
        let mut addrs = lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| RconError::ConnectionFailed(format!("address lookup failed: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| RconError::ConnectionFailed("no usable server address".to_string()))?;

        let bind_addr: SocketAddr = if addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| RconError::ConnectionFailed(format!("socket bind failed: {e}")))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| RconError::ConnectionFailed(format!("connect to {addr} failed: {e}")))?;
        debug!(%addr, "udp socket ready");
        Ok(socket)
    }

    fn spawn_reader(&mut self, socket: Arc<UdpSocket>) {
        let shared = Arc::clone(&self.shared);
        let slot_freed = Arc::clone(&self.slot_freed);
        let packet_trace = self.config.debug;

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_LEN];
            loop {
                let len = match socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(e) => {
                        lock(&shared).fail_session(e.to_string());
                        break;
                    }
                };

                // Invalid datagrams are dropped silently: peers that
                // share the port may deliver unrelated traffic.
                let payload = match packet::parse(&buf[..len]) {
                    Ok(payload) => payload,
                    Err(e) => {
                        if packet_trace {
                            debug!(len, error = %e, "dropping datagram");
                        }
                        continue;
                    }
                };
                let decoded = match BePayload::decode(payload) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        if packet_trace {
                            debug!(error = %e, "dropping malformed payload");
                        }
                        continue;
                    }
                };

                match decoded {
                    BePayload::LoginResult(result) => {
                        lock(&shared).resolve_login(result);
                    }
                    BePayload::Command { seq, body } => {
                        if lock(&shared).complete_command(seq, body) {
                            slot_freed.notify_waiters();
                        }
                    }
                    BePayload::Message { seq, body } => {
                        // Ack first, unconditionally: the server
                        // repeats a sequence it believes unseen, and
                        // re-acking a duplicate is harmless.
                        let ack = packet::build(&packet::ack_payload(seq));
                        if let Err(e) = socket.send(&ack).await {
                            warn!(seq, error = %e, "message ack failed");
                        }
                        lock(&shared).push_message(&body);
                    }
                }
            }
        });
        self.tasks.push(reader);
    }

    fn spawn_heartbeat(&mut self, socket: Arc<UdpSocket>) {
        let shared = Arc::clone(&self.shared);

        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            // The first tick completes immediately; the login exchange
            // already proved the session alive, so skip it.
            interval.tick().await;

            loop {
                interval.tick().await;
                let seq = {
                    let mut shared = lock(&shared);
                    if !shared.session.state().is_authenticated() {
                        break;
                    }
                    match shared.alloc_seq() {
                        Some(seq) => seq,
                        // Window saturated: command traffic itself is
                        // keeping the session alive this interval.
                        None => continue,
                    }
                };

                // Fire-and-forget: registering an entry would leak it
                // whenever the empty reply is dropped.
                let datagram = packet::build(&packet::command_payload(seq, b""));
                if let Err(e) = socket.send(&datagram).await {
                    warn!(error = %e, "heartbeat send failed");
                }
            }
        });
        self.tasks.push(heartbeat);
    }

    fn release_slot(&self, seq: u8) {
        lock(&self.shared).pending.remove(&seq);
        self.slot_freed.notify_waiters();
    }

    fn shutdown_io(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.socket = None;
    }
}

impl Drop for BattlEyeClient {
    fn drop(&mut self) {
        self.shutdown_io();
    }
}

// ── Tests ────────────────────────────────────────────────────────
