//! Source RCON protocol engine.
//!
//! Connects over TCP, authenticates, and correlates command responses
//! using the terminator-packet convention: every `execute` sends the
//! command followed by an empty sentinel request. The server answers
//! requests in order, so once the sentinel's echo arrives no fragment
//! of the command's reply can still be outstanding.
//!
//! The socket is split into background reader and writer tasks; all
//! mutable engine state (session, correlation table, event bus) lives
//! in one critical section shared with those tasks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::config::RconConfig;
use crate::error::{RconError, Result};
use crate::event::{EventBus, RconEvent};
use crate::source::codec::SourceCodec;
use crate::source::packet::{SourcePacket, SourcePacketType, MAX_BODY_LEN};
use crate::state::{ConnectionState, Session};

/// Capacity of the outbound packet queue feeding the writer task.
const WRITE_QUEUE_DEPTH: usize = 64;

// ── Request id allocation ────────────────────────────────────────

/// Value at which the request id counter wraps back to 1.
const ID_WRAP: i32 = 1_000_000;

/// Allocates request ids from a monotonic counter.
///
/// Ids run `1..ID_WRAP` and wrap back to 1; the counter never yields
/// `0` or `-1`, so an allocated id can never collide with the server's
/// auth-failure sentinel.
#[derive(Debug)]
pub(crate) struct RequestIdGen {
    next: i32,
}

impl RequestIdGen {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn next(&mut self) -> i32 {
        let id = self.next;
        self.next = if id >= ID_WRAP - 1 { 1 } else { id + 1 };
        id
    }
}

// ── Correlation table ────────────────────────────────────────────

/// One in-flight `execute`, owned exclusively by the engine.
struct InFlight {
    terminator_id: i32,
    /// Response fragments in arrival order.
    fragments: Vec<Vec<u8>>,
    done: oneshot::Sender<Result<Vec<u8>>>,
}

/// The one pending authentication handshake.
///
/// Exactly one auth is ever in flight (a fresh connect per client, no
/// re-auth), so an inbound `id == -1` unambiguously fails this waiter.
struct AuthWait {
    auth_id: i32,
    done: oneshot::Sender<Result<()>>,
}

// ── Shared engine state ──────────────────────────────────────────

struct Shared {
    session: Session,
    pending: HashMap<i32, InFlight>,
    /// Secondary lookup: terminator id → command id.
    by_terminator: HashMap<i32, i32>,
    auth: Option<AuthWait>,
    events: EventBus,
}

impl Shared {
    fn new() -> Self {
        Self {
            session: Session::new(),
            pending: HashMap::new(),
            by_terminator: HashMap::new(),
            auth: None,
            events: EventBus::new(),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        let (new, old) = self.session.transition(next);
        self.events.emit(RconEvent::StateChange { new, old });
    }

    /// Fail every in-flight entry with a connection-closed error and
    /// empty the correlation table.
    fn fail_all_pending(&mut self) {
        for (_, entry) in self.pending.drain() {
            let _ = entry.done.send(Err(RconError::connection_closed()));
        }
        self.by_terminator.clear();
        if let Some(auth) = self.auth.take() {
            let _ = auth.done.send(Err(RconError::connection_closed()));
        }
    }

    /// Orderly teardown: entries are failed and the table emptied
    /// before the state becomes `Disconnected`.
    fn close_session(&mut self, had_error: bool) {
        self.fail_all_pending();
        if self.session.state().is_disconnected() {
            return;
        }
        self.transition(ConnectionState::Disconnected);
        self.events.emit(RconEvent::Disconnected);
        self.events.emit(RconEvent::Close { had_error });
    }

    /// Asynchronous socket failure: emit the error, fail all entries,
    /// and park the session in `Error` until the caller disconnects.
    fn fail_session(&mut self, message: String) {
        self.events.emit(RconEvent::Error(message));
        self.fail_all_pending();
        if self.session.state().is_active() {
            self.transition(ConnectionState::Error);
        }
        self.events.emit(RconEvent::Close { had_error: true });
    }

    fn remove_entry(&mut self, command_id: i32) {
        if let Some(entry) = self.pending.remove(&command_id) {
            self.by_terminator.remove(&entry.terminator_id);
        }
    }

    /// Route one inbound packet.
    fn dispatch(&mut self, packet: SourcePacket) {
        match self.session.state() {
            ConnectionState::Authenticating => self.dispatch_auth(packet),
            ConnectionState::Authenticated => self.dispatch_response(packet),
            state => trace!(%state, id = packet.id, "dropping packet outside session"),
        }
    }

    fn dispatch_auth(&mut self, packet: SourcePacket) {
        // The authoritative signal is the id field. `-1` during the
        // handshake means the password was rejected.
        if packet.id == -1 {
            if let Some(auth) = self.auth.take() {
                let _ = auth.done.send(Err(RconError::AuthFailed));
            }
            return;
        }

        let matches_auth = self
            .auth
            .as_ref()
            .is_some_and(|a| a.auth_id == packet.id);

        if matches_auth && packet.packet_type == SourcePacketType::ExecCommand {
            self.transition(ConnectionState::Authenticated);
            self.events.emit(RconEvent::Authenticated);
            if let Some(auth) = self.auth.take() {
                let _ = auth.done.send(Ok(()));
            }
        }
        // An empty type-0 response may precede the type-2 verdict;
        // everything else during the handshake is ignored.
    }

    fn dispatch_response(&mut self, packet: SourcePacket) {
        if let Some(&command_id) = self.by_terminator.get(&packet.id) {
            // Terminator echo: the response is complete.
            if let Some(entry) = self.pending.remove(&command_id) {
                self.by_terminator.remove(&entry.terminator_id);
                let total: usize = entry.fragments.iter().map(Vec::len).sum();
                let mut body = Vec::with_capacity(total);
                for fragment in entry.fragments {
                    body.extend_from_slice(&fragment);
                }
                let _ = entry.done.send(Ok(body));
            }
        } else if let Some(entry) = self.pending.get_mut(&packet.id) {
            entry.fragments.push(packet.body);
        } else {
            trace!(id = packet.id, "dropping unsolicited response");
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── SourceClient ─────────────────────────────────────────────────

/// A Source RCON client.
///
/// One TCP stream per client lifetime: created by [`connect`], released
/// by [`disconnect`] or on error. Awaiting callers serialise `execute`
/// naturally; the correlation table still routes each reply to its own
/// waiter if callers overlap.
///
/// [`connect`]: SourceClient::connect
/// [`disconnect`]: SourceClient::disconnect
pub struct SourceClient {
    config: RconConfig,
    shared: Arc<Mutex<Shared>>,
    writer_tx: Option<mpsc::Sender<SourcePacket>>,
    tasks: Vec<JoinHandle<()>>,
    ids: RequestIdGen,
}

impl SourceClient {
    /// Build a client in the `Disconnected` state.
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared::new())),
            writer_tx: None,
            tasks: Vec::new(),
            ids: RequestIdGen::new(),
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

    /// Connect and authenticate.
    ///
    /// On success the session is `Authenticated`. Authentication is
    /// never retried: repeated attempts risk server-imposed IP bans.
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

        let addr = match self.resolve_addr().await {
            Ok(addr) => addr,
            Err(e) => {
                lock(&self.shared).transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                lock(&self.shared).transition(ConnectionState::Disconnected);
                return Err(RconError::ConnectionFailed(format!(
                    "connect to {addr} failed: {e}"
                )));
            }
            Err(_) => {
                lock(&self.shared).transition(ConnectionState::Disconnected);
                return Err(RconError::Timeout(self.config.connect_timeout));
            }
        };
        let _ = stream.set_nodelay(true);
        debug!(%addr, "tcp stream established");

        self.spawn_io(stream);
        {
            let mut shared = lock(&self.shared);
            shared.transition(ConnectionState::Connected);
            shared.transition(ConnectionState::Authenticating);
        }

        // Authentication handshake: fresh id, password as body.
        let auth_id = self.ids.next();
        let (done_tx, done_rx) = oneshot::channel();
        lock(&self.shared).auth = Some(AuthWait {
            auth_id,
            done: done_tx,
        });

        let password = self.config.password.clone().into_bytes();
        if self.send(SourcePacket::auth(auth_id, password)).await.is_err() {
            self.shutdown_io();
            lock(&self.shared).close_session(false);
            return Err(RconError::connection_closed());
        }

        match timeout(self.config.connect_timeout, done_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                // Auth rejected or the stream died mid-handshake.
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
                self.shutdown_io();
                lock(&self.shared).close_session(false);
                Err(RconError::Timeout(self.config.connect_timeout))
            }
        }
    }

    // ── Execute ──────────────────────────────────────────────────

    /// Run a command and return its (possibly fragmented) response.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        let body = self
            .config
            .payload_encoding
            .encode(command)
            .map_err(RconError::into_command_failure)?;
        if body.len() > MAX_BODY_LEN {
            return Err(
                RconError::InvalidPacket(format!("command body of {} bytes", body.len()))
                    .into_command_failure(),
            );
        }

        let (command_id, terminator_id, done_rx) = {
            let mut shared = lock(&self.shared);
            if !shared.session.state().is_authenticated() {
                return Err(RconError::NotAuthenticated);
            }

            let command_id = self.ids.next();
            let terminator_id = self.ids.next();
            let (done_tx, done_rx) = oneshot::channel();
            shared.pending.insert(
                command_id,
                InFlight {
                    terminator_id,
                    fragments: Vec::new(),
                    done: done_tx,
                },
            );
            shared.by_terminator.insert(terminator_id, command_id);
            (command_id, terminator_id, done_rx)
        };

        // Command first, sentinel second; the write queue preserves
        // program order on the wire.
        let sent = self.send(SourcePacket::command(command_id, body)).await;
        let sent = match sent {
            Ok(()) => self.send(SourcePacket::terminator(terminator_id)).await,
            Err(e) => Err(e),
        };
        if sent.is_err() {
            lock(&self.shared).remove_entry(command_id);
            return Err(RconError::connection_closed().into_command_failure());
        }

        match timeout(self.config.io_timeout, done_rx).await {
            Ok(Ok(Ok(bytes))) => Ok(self.config.payload_encoding.decode(&bytes)),
            Ok(Ok(Err(e))) => Err(e.into_command_failure()),
            Ok(Err(_)) => Err(RconError::connection_closed().into_command_failure()),
            Err(_) => {
                lock(&self.shared).remove_entry(command_id);
                Err(RconError::Timeout(self.config.io_timeout))
            }
        }
    }

    // ── Disconnect ───────────────────────────────────────────────

    /// Tear down the session. Never fails; in-flight requests are
    /// failed with a connection-closed error.
    pub async fn disconnect(&mut self) {
        self.shutdown_io();
        lock(&self.shared).close_session(false);
    }

    // ── Internals ────────────────────────────────────────────────

    /// Resolve `host:port`, restricted to IPv4 when configured.
    ///
    /// The IPv4 restriction defaults on: deployments exist where the
    /// server listens only on IPv4 while DNS prefers IPv6.
    async fn resolve_addr(&self) -> Result<SocketAddr> {
        let mut addrs = lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| RconError::ConnectionFailed(format!("address lookup failed: {e}")))?;

        let addr = if self.config.force_ipv4 {
            addrs.find(SocketAddr::is_ipv4)
        } else {
            addrs.next()
        };
        addr.ok_or_else(|| RconError::ConnectionFailed("no usable server address".to_string()))
    }

    fn spawn_io(&mut self, stream: TcpStream) {
        let framed = Framed::new(stream, SourceCodec);
        let (mut sink, mut source) = framed.split();
        let (writer_tx, mut writer_rx) = mpsc::channel::<SourcePacket>(WRITE_QUEUE_DEPTH);

        let shared = Arc::clone(&self.shared);
        let writer = tokio::spawn(async move {
            while let Some(packet) = writer_rx.recv().await {
                if let Err(e) = sink.send(packet).await {
                    warn!(error = %e, "write failed");
                    lock(&shared).fail_session(e.to_string());
                    break;
                }
            }
        });

        let shared = Arc::clone(&self.shared);
        let packet_trace = self.config.debug;
        let reader = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(packet)) => {
                        if packet_trace {
                            debug!(
                                id = packet.id,
                                packet_type = ?packet.packet_type,
                                len = packet.body.len(),
                                "packet received"
                            );
                        }
                        lock(&shared).dispatch(packet);
                    }
                    Some(Err(e)) => {
                        lock(&shared).fail_session(e.to_string());
                        break;
                    }
                    None => {
                        // Peer closed the stream.
                        lock(&shared).close_session(false);
                        break;
                    }
                }
            }
        });

        self.writer_tx = Some(writer_tx);
        self.tasks = vec![writer, reader];
    }

    async fn send(&self, packet: SourcePacket) -> Result<()> {
        let tx = self
            .writer_tx
            .as_ref()
            .ok_or_else(RconError::connection_closed)?;
        tx.send(packet)
            .await
            .map_err(|_| RconError::connection_closed())
    }

    fn shutdown_io(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.writer_tx = None;
    }
}

impl Drop for SourceClient {
    fn drop(&mut self) {
        self.shutdown_io();
    }
}

// ── Tests ────────────────────────────────────────────────────────
