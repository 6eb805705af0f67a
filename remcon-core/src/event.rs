//! Lifecycle and protocol events delivered to subscribers.
//!
//! Events are relayed over `tokio::sync::mpsc` unbounded channels, one
//! receiver per subscriber. Emission never blocks the engine; a dropped
//! receiver simply unsubscribes itself.

use tokio::sync::mpsc;

use crate::state::ConnectionState;

// ── RconEvent ────────────────────────────────────────────────────

/// Events emitted by a client over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconEvent {
    /// The session moved to a new lifecycle state.
    StateChange {
        new: ConnectionState,
        old: ConnectionState,
    },

    /// Authentication completed; `execute` is now accepted.
    Authenticated,

    /// The session was torn down and the socket released.
    Disconnected,

    /// The underlying socket closed.
    Close { had_error: bool },

    /// An asynchronous socket-level error surfaced.
    Error(String),

    /// The server pushed an out-of-band message (BattlEye only).
    ServerMessage(String),
}

// ── EventBus ─────────────────────────────────────────────────────

/// Fan-out registry for [`RconEvent`] subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<RconEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving half.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RconEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    ///
    /// Subscribers whose receiver has been dropped are pruned here.
    pub fn emit(&mut self, event: RconEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────
