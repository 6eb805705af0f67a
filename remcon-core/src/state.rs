//! Session lifecycle state machine shared by both protocol engines.
//!
//! Models the full lifecycle of an RCON session with a one-way path
//! per connection:
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected ──► Authenticating ──► Authenticated
//!       ▲               │              │               │                  │
//!       │               ▼              ▼               ▼                  ▼
//!       └───────────────┴──────────────┴───────── Error ──────────────────┘
//! ```
//!
//! Teardown from any active state returns to `Disconnected`; there is
//! no path out of `Error` except teardown. An illegal transition is a
//! programmer error, not a runtime event, and trips a debug assertion.

use std::fmt;

// ── ConnectionState ──────────────────────────────────────────────

/// The current phase of an RCON session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No active connection. Initial, and terminal after teardown.
    #[default]
    Disconnected,

    /// Socket connection initiated but not yet established.
    Connecting,

    /// Transport is up; the authentication handshake has not started.
    Connected,

    /// Authentication request sent, awaiting the server's verdict.
    Authenticating,

    /// Handshake complete; `execute` is accepted.
    Authenticated,

    /// The session failed; only teardown leads out of this state.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Authenticating => "Authenticating",
            Self::Authenticated => "Authenticated",
            Self::Error => "Error",
        };
        write!(f, "{name}")
    }
}

impl ConnectionState {
    /// Returns `true` when `execute` is allowed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` when the session holds no live socket.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` when a socket exists in some stage of use.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Error)
    }

    /// Whether a transition from `self` to `next` follows the lifecycle.
    ///
    /// Pure predicate so the transition table can be tested without a
    /// client. Any active state may fall into `Error`, and any state
    /// except `Disconnected` may be torn down to `Disconnected`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Authenticating) => true,
            (Authenticating, Authenticated) => true,
            (s, Error) if s.is_active() => true,
            (s, Disconnected) if !s.is_disconnected() => true,
            _ => false,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Owns the current state and performs validated transitions.
///
/// The engines keep one `Session` inside their shared critical section;
/// every transition is reported back to the caller as a `(new, old)`
/// pair so the engine can emit the matching `state_change` event.
#[derive(Debug, Default)]
pub struct Session {
    state: ConnectionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transition to `next`, returning `(new, old)`.
    ///
    /// Transitions only ever move forward along the lifecycle; an
    /// illegal transition indicates a bug in the engine, not bad input.
    pub fn transition(&mut self, next: ConnectionState) -> (ConnectionState, ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal state transition {} -> {next}",
            self.state,
        );
        let old = self.state;
        self.state = next;
        (next, old)
    }
}

// ── Tests ────────────────────────────────────────────────────────
