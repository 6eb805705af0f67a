//! Error types for the RCON client library.
//!
//! All fallible operations return `Result<T, RconError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for RCON operations.
#[derive(Debug, Error)]
pub enum RconError {
    // ── Transport ────────────────────────────────────────────────
    /// The transport refused, reset, or closed the connection before
    /// or during use.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The underlying socket surfaced an error after the session
    /// became active.
    #[error("socket error: {0}")]
    SocketError(#[from] std::io::Error),

    /// A configured timer elapsed (connect, io, or command).
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    // ── Protocol ─────────────────────────────────────────────────
    /// Wire-level authentication was rejected by the server.
    ///
    /// Source: the server answered with `id == -1`. BattlEye: the
    /// login response carried a result other than `0x01`.
    #[error("authentication rejected by server")]
    AuthFailed,

    /// An outbound or inbound packet violates size or shape invariants.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    // ── API misuse ───────────────────────────────────────────────
    /// `execute` was called while the session was not authenticated.
    #[error("client is not authenticated")]
    NotAuthenticated,

    /// A command failed for a reason other than timeout or socket
    /// loss; the underlying error is preserved.
    #[error("command failed: {0}")]
    CommandFailed(#[source] Box<RconError>),
}

/// Type alias for results using [`RconError`].
pub type Result<T> = std::result::Result<T, RconError>;

impl RconError {
    /// Shared failure used when tearing down in-flight requests on
    /// disconnect or socket loss.
    pub(crate) fn connection_closed() -> Self {
        RconError::ConnectionFailed("connection closed".to_string())
    }

    /// Wrap an error surfacing from within `execute`.
    ///
    /// `NotAuthenticated`, `Timeout`, and `SocketError` pass through
    /// unchanged; everything else is wrapped in `CommandFailed` so the
    /// caller can tell a failed command apart from a failed session.
    pub(crate) fn into_command_failure(self) -> Self {
        match self {
            RconError::NotAuthenticated
            | RconError::Timeout(_)
            | RconError::SocketError(_)
            | RconError::CommandFailed(_) => self,
            other => RconError::CommandFailed(Box::new(other)),
        }
    }
}
