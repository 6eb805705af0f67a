//! Per-client configuration.
//!
//! A [`RconConfig`] is consumed when a client is constructed; the
//! fields are immutable for the lifetime of that client.

use std::time::Duration;

/// Default Source RCON port (Valve convention, also used by Minecraft).
pub const DEFAULT_SOURCE_PORT: u16 = 25575;

/// Default BattlEye RCON port (DayZ convention).
pub const DEFAULT_BATTLEYE_PORT: u16 = 2305;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default per-request response timeout (Source only; BattlEye reuses
/// the connect timeout for every wait).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5000);

// ── PayloadEncoding ──────────────────────────────────────────────

/// Encoding applied to outbound command bodies.
///
/// Source servers expect ASCII; BattlEye servers accept UTF-8.
/// Inbound bodies are always decoded leniently, since ASCII is a
/// subset of UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Ascii,
    Utf8,
}

impl PayloadEncoding {
    /// Encode a command string to body bytes.
    ///
    /// Under [`PayloadEncoding::Ascii`], a command containing
    /// non-ASCII characters is rejected rather than silently mangled.
    pub fn encode(&self, command: &str) -> crate::Result<Vec<u8>> {
        match self {
            PayloadEncoding::Ascii if !command.is_ascii() => Err(
                crate::RconError::InvalidPacket("command body is not ASCII".to_string()),
            ),
            _ => Ok(command.as_bytes().to_vec()),
        }
    }

    /// Decode response body bytes to a string, replacing invalid
    /// sequences rather than failing.
    pub fn decode(&self, body: &[u8]) -> String {
        String::from_utf8_lossy(body).into_owned()
    }
}

// ── RconConfig ───────────────────────────────────────────────────

/// Immutable configuration for one client.
#[derive(Debug, Clone)]
pub struct RconConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// RCON password; may be empty.
    pub password: String,
    /// Deadline for establishing the connection and completing the
    /// authentication handshake.
    pub connect_timeout: Duration,
    /// Deadline for each command response (Source only).
    pub io_timeout: Duration,
    /// Enables packet-level trace output for this client.
    pub debug: bool,
    /// Encoding applied to outbound command bodies.
    pub payload_encoding: PayloadEncoding,
    /// Restrict address resolution to IPv4 (Source only).
    ///
    /// Some servers listen only on IPv4 while DNS prefers IPv6;
    /// defaults to `true` to match observed deployments.
    pub force_ipv4: bool,
}

impl RconConfig {
    /// Configuration for a Source RCON client with protocol defaults.
    pub fn source(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SOURCE_PORT,
            password: password.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            debug: false,
            payload_encoding: PayloadEncoding::Ascii,
            force_ipv4: true,
        }
    }

    /// Configuration for a BattlEye RCON client with protocol defaults.
    pub fn battleye(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_BATTLEYE_PORT,
            password: password.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_CONNECT_TIMEOUT,
            debug: false,
            payload_encoding: PayloadEncoding::Utf8,
            force_ipv4: false,
        }
    }

    /// Override the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-request response timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Enable packet-level trace output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the outbound payload encoding.
    pub fn with_payload_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.payload_encoding = encoding;
        self
    }

    /// Allow IPv6 address resolution.
    pub fn with_force_ipv4(mut self, force: bool) -> Self {
        self.force_ipv4 = force;
        self
    }
}

// ── Tests ────────────────────────────────────────────────────────
