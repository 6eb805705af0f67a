//! Hosted configuration surface.
//!
//! The settings layer is what front ends and credential descriptors
//! expose: protocol, host, port, password, and a single timeout. It is
//! loaded from TOML and mapped 1:1 onto a [`RconConfig`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RconConfig;

// ── Protocol ─────────────────────────────────────────────────────

/// Which wire protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Source,
    BattlEye,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Source => write!(f, "source"),
            Protocol::BattlEye => write!(f, "battleye"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Protocol::Source),
            "battleye" => Ok(Protocol::BattlEye),
            other => Err(format!("unknown protocol '{other}' (source|battleye)")),
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────

/// Connection settings as surfaced to hosted callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wire protocol to speak.
    pub protocol: Protocol,
    /// Server hostname or IP address.
    pub host: String,
    /// Server port; defaults to the protocol's conventional port.
    pub port: Option<u16>,
    /// RCON password.
    pub password: String,
    /// Connect and response timeout in milliseconds.
    pub timeout_ms: u64,
    /// Enable packet-level trace output.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: Protocol::Source,
            host: "127.0.0.1".to_string(),
            port: None,
            password: String::new(),
            timeout_ms: 5000,
            debug: false,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid settings {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no settings at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Map onto the per-client configuration.
    pub fn to_config(&self) -> RconConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        let config = match self.protocol {
            Protocol::Source => RconConfig::source(self.host.clone(), self.password.clone()),
            Protocol::BattlEye => RconConfig::battleye(self.host.clone(), self.password.clone()),
        };
        let config = config
            .with_connect_timeout(timeout)
            .with_io_timeout(timeout)
            .with_debug(self.debug);
        match self.port {
            Some(port) => config.with_port(port),
            None => config,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
