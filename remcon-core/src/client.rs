//! Protocol-independent client wrapper.
//!
//! Both engines expose the same contract; [`RconClient`] dispatches to
//! whichever one the settings selected so callers can stay agnostic.

use tokio::sync::mpsc;

use crate::battleye::BattlEyeClient;
use crate::config::RconConfig;
use crate::error::Result;
use crate::event::RconEvent;
use crate::settings::{Protocol, Settings};
use crate::source::SourceClient;
use crate::state::ConnectionState;

/// An RCON client speaking either protocol behind one surface.
pub enum RconClient {
    Source(SourceClient),
    BattlEye(BattlEyeClient),
}

impl RconClient {
    /// Build a client from hosted settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let config = settings.to_config();
        match settings.protocol {
            Protocol::Source => RconClient::Source(SourceClient::new(config)),
            Protocol::BattlEye => RconClient::BattlEye(BattlEyeClient::new(config)),
        }
    }

    /// Build a Source client from a raw configuration.
    pub fn source(config: RconConfig) -> Self {
        RconClient::Source(SourceClient::new(config))
    }

    /// Build a BattlEye client from a raw configuration.
    pub fn battleye(config: RconConfig) -> Self {
        RconClient::BattlEye(BattlEyeClient::new(config))
    }

    /// Connect and authenticate.
    pub async fn connect(&mut self) -> Result<()> {
        match self {
            RconClient::Source(client) => client.connect().await,
            RconClient::BattlEye(client) => client.connect().await,
        }
    }

    /// Run a command and return its response.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        match self {
            RconClient::Source(client) => client.execute(command).await,
            RconClient::BattlEye(client) => client.execute(command).await,
        }
    }

    /// Tear down the session. Never fails.
    pub async fn disconnect(&mut self) {
        match self {
            RconClient::Source(client) => client.disconnect().await,
            RconClient::BattlEye(client) => client.disconnect().await,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self {
            RconClient::Source(client) => client.state(),
            RconClient::BattlEye(client) => client.state(),
        }
    }

    /// Whether `execute` is currently accepted.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Number of in-flight requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        match self {
            RconClient::Source(client) => client.pending_requests(),
            RconClient::BattlEye(client) => client.pending_requests(),
        }
    }

    /// Register a lifecycle event subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RconEvent> {
        match self {
            RconClient::Source(client) => client.subscribe(),
            RconClient::BattlEye(client) => client.subscribe(),
        }
    }
}
