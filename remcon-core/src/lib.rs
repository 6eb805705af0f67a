//! RCON client library for game-server administration.
//!
//! Two incompatible wire protocols behind one client contract:
//!
//! - **Source RCON** — request/response over TCP with an
//!   authentication handshake and terminator-packet response
//!   correlation (Valve Source engine, Minecraft, and others).
//! - **BattlEye RCON** — UDP datagrams with CRC32 checksums, 8-bit
//!   sequence numbers, acknowledged server-pushed messages, and a
//!   keep-alive heartbeat (DayZ, ARMA).
//!
//! ```no_run
//! use remcon_core::{RconClient, RconConfig};
//!
//! # async fn run() -> remcon_core::Result<()> {
//! let config = RconConfig::source("play.example.org", "hunter2");
//! let mut client = RconClient::source(config);
//! client.connect().await?;
//! let players = client.execute("list").await?;
//! println!("{players}");
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod battleye;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod settings;
pub mod source;
pub mod state;

pub use client::RconClient;
pub use config::{PayloadEncoding, RconConfig, DEFAULT_BATTLEYE_PORT, DEFAULT_SOURCE_PORT};
pub use error::{RconError, Result};
pub use event::{EventBus, RconEvent};
pub use settings::{Protocol, Settings};
pub use state::ConnectionState;

pub use battleye::BattlEyeClient;
pub use source::SourceClient;
