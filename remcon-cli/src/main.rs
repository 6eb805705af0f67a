//! remcon — interactive RCON console.
//!
//! ```text
//! remcon --host play.example.org --password hunter2       Source server
//! remcon --protocol battleye --host 198.51.100.7 ...      BattlEye server
//! remcon --config remcon.toml                             Load settings TOML
//! remcon --gen-config                                     Print default settings
//! ```
//!
//! Reads commands from stdin, one per line, and prints each response.
//! Server-pushed messages and lifecycle events are printed as they
//! arrive. `quit`, `exit`, or EOF disconnects cleanly.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use remcon_core::{Protocol, RconClient, RconEvent, Settings};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "remcon", about = "Interactive RCON console for game servers")]
struct Cli {
    /// Path to a settings TOML file.
    #[arg(short, long, default_value = "remcon.toml")]
    config: PathBuf,

    /// Print the default settings to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Wire protocol: source or battleye.
    #[arg(short = 'P', long)]
    protocol: Option<Protocol>,

    /// Server hostname or IP address.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port (defaults to the protocol's conventional port).
    #[arg(short, long)]
    port: Option<u16>,

    /// RCON password.
    #[arg(short = 'w', long)]
    password: Option<String>,

    /// Connect and response timeout in milliseconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Enable packet-level trace output.
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    /// Settings from file, overridden by whatever was given on the
    /// command line.
    fn settings(&self) -> Settings {
        let mut settings = Settings::load(&self.config);
        if let Some(protocol) = self.protocol {
            settings.protocol = protocol;
        }
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if self.port.is_some() {
            settings.port = self.port;
        }
        if let Some(password) = &self.password {
            settings.password = password.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_ms = timeout;
        }
        if self.debug {
            settings.debug = true;
        }
        settings
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&Settings::default())?;
        println!("{text}");
        return Ok(());
    }

    let default_filter = if cli.debug { "remcon_core=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings();
    let mut client = RconClient::from_settings(&settings);

    // Relay server messages and lifecycle events to the terminal.
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RconEvent::ServerMessage(text) => println!("<< {text}"),
                RconEvent::Error(message) => eprintln!("!! socket error: {message}"),
                RconEvent::Close { had_error: true } => {
                    eprintln!("!! connection closed after error")
                }
                _ => {}
            }
        }
    });

    println!(
        "connecting to {}:{} ({})...",
        settings.host,
        settings.port.unwrap_or_else(|| default_port(settings.protocol)),
        settings.protocol,
    );
    client.connect().await?;
    println!("authenticated. Type commands; 'quit' to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let command = match line.as_deref().map(str::trim) {
            None | Some("quit") | Some("exit") => break,
            Some("") => continue,
            Some(command) => command.to_string(),
        };

        match client.execute(&command).await {
            Ok(response) if response.is_empty() => println!("(no output)"),
            Ok(response) => println!("{response}"),
            Err(e) => {
                warn!(command, error = %e, "command failed");
                eprintln!("error: {e}");
                // A dead session cannot recover without reconnecting.
                if !client.is_authenticated() {
                    break;
                }
            }
        }
    }

    client.disconnect().await;
    println!("disconnected.");
    Ok(())
}

fn default_port(protocol: Protocol) -> u16 {
    match protocol {
        Protocol::Source => remcon_core::DEFAULT_SOURCE_PORT,
        Protocol::BattlEye => remcon_core::DEFAULT_BATTLEYE_PORT,
    }
}
