//! Console Entrypoint for the Neuro Link Client
//!
//! This binary stands in for the game's dialog pipeline. It is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Initializing logging.
//! 3. Wiring the console as the chat-delivery target and notification observer.
//! 4. Relaying stdin lines to the Neuro service until shutdown.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use neuro_link_client::{
    NeuroClient,
    config::{Config, validate_endpoint},
};
use neuro_link_core::ChatDelivery;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Relay chat between the console and a Neuro service")]
struct Args {
    /// WebSocket endpoint, overrides NEURO_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    /// Chat user id, overrides NEURO_USER_ID.
    #[arg(long)]
    user_id: Option<String>,
    /// Wait for `/connect` instead of connecting on startup.
    #[arg(long)]
    no_auto_connect: bool,
}

/// Prints chat responses to stdout.
struct ConsoleDelivery;

#[async_trait]
impl ChatDelivery for ConsoleDelivery {
    async fn deliver(&self, text: &str) -> anyhow::Result<()> {
        println!("neuro> {}", text);
        Ok(())
    }
}

const HELP: &str = "commands: /connect /disconnect /reconnect on|off /status /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(endpoint) = args.endpoint {
        validate_endpoint(&endpoint)
            .map_err(anyhow::Error::msg)
            .context("Invalid --endpoint")?;
        config.endpoint = endpoint;
    }
    if let Some(user_id) = args.user_id {
        anyhow::ensure!(!user_id.trim().is_empty(), "--user-id must not be blank");
        config.user_id = user_id;
    }
    if args.no_auto_connect {
        config.auto_connect = false;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(
        endpoint = %config.endpoint,
        user_id = %config.user_id,
        auto_reconnect = config.auto_reconnect,
        "Configuration loaded."
    );

    // --- 3. Wire Collaborators ---
    let auto_connect = config.auto_connect;
    let client = NeuroClient::new(config, Arc::new(ConsoleDelivery));
    client
        .notifications()
        .on_connected(|| eprintln!("[connected]"));
    client
        .notifications()
        .on_disconnected(|| eprintln!("[disconnected]"));

    if auto_connect {
        if let Err(e) = client.connect().await {
            warn!(error = %e, "Initial connection failed");
        }
    }

    // --- 4. Relay Console Input ---
    eprintln!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal.");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "/quit" => break,
            "/connect" => {
                if let Err(e) = client.connect().await {
                    warn!(error = %e, "Connection failed");
                }
            }
            "/disconnect" => client.disconnect().await,
            "/reconnect on" => client.enable_reconnecting(),
            "/reconnect off" => client.stop_reconnecting(),
            "/status" => eprintln!(
                "state={} reconnect={} reconnects_scheduled={}",
                client.state(),
                client.reconnect_enabled(),
                client.reconnects_scheduled()
            ),
            cmd if cmd.starts_with('/') => eprintln!("{}", HELP),
            text => {
                if let Err(e) = client.send_chat(text).await {
                    error!(error = %e, "Chat message not sent");
                }
            }
        }
    }

    client.shutdown().await;
    info!("Client has shut down.");
    Ok(())
}
