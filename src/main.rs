//! chatrelay binary
//!
//! Wires the relay to a line-delimited JSON transport on stdin/stdout for a
//! single connection. The production transport (WebSocket server, auth,
//! health endpoint) is an external collaborator; this harness exercises the
//! same [`DeliveryChannel`] and event surface it would use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use clap::Parser;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::Mutex;
use tracing::{info, warn};

use chatrelay::channel::{ChannelError, ClientEvent, DeliveryChannel, ServerEvent};
use chatrelay::cli::Cli;
use chatrelay::config::Config;
use chatrelay::relay::Relay;

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

/// Delivery channel writing server events as JSON lines to stdout
struct StdioChannel {
    connected: AtomicBool,
    stdout: Mutex<Stdout>,
}

impl StdioChannel {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryChannel for StdioChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, event: ServerEvent) -> Result<(), ChannelError> {
        let mut line = serde_json::to_string(&event).map_err(|_| ChannelError)?;
        line.push('\n');

        let mut stdout = self.stdout.lock().await;
        stdout.write_all(line.as_bytes()).await.map_err(|_| ChannelError)?;
        stdout.flush().await.map_err(|_| ChannelError)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let relay = Relay::from_config(&config);

    let health = relay.health().await;
    info!(
        port = config.port,
        ai_enabled = health.ai_enabled,
        "chatrelay started (stdio transport)"
    );

    let channel = Arc::new(StdioChannel::new());
    let handle = relay.connect("stdio", channel.clone()).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ClientEvent>(&line) {
            Ok(event) => {
                if handle.client_event(event).await.is_err() {
                    // Actor terminated (end_chat); nothing left to drive.
                    break;
                }
            }
            Err(e) => warn!(error = %e, "unparseable client event"),
        }
    }

    // Stdin closed: treat as a transport disconnect.
    channel.close();
    let _ = handle.disconnect().await;

    info!("chatrelay stopped");
    Ok(())
}
