//! Trade Receiver
//!
//! Listens for signed trade datagrams, verifies every one and writes the
//! trades as JSON lines. Optionally records a live feed next to them so the
//! two paths can be compared.
//!
//! Environment:
//!   SECRET_MESSAGE_KEY - Shared HMAC secret (required, also read from .env)
//!   RELAY_PORT         - UDP listen port (default: 60000)
//!   RELAY_OUTPUT       - Output file, appended (default: stdout)
//!   RELAY_LIVE_FEED    - Optional ws:// or wss:// feed tagged "wss"

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use trade_relay::config::{load_signing_context, DEFAULT_LOG_DIRECTIVES, DEFAULT_PORT};
use trade_relay::error::report_fatal;
use trade_relay::feed::websocket_source;
use trade_relay::relay::{run_receiver, UdpTransport};
use trade_relay::sink::TradeSink;
use trade_relay::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "trade_receiver")]
#[command(about = "Verify relayed trades and write them as JSON lines")]
struct Args {
    /// UDP port to listen on
    #[arg(long, env = "RELAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Output file (appended); stdout when omitted
    #[arg(long, env = "RELAY_OUTPUT")]
    output: Option<PathBuf>,

    /// Live WebSocket feed to record alongside relayed trades
    #[arg(long, env = "RELAY_LIVE_FEED")]
    live_feed: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing(DEFAULT_LOG_DIRECTIVES);
    let args = Args::parse();

    if let Err(e) = run(args).await {
        report_fatal(&e);
    }
}

async fn run(args: Args) -> Result<()> {
    let signer = load_signing_context().context("Failed to load signing key")?;
    let transport = UdpTransport::bind(args.port)
        .await
        .context("Failed to bind receiver socket")?;

    let sink = match &args.output {
        Some(path) => {
            info!("Writing trades to {}", path.display());
            TradeSink::open(path)?
        }
        None => TradeSink::stdout(),
    };

    let live_feed = match &args.live_feed {
        Some(uri) if uri.starts_with("ws://") || uri.starts_with("wss://") => Some(
            websocket_source(uri)
                .await
                .with_context(|| format!("Failed to connect to {}", uri))?,
        ),
        Some(uri) => bail!("live feed must be a ws:// or wss:// URI, got {:?}", uri),
        None => None,
    };

    let stats = run_receiver(&signer, transport, live_feed, sink)
        .await
        .context("Receiver stopped")?;

    info!(dispatched = stats.dispatched, "All sources ended, receiver exiting");
    Ok(())
}
