//! Trade Sender
//!
//! Reads Binance trade events (stdin, a JSON-lines file, or a live
//! WebSocket), signs each one and sends it as an 80-byte UDP datagram.
//!
//! Usage:
//!   trade_sender --destination 10.0.1.100:60000 --feed wss://stream.binance.com:9443/ws/btcusdt@trade
//!   cat trades.jsonl | trade_sender
//!
//! Environment:
//!   SECRET_MESSAGE_KEY - Shared HMAC secret (required, also read from .env)
//!   RELAY_DESTINATION  - Receiver address (default: 127.0.0.1:60000)
//!   RELAY_FEED         - Feed source (default: - for stdin)

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use trade_relay::config::{load_signing_context, DEFAULT_DESTINATION, DEFAULT_LOG_DIRECTIVES};
use trade_relay::error::report_fatal;
use trade_relay::feed::FeedSource;
use trade_relay::relay::{run_sender, Endpoint, UdpTransport};
use trade_relay::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "trade_sender")]
#[command(about = "Sign trade events and relay them over UDP")]
struct Args {
    /// Receiver address (IPv4 host:port)
    #[arg(long, env = "RELAY_DESTINATION", default_value = DEFAULT_DESTINATION)]
    destination: Endpoint,

    /// Feed: `-` for stdin, a JSON-lines file, or a ws:// / wss:// URI
    #[arg(long, env = "RELAY_FEED", default_value = "-")]
    feed: FeedSource,
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
    let transport = UdpTransport::bind(0)
        .await
        .context("Failed to open sending socket")?;
    let feed = args
        .feed
        .open()
        .await
        .with_context(|| format!("Failed to open feed {}", args.feed))?;

    let stats = run_sender(&signer, transport, args.destination, args.feed.tag(), feed)
        .await
        .context("Relay stopped")?;

    info!(dispatched = stats.dispatched, "Feed ended, sender exiting");
    Ok(())
}
