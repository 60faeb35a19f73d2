//! Replay Server
//!
//! Serves captured JSON-line trade logs over WebSocket. Every client gets the
//! files in order from the start, one message per line, then a normal close.
//!
//! Usage:
//!   replay_server --port 60000 day1.jsonl day2.jsonl

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use trade_relay::config::{DEFAULT_LOG_DIRECTIVES, DEFAULT_PORT};
use trade_relay::error::report_fatal;
use trade_relay::replay::{serve, validate_files};
use trade_relay::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "replay_server")]
#[command(about = "Replay captured trade logs to WebSocket clients")]
struct Args {
    /// TCP port to listen on
    #[arg(long, env = "REPLAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log files, replayed in the given order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing(DEFAULT_LOG_DIRECTIVES);
    let args = Args::parse();

    if let Err(e) = run(args).await {
        report_fatal(&e);
    }
}

async fn run(args: Args) -> Result<()> {
    let files = validate_files(args.files).context("Replay file check failed")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, files).await.context("Replay server error")?;
    Ok(())
}
