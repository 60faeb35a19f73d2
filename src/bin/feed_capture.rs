//! Feed Capture
//!
//! Records a live WebSocket feed as JSON lines, one message per line, for
//! later use with `replay_server`. Runs until the feed closes or fails.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use trade_relay::config::DEFAULT_LOG_DIRECTIVES;
use trade_relay::error::report_fatal;
use trade_relay::feed::{websocket_source, DEFAULT_FEED_URI};
use trade_relay::relay::{EventLoop, Handler, Payload};
use trade_relay::sink::LineSink;
use trade_relay::telemetry::init_tracing;
use trade_relay::RelayError;

#[derive(Parser, Debug)]
#[command(name = "feed_capture")]
#[command(about = "Capture a live trade feed to a JSON-lines log")]
struct Args {
    /// ws:// or wss:// feed URI
    #[arg(long, env = "CAPTURE_FEED", default_value = DEFAULT_FEED_URI)]
    feed: String,

    /// Output file (appended); stdout when omitted
    #[arg(long, env = "CAPTURE_OUTPUT")]
    output: Option<PathBuf>,
}

struct AppendLines {
    sink: LineSink,
}

#[async_trait]
impl Handler for AppendLines {
    async fn on_ready(&mut self, payload: Payload) -> trade_relay::Result<()> {
        match payload {
            Payload::Text(line) => self.sink.write_line(&line),
            Payload::Datagram(_) => Err(RelayError::MalformedRecord(
                "datagram payload on the capture feed".into(),
            )),
        }
    }
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
    let sink = match &args.output {
        Some(path) => LineSink::open(path)?,
        None => LineSink::stdout(),
    };
    let feed = websocket_source(&args.feed)
        .await
        .with_context(|| format!("Failed to connect to {}", args.feed))?;

    let mut event_loop = EventLoop::new();
    event_loop.register("capture", feed, AppendLines { sink });
    let stats = event_loop.run().await.context("Capture stopped")?;

    info!(lines = stats.dispatched, "Capture finished");
    Ok(())
}
