//! Latency Report
//!
//! Compares relayed (`udp`) and live-feed (`wss`) arrivals in a
//! `trade_receiver` output file and prints per-market lead statistics.
//!
//! Usage:
//!   trade_receiver --live-feed wss://stream.binance.com:9443/ws/btcusdt@trade --output trades.jsonl
//!   latency_report trades.jsonl --clock monotonic

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use trade_relay::config::DEFAULT_LOG_DIRECTIVES;
use trade_relay::error::report_fatal;
use trade_relay::report::{lead_report, ArrivalClock};
use trade_relay::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "latency_report")]
#[command(about = "Per-market lead of relayed trades over the live feed")]
struct Args {
    /// Receiver output file (JSON lines)
    input: PathBuf,

    /// Arrival clock to compare
    #[arg(long, value_enum, default_value_t = ArrivalClock::Epoch)]
    clock: ArrivalClock,
}

fn main() {
    init_tracing(DEFAULT_LOG_DIRECTIVES);
    let args = Args::parse();

    if let Err(e) = run(args) {
        report_fatal(&e);
    }
}

fn run(args: Args) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let report = lead_report(BufReader::new(file), args.clock)
        .with_context(|| format!("Failed to analyze {}", args.input.display()))?;

    println!("Lead in seconds; positive means the relayed copy arrived first");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
