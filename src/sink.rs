//! Trade output
//!
//! [`TradeSink`] writes verified trades; [`LineSink`] appends raw feed
//! messages for the capture tool.
//!
//! Trades are one JSON object per line, stamped with three arrival clocks
//! for latency analysis:
//! `{"price":..,"quantity":..,"tradeId":..,"tradeTime":..,"market":"..",
//!   "epochNanos":..,"rawMonotonicNanos":..,"monotonicNanos":..,"source":"udp"}`

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{RelayError, Result};
use crate::relay::wire::{Market, TradeRecord};

/// Clock readings taken when a record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalTimestamps {
    pub epoch_nanos: u64,
    pub raw_monotonic_nanos: u64,
    pub monotonic_nanos: u64,
}

impl ArrivalTimestamps {
    pub fn now() -> Self {
        Self {
            epoch_nanos: chrono::Utc::now()
                .timestamp_nanos_opt()
                .map(|n| n.max(0) as u64)
                .unwrap_or_default(),
            raw_monotonic_nanos: clock_nanos(RAW_MONOTONIC_CLOCK),
            monotonic_nanos: clock_nanos(libc::CLOCK_MONOTONIC),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
const RAW_MONOTONIC_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC_RAW;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
const RAW_MONOTONIC_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;

fn clock_nanos(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputLine<'a> {
    price: f64,
    quantity: f64,
    trade_id: u64,
    trade_time: u64,
    market: &'a Market,
    epoch_nanos: u64,
    raw_monotonic_nanos: u64,
    monotonic_nanos: u64,
    source: &'a str,
}

pub struct TradeSink {
    out: BufWriter<Box<dyn Write + Send>>,
    written: u64,
}

impl TradeSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Append to `path`, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_writer(open_append(path)?))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: BufWriter::new(Box::new(writer)),
            written: 0,
        }
    }

    pub fn write_trade(&mut self, trade: &TradeRecord, source: &str) -> Result<()> {
        self.write_trade_at(trade, source, ArrivalTimestamps::now())
    }

    pub fn write_trade_at(
        &mut self,
        trade: &TradeRecord,
        source: &str,
        at: ArrivalTimestamps,
    ) -> Result<()> {
        let line = OutputLine {
            price: trade.price,
            quantity: trade.quantity,
            trade_id: trade.trade_id,
            trade_time: trade.trade_time,
            market: &trade.market,
            epoch_nanos: at.epoch_nanos,
            raw_monotonic_nanos: at.raw_monotonic_nanos,
            monotonic_nanos: at.monotonic_nanos,
            source,
        };
        serde_json::to_writer(&mut self.out, &line).map_err(io::Error::from)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.written
    }
}

/// Unparsed feed messages, one per line, as captured for replay
pub struct LineSink {
    out: BufWriter<Box<dyn Write + Send>>,
    written: u64,
}

impl LineSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_writer(open_append(path)?))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: BufWriter::new(Box::new(writer)),
            written: 0,
        }
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.written
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|error| RelayError::Unreadable {
            path: path.display().to_string(),
            error,
        })
}
