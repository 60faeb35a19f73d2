//! Relay lead analysis
//!
//! Matches the receiver's `udp` and `wss` output lines by market and trade
//! id and summarizes, per market, how far the relayed copy arrived ahead of
//! the live feed. Positive leads mean the relay was first.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::relay::receiver::{LIVE_FEED_TAG, UDP_SOURCE_TAG};

/// Which arrival clock to compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ArrivalClock {
    #[default]
    Epoch,
    RawMonotonic,
    Monotonic,
}

/// The fields of one receiver output line that matter here
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedTrade {
    pub trade_id: u64,
    pub market: String,
    pub epoch_nanos: u64,
    pub raw_monotonic_nanos: u64,
    pub monotonic_nanos: u64,
    pub source: String,
}

impl RecordedTrade {
    fn arrival(&self, clock: ArrivalClock) -> u64 {
        match clock {
            ArrivalClock::Epoch => self.epoch_nanos,
            ArrivalClock::RawMonotonic => self.raw_monotonic_nanos,
            ArrivalClock::Monotonic => self.monotonic_nanos,
        }
    }
}

/// Lead summary in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

impl LeadStats {
    /// `None` for an empty sample
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

        Some(Self {
            mean,
            median,
            min: sorted[0],
            max: sorted[n - 1],
            std: variance.sqrt(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketLead {
    pub matched: usize,
    /// Trades seen on the live feed that never arrived over UDP
    pub live_only: usize,
    /// Trades relayed over UDP that the live feed never showed
    pub relay_only: usize,
    pub lead_seconds: Option<LeadStats>,
}

type ArrivalsByMarket = HashMap<String, HashMap<u64, u64>>;

fn record_arrival(
    arrivals: &mut ArrivalsByMarket,
    trade: &RecordedTrade,
    clock: ArrivalClock,
) -> Result<()> {
    let by_id = arrivals.entry(trade.market.clone()).or_default();
    if by_id.insert(trade.trade_id, trade.arrival(clock)).is_some() {
        return Err(RelayError::MalformedRecord(format!(
            "duplicate {} trade {} for {}",
            trade.source, trade.trade_id, trade.market
        )));
    }
    Ok(())
}

/// Build the per-market report from receiver output. Lines that are not
/// JSON trade records are skipped; a trade id repeated within one source is
/// an error.
pub fn lead_report<R: BufRead>(
    input: R,
    clock: ArrivalClock,
) -> Result<BTreeMap<String, MarketLead>> {
    let mut relayed = ArrivalsByMarket::new();
    let mut live = ArrivalsByMarket::new();
    let mut skipped = 0u64;

    for line in input.lines() {
        let line = line?;
        let trade: RecordedTrade = match serde_json::from_str(&line) {
            Ok(trade) => trade,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        match trade.source.as_str() {
            UDP_SOURCE_TAG => record_arrival(&mut relayed, &trade, clock)?,
            LIVE_FEED_TAG => record_arrival(&mut live, &trade, clock)?,
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "ignored lines that are not udp/wss trade records");
    }

    let mut report = BTreeMap::new();
    for (market, live_arrivals) in &live {
        let relay_arrivals = relayed.get(market);
        let leads: Vec<f64> = live_arrivals
            .iter()
            .filter_map(|(id, live_at)| {
                let relay_at = relay_arrivals?.get(id)?;
                Some((*live_at as i128 - *relay_at as i128) as f64 / 1e9)
            })
            .collect();
        let relay_count = relay_arrivals.map_or(0, HashMap::len);

        report.insert(
            market.clone(),
            MarketLead {
                matched: leads.len(),
                live_only: live_arrivals.len() - leads.len(),
                relay_only: relay_count - leads.len(),
                lead_seconds: LeadStats::from_samples(&leads),
            },
        );
    }
    for (market, relay_arrivals) in &relayed {
        report.entry(market.clone()).or_insert(MarketLead {
            matched: 0,
            live_only: 0,
            relay_only: relay_arrivals.len(),
            lead_seconds: None,
        });
    }
    Ok(report)
}
