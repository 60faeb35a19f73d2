//! Binance trade stream decoding
//!
//! Accepts raw `<symbol>@trade` events and the combined-stream envelope
//! (`{"stream":"btcusdt@trade","data":{...}}`).

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{RelayError, Result};
use crate::relay::wire::{Market, TradeRecord};

/// Raw trade event:
/// `{"e":"trade","E":..,"s":"BTCUSDT","t":12345,"p":"0.001","q":"100","T":..,"m":true}`
#[derive(Debug, Clone, Deserialize)]
struct RawTrade {
    #[serde(rename = "p", deserialize_with = "deserialize_number_or_string")]
    price: f64,
    #[serde(rename = "q", deserialize_with = "deserialize_number_or_string")]
    quantity: f64,
    #[serde(rename = "t")]
    trade_id: u64,
    #[serde(rename = "T")]
    trade_time: u64,
    #[serde(rename = "s")]
    symbol: String,
}

/// Decode one feed line.
///
/// `Ok(None)` for blank lines, non-trade events, and symbols that do not fit
/// the wire market field. Unparseable JSON, a missing event type, a trade
/// with missing fields, or a non-finite price or quantity is an error.
pub fn decode_trade_line(line: &str) -> Result<Option<TradeRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(line)
        .map_err(|e| RelayError::MalformedRecord(format!("{} in {:?}", e, truncate(line))))?;

    if value.get("data").map_or(false, Value::is_object) {
        let data = value["data"].take();
        value = data;
    }

    match value.get("e").and_then(Value::as_str) {
        Some("trade") => {}
        Some(_) => return Ok(None),
        None => {
            return Err(RelayError::MalformedRecord(format!(
                "no trade event type in {:?}",
                truncate(line)
            )))
        }
    }

    let raw: RawTrade = serde_json::from_value(value)
        .map_err(|e| RelayError::MalformedRecord(format!("{} in {:?}", e, truncate(line))))?;

    if !raw.price.is_finite() || !raw.quantity.is_finite() {
        return Err(RelayError::MalformedRecord(format!(
            "non-finite price {} or quantity {} in {:?}",
            raw.price,
            raw.quantity,
            truncate(line)
        )));
    }

    let Some(market) = Market::new(&raw.symbol) else {
        warn!(symbol = %raw.symbol, "market symbol exceeds {} bytes, skipping", Market::MAX_LEN);
        return Ok(None);
    };

    Ok(Some(TradeRecord {
        price: raw.price,
        quantity: raw.quantity,
        trade_id: raw.trade_id,
        trade_time: raw.trade_time,
        market,
    }))
}

fn truncate(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Deserialize a number that may come as a string or number.
fn deserialize_number_or_string<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}
