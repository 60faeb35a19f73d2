//! Wire Protocol for Relayed Trades
//!
//! Fixed 80-byte datagram: a 48-byte trade record image followed by a
//! 32-byte HMAC-SHA256 tag over those 48 bytes.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{RelayError, Result};

/// HMAC-SHA256 output size
pub const TAG_SIZE: usize = 32;

/// Market identifier storage: up to 15 bytes plus a NUL terminator
pub const MARKET_CAPACITY: usize = 16;

/// Encoded trade record size
/// 8+8+8+8+16 = 48 bytes
pub const RECORD_SIZE: usize = 48;

/// Total datagram size
pub const WIRE_MESSAGE_SIZE: usize = RECORD_SIZE + TAG_SIZE;

pub type Tag = [u8; TAG_SIZE];

/// Bounded exchange market identifier (e.g. "BTCUSDT")
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Market {
    bytes: [u8; MARKET_CAPACITY],
    len: u8,
}

impl Market {
    /// Longest identifier that still leaves room for the terminator
    pub const MAX_LEN: usize = MARKET_CAPACITY - 1;

    /// Returns `None` if `s` is longer than 15 bytes or contains NUL.
    pub fn new(s: &str) -> Option<Self> {
        if s.len() > Self::MAX_LEN || s.bytes().any(|b| b == 0) {
            return None;
        }
        let mut bytes = [0u8; MARKET_CAPACITY];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self {
            bytes,
            len: s.len() as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        // Constructed only from &str or validated UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    fn to_padded(self) -> [u8; MARKET_CAPACITY] {
        self.bytes
    }

    fn from_padded(buf: &[u8]) -> Result<Self> {
        let len = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RelayError::MalformedRecord("market is not NUL terminated".into()))?;
        if buf[len..].iter().any(|&b| b != 0) {
            return Err(RelayError::MalformedRecord(
                "market padding is not zeroed".into(),
            ));
        }
        let s = std::str::from_utf8(&buf[..len])
            .map_err(|e| RelayError::MalformedRecord(format!("market is not UTF-8: {}", e)))?;
        Market::new(s).ok_or_else(|| RelayError::MalformedRecord(format!("bad market {:?}", s)))
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Market({:?})", self.as_str())
    }
}

impl Serialize for Market {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single exchange trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeRecord {
    pub price: f64,
    pub quantity: f64,
    /// Increasing per source, not globally ordered
    pub trade_id: u64,
    /// Exchange trade time, epoch millis
    pub trade_time: u64,
    pub market: Market,
}

impl TradeRecord {
    /// Encode to the fixed record layout.
    ///
    /// Layout (all fields little-endian):
    /// ```text
    /// Offset  Size  Field
    /// 0       8     price (f64 bits)
    /// 8       8     quantity (f64 bits)
    /// 16      8     trade_id
    /// 24      8     trade_time (ms)
    /// 32      16    market (NUL padded, byte 47 always 0)
    /// Total: 48 bytes
    /// ```
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.price.to_bits().to_le_bytes());
        buf[8..16].copy_from_slice(&self.quantity.to_bits().to_le_bytes());
        buf[16..24].copy_from_slice(&self.trade_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.trade_time.to_le_bytes());
        buf[32..48].copy_from_slice(&self.market.to_padded());
        buf
    }

    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Result<Self> {
        Ok(Self {
            price: f64::from_bits(read_u64(buf, 0)),
            quantity: f64::from_bits(read_u64(buf, 8)),
            trade_id: read_u64(buf, 16),
            trade_time: read_u64(buf, 24),
            market: Market::from_padded(&buf[32..48])?,
        })
    }
}

#[inline]
fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(word)
}

/// Signed datagram: record image + tag
#[derive(Clone, PartialEq, Eq)]
pub struct WireMessage {
    record: [u8; RECORD_SIZE],
    tag: Tag,
}

impl WireMessage {
    pub(crate) fn from_parts(record: [u8; RECORD_SIZE], tag: Tag) -> Self {
        Self { record, tag }
    }

    /// Wrap a received datagram; any length other than 80 is a protocol violation.
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        if buf.len() != WIRE_MESSAGE_SIZE {
            return Err(RelayError::WireSize {
                actual: buf.len(),
                expected: WIRE_MESSAGE_SIZE,
            });
        }
        let mut record = [0u8; RECORD_SIZE];
        let mut tag = [0u8; TAG_SIZE];
        record.copy_from_slice(&buf[..RECORD_SIZE]);
        tag.copy_from_slice(&buf[RECORD_SIZE..]);
        Ok(Self { record, tag })
    }

    /// Serialize to datagram bytes
    pub fn to_bytes(&self) -> [u8; WIRE_MESSAGE_SIZE] {
        let mut buf = [0u8; WIRE_MESSAGE_SIZE];
        buf[..RECORD_SIZE].copy_from_slice(&self.record);
        buf[RECORD_SIZE..].copy_from_slice(&self.tag);
        buf
    }

    pub fn record_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.record
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

impl fmt::Debug for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireMessage")
            .field("record", &hex::encode(self.record_bytes()))
            .field("tag", &hex::encode(self.tag()))
            .finish()
    }
}
