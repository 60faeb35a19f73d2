//! HMAC-SHA256 signing context
//!
//! Built once from the shared secret and passed by reference to whatever
//! signs or verifies. Holds a keyed MAC state that is cloned per message, and
//! an optional window of precomputed tags for a few small integer ids.

use std::fmt;
use std::ops::Range;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::trace;

use super::wire::{Tag, TradeRecord, WireMessage, TAG_SIZE};
use crate::error::{RelayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Capacity of the precomputed id window
pub const MAX_PRECOMPUTED: usize = 3;

pub struct SigningContext {
    mac: HmacSha256,
    id_offset: u64,
    precomputed: [Tag; MAX_PRECOMPUTED],
    num_precomputed: usize,
}

impl SigningContext {
    /// Key the context. An empty key is rejected.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(RelayError::MissingSecret("<empty key>".into()));
        }
        // HMAC accepts keys of any length; the error arm is unreachable for Hmac<Sha256>.
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| RelayError::MissingSecret(format!("HMAC key error: {}", e)))?;
        Ok(Self {
            mac,
            id_offset: 0,
            precomputed: [[0u8; TAG_SIZE]; MAX_PRECOMPUTED],
            num_precomputed: 0,
        })
    }

    /// Tag arbitrary bytes
    pub fn tag(&self, input: &[u8]) -> Tag {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().into()
    }

    /// Constant-time tag check
    pub fn is_valid_tag(&self, input: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(input);
        // verify_slice compares through subtle::ConstantTimeEq
        mac.verify_slice(tag).is_ok()
    }

    /// Encode `record` and append its tag
    pub fn sign(&self, record: &TradeRecord) -> WireMessage {
        let record_bytes = record.encode();
        let tag = self.tag(&record_bytes);
        trace!(trade_id = record.trade_id, tag = %hex::encode(&tag[..4]), "signed trade");
        WireMessage::from_parts(record_bytes, tag)
    }

    /// Check the tag, then decode. The record is only decoded after the tag matches.
    pub fn verify(&self, message: &WireMessage) -> Result<TradeRecord> {
        if !self.is_valid_tag(message.record_bytes(), message.tag()) {
            return Err(RelayError::BadSignature);
        }
        TradeRecord::decode(message.record_bytes())
    }

    /// Tag for a bare identifier (8 little-endian bytes), served from the
    /// precomputed window when `id` falls inside it.
    pub fn hash_id(&self, id: u64) -> Tag {
        if self.precomputed_range().contains(&id) {
            return self.precomputed[(id - self.id_offset) as usize];
        }
        self.tag(&id.to_le_bytes())
    }

    /// Fill the window with tags for `offset .. offset + count`, `count` capped at 3.
    /// Replaces any previous window.
    pub fn precompute_ids(&mut self, offset: u64, count: usize) {
        let count = count.min(MAX_PRECOMPUTED);
        let count = count.min(u64::MAX.saturating_sub(offset) as usize);
        self.num_precomputed = 0;
        for i in 0..count {
            self.precomputed[i] = self.tag(&(offset + i as u64).to_le_bytes());
        }
        self.id_offset = offset;
        self.num_precomputed = count;
    }

    pub fn precomputed_range(&self) -> Range<u64> {
        self.id_offset..self.id_offset + self.num_precomputed as u64
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("key", &"<redacted>")
            .field("precomputed", &self.precomputed_range())
            .finish()
    }
}
