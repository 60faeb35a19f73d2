//! Trade Relay Library
//!
//! Authenticated UDP relay for exchange trade events plus a WebSocket
//! replay server for captured trade logs.
//!
//! - `relay`: wire codec, HMAC signing, UDP transport, event loop, sender/receiver
//! - `feed`: Binance trade decoding and feed sources (stdin, file, WebSocket)
//! - `sink`: JSON-line output of verified trades
//! - `replay`: per-client replay of captured logs
//! - `report`: relay-vs-live-feed lead statistics

pub mod config;
pub mod error;
pub mod feed;
pub mod relay;
pub mod replay;
pub mod report;
pub mod sink;
pub mod telemetry;

pub use error::{RelayError, Result};
