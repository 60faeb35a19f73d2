//! Upstream trade feeds

pub mod binance;
pub mod source;

pub use binance::decode_trade_line;
pub use source::{line_source, websocket_source, FeedSource, DEFAULT_FEED_URI};
