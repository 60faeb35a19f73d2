//! Authenticated UDP relay
//!
//! - `wire`: fixed 80-byte message layout
//! - `signer`: HMAC-SHA256 signing context
//! - `transport`: bounded UDP send/receive
//! - `event_loop`: multiplexes sources onto per-source handlers
//! - `sender` / `receiver`: the two ends of the relay

pub mod event_loop;
pub mod receiver;
pub mod sender;
pub mod signer;
pub mod transport;
pub mod wire;

pub use event_loop::{EventLoop, Handler, LoopStats, Payload, SourceEvent};
pub use receiver::run_receiver;
pub use sender::run_sender;
pub use signer::SigningContext;
pub use transport::{Datagram, Endpoint, UdpTransport, MAX_DATAGRAM_SIZE};
pub use wire::{Market, TradeRecord, WireMessage, WIRE_MESSAGE_SIZE};
