//! Receiving side: verify datagrams, write trades to the sink
//!
//! The UDP source and the optional live feed each get their own handler;
//! both write to one shared [`TradeSink`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::event_loop::{udp_source, EventLoop, Handler, LoopStats, Payload, SourceEvent};
use super::signer::SigningContext;
use super::transport::UdpTransport;
use super::wire::WireMessage;
use crate::error::{RelayError, Result};
use crate::feed::decode_trade_line;
use crate::sink::TradeSink;

pub const UDP_SOURCE_TAG: &str = "udp";
pub const LIVE_FEED_TAG: &str = "wss";

/// Authenticates each datagram before anything downstream sees it.
pub struct VerifyAndRecord<'a> {
    signer: &'a SigningContext,
    sink: Arc<Mutex<TradeSink>>,
}

impl<'a> VerifyAndRecord<'a> {
    pub fn new(signer: &'a SigningContext, sink: Arc<Mutex<TradeSink>>) -> Self {
        Self { signer, sink }
    }
}

#[async_trait]
impl<'a> Handler for VerifyAndRecord<'a> {
    async fn on_ready(&mut self, payload: Payload) -> Result<()> {
        let datagram = match payload {
            Payload::Datagram(d) => d,
            Payload::Text(_) => {
                return Err(RelayError::MalformedRecord(
                    "text payload on the datagram source".into(),
                ))
            }
        };
        let message = WireMessage::from_slice(&datagram.bytes)?;
        let record = self.signer.verify(&message)?;
        debug!(trade_id = record.trade_id, from = %datagram.from, "verified trade");
        self.sink.lock().write_trade(&record, UDP_SOURCE_TAG)
    }
}

/// Records trades straight from a live feed, for latency comparison.
pub struct LiveFeedRecorder {
    sink: Arc<Mutex<TradeSink>>,
}

impl LiveFeedRecorder {
    pub fn new(sink: Arc<Mutex<TradeSink>>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Handler for LiveFeedRecorder {
    async fn on_ready(&mut self, payload: Payload) -> Result<()> {
        let Payload::Text(line) = payload else {
            return Err(RelayError::MalformedRecord(
                "datagram payload on the live feed".into(),
            ));
        };
        match decode_trade_line(&line)? {
            Some(record) => self.sink.lock().write_trade(&record, LIVE_FEED_TAG),
            None => Ok(()),
        }
    }
}

/// Receive, verify and record until a fatal error. Returns only if every
/// source ends, which the UDP source never does on its own.
pub async fn run_receiver(
    signer: &SigningContext,
    transport: UdpTransport,
    live_feed: Option<BoxStream<'static, SourceEvent>>,
    sink: TradeSink,
) -> Result<LoopStats> {
    let sink = Arc::new(Mutex::new(sink));
    let mut event_loop = EventLoop::new();

    event_loop.register(
        UDP_SOURCE_TAG,
        udp_source(transport),
        VerifyAndRecord::new(signer, sink.clone()),
    );
    if let Some(feed) = live_feed {
        info!("Recording live feed alongside relayed trades");
        event_loop.register(LIVE_FEED_TAG, feed, LiveFeedRecorder::new(sink));
    }

    event_loop.run().await
}
