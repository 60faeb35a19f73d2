//! Sending side: feed lines in, signed datagrams out

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tracing::{debug, info};

use super::event_loop::{EventLoop, Handler, LoopStats, Payload, SourceEvent};
use super::signer::SigningContext;
use super::transport::{Endpoint, UdpTransport};
use crate::error::{RelayError, Result};
use crate::feed::decode_trade_line;

/// Decodes one feed line per call, signs it and sends it to `destination`.
pub struct SignAndForward<'a> {
    signer: &'a SigningContext,
    transport: UdpTransport,
    destination: Endpoint,
    forwarded: u64,
    skipped: u64,
}

impl<'a> SignAndForward<'a> {
    pub fn new(signer: &'a SigningContext, transport: UdpTransport, destination: Endpoint) -> Self {
        Self {
            signer,
            transport,
            destination,
            forwarded: 0,
            skipped: 0,
        }
    }
}

#[async_trait]
impl<'a> Handler for SignAndForward<'a> {
    async fn on_ready(&mut self, payload: Payload) -> Result<()> {
        let line = match payload {
            Payload::Text(line) => line,
            Payload::Datagram(d) => {
                return Err(RelayError::MalformedRecord(format!(
                    "sender feed produced a datagram from {}",
                    d.from
                )))
            }
        };

        let Some(record) = decode_trade_line(&line)? else {
            self.skipped += 1;
            return Ok(());
        };

        let message = self.signer.sign(&record);
        self.transport
            .send_to(&self.destination, &message.to_bytes())
            .await?;
        self.forwarded += 1;
        debug!(
            trade_id = record.trade_id,
            market = %record.market,
            forwarded = self.forwarded,
            skipped = self.skipped,
            "forwarded trade"
        );
        Ok(())
    }
}

/// Relay `feed` to `destination` until the feed ends.
pub async fn run_sender(
    signer: &SigningContext,
    transport: UdpTransport,
    destination: Endpoint,
    feed_name: &str,
    feed: BoxStream<'static, SourceEvent>,
) -> Result<LoopStats> {
    info!("Relaying {} to {}", feed_name, destination);
    let mut event_loop = EventLoop::new();
    event_loop.register(feed_name, feed, SignAndForward::new(signer, transport, destination));
    event_loop.run().await
}
