//! Readiness-driven event loop
//!
//! Sources are async streams of [`SourceEvent`]s, each registered with its
//! own [`Handler`]. The loop waits on every source at once and dispatches one
//! event at a time to the handler of the source that produced it:
//!
//! - `Data`: handler runs once (one line / one datagram)
//! - `Error` transient (EINTR / EAGAIN): retried, nothing else changes
//! - `Error` otherwise, `Hangup`, handler failure: fatal, loop returns `Err`
//!
//! A source whose stream ends is dropped; once none remain the loop returns.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::transport::{Datagram, UdpTransport};
use crate::error::{RelayError, Result};

/// Index of a registered source
pub type SourceId = usize;

/// Unit of input delivered to a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Datagram(Datagram),
    /// One line or message, without its line terminator
    Text(String),
}

#[derive(Debug)]
pub enum SourceEvent {
    Data(Payload),
    Error(RelayError),
    Hangup,
}

/// Per-source work. Each call must do one bounded unit of work.
#[async_trait]
pub trait Handler: Send {
    async fn on_ready(&mut self, payload: Payload) -> Result<()>;
}

/// Loop counters, returned when every source has ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub dispatched: u64,
    pub transient_retries: u64,
}

struct Registration<'a> {
    name: String,
    handler: Box<dyn Handler + 'a>,
}

pub struct EventLoop<'a> {
    sources: Vec<BoxStream<'a, (SourceId, SourceEvent)>>,
    registrations: Vec<Registration<'a>>,
}

impl<'a> Default for EventLoop<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> EventLoop<'a> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Register a source together with the handler that consumes its data.
    pub fn register<S, H>(&mut self, name: impl Into<String>, source: S, handler: H) -> SourceId
    where
        S: Stream<Item = SourceEvent> + Send + 'a,
        H: Handler + 'a,
    {
        let id = self.registrations.len();
        self.sources
            .push(source.map(move |event| (id, event)).boxed());
        self.registrations.push(Registration {
            name: name.into(),
            handler: Box::new(handler),
        });
        id
    }

    pub async fn run(self) -> Result<LoopStats> {
        let Self {
            sources,
            mut registrations,
        } = self;
        let names: Vec<&str> = registrations.iter().map(|r| r.name.as_str()).collect();
        info!(sources = ?names, "event loop started");

        let mut merged = stream::select_all(sources);
        let mut stats = LoopStats::default();

        while let Some((id, event)) = merged.next().await {
            let registration = &mut registrations[id];
            match event {
                SourceEvent::Data(payload) => {
                    registration.handler.on_ready(payload).await?;
                    stats.dispatched += 1;
                }
                SourceEvent::Error(e) if e.is_transient() => {
                    debug!(source = %registration.name, error = %e, "transient error, retrying");
                    stats.transient_retries += 1;
                }
                SourceEvent::Error(e) => {
                    warn!(source = %registration.name, error = %e, "source error");
                    return Err(RelayError::SourceFailed {
                        name: registration.name.clone(),
                        error: Box::new(e),
                    });
                }
                SourceEvent::Hangup => {
                    warn!(source = %registration.name, "source hung up");
                    return Err(RelayError::SourceHangup(registration.name.clone()));
                }
            }
        }

        info!(
            dispatched = stats.dispatched,
            transient_retries = stats.transient_retries,
            "all sources finished"
        );
        Ok(stats)
    }
}

/// Endless stream of received datagrams
pub fn udp_source(transport: UdpTransport) -> impl Stream<Item = SourceEvent> + Send {
    stream::unfold(transport, |mut transport| async move {
        let event = match transport.recv().await {
            Ok(datagram) => SourceEvent::Data(Payload::Datagram(datagram)),
            Err(e) => SourceEvent::Error(e),
        };
        Some((event, transport))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    struct Recorder {
        seen: Arc<Mutex<Vec<Payload>>>,
    }

    #[async_trait]
    impl Handler for Recorder {
        async fn on_ready(&mut self, payload: Payload) -> Result<()> {
            self.seen.lock().push(payload);
            Ok(())
        }
    }

    fn text(s: &str) -> SourceEvent {
        SourceEvent::Data(Payload::Text(s.to_string()))
    }

    fn recorder() -> (Recorder, Arc<Mutex<Vec<Payload>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Recorder { seen: seen.clone() }, seen)
    }

    #[tokio::test]
    async fn test_handlers_only_see_their_own_source() {
        let (x_handler, x_seen) = recorder();
        let (y_handler, y_seen) = recorder();

        let mut event_loop = EventLoop::new();
        event_loop.register(
            "x",
            stream::iter(vec![text("x1"), text("x2"), text("x3")]),
            x_handler,
        );
        event_loop.register("y", stream::iter(vec![text("y1"), text("y2")]), y_handler);

        let stats = event_loop.run().await.unwrap();
        assert_eq!(stats.dispatched, 5);

        let texts = |seen: &Arc<Mutex<Vec<Payload>>>| -> Vec<String> {
            seen.lock()
                .iter()
                .map(|p| match p {
                    Payload::Text(t) => t.clone(),
                    other => panic!("unexpected payload {:?}", other),
                })
                .collect()
        };
        assert_eq!(texts(&x_seen), vec!["x1", "x2", "x3"]);
        assert_eq!(texts(&y_seen), vec!["y1", "y2"]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (handler, seen) = recorder();
        let events = vec![
            SourceEvent::Error(io::Error::from(io::ErrorKind::Interrupted).into()),
            text("a"),
            SourceEvent::Error(io::Error::from(io::ErrorKind::WouldBlock).into()),
            text("b"),
        ];

        let mut event_loop = EventLoop::new();
        event_loop.register("feed", stream::iter(events), handler);
        let stats = event_loop.run().await.unwrap();

        assert_eq!(stats.transient_retries, 2);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_source_error_is_fatal() {
        let (handler, seen) = recorder();
        let events = vec![
            SourceEvent::Error(io::Error::from(io::ErrorKind::ConnectionReset).into()),
            text("never"),
        ];

        let mut event_loop = EventLoop::new();
        event_loop.register("feed", stream::iter(events), handler);

        match event_loop.run().await {
            Err(RelayError::SourceFailed { name, .. }) => assert_eq!(name, "feed"),
            other => panic!("expected SourceFailed, got {:?}", other),
        }
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_is_fatal() {
        let (handler, _seen) = recorder();
        let mut event_loop = EventLoop::new();
        event_loop.register(
            "wss",
            stream::iter(vec![text("a"), SourceEvent::Hangup]),
            handler,
        );

        assert!(matches!(
            event_loop.run().await,
            Err(RelayError::SourceHangup(name)) if name == "wss"
        ));
    }

    #[tokio::test]
    async fn test_handler_error_is_fatal() {
        struct Failing;

        #[async_trait]
        impl Handler for Failing {
            async fn on_ready(&mut self, _payload: Payload) -> Result<()> {
                Err(RelayError::BadSignature)
            }
        }

        let mut event_loop = EventLoop::new();
        event_loop.register("udp", stream::iter(vec![text("x")]), Failing);
        assert!(matches!(
            event_loop.run().await,
            Err(RelayError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn test_udp_source_yields_datagrams() {
        let receiver = UdpTransport::bind(0).await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let raw = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(b"ping", ("127.0.0.1", port)).unwrap();

        let mut source = Box::pin(udp_source(receiver));
        match source.next().await {
            Some(SourceEvent::Data(Payload::Datagram(d))) => assert_eq!(d.bytes, b"ping"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
