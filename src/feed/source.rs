//! Feed sources
//!
//! Each source opens into a stream of [`SourceEvent`]s for the event loop:
//! one `Payload::Text` per JSON line or WebSocket message.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, trace};

use crate::error::{RelayError, Result};
use crate::relay::event_loop::{Payload, SourceEvent};

/// Binance spot trade streams used when no feed is configured
pub const DEFAULT_FEED_URI: &str = "wss://stream.binance.com:9443/ws/btcusdt@trade/ethusdt@trade";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// JSON lines on standard input (`-`)
    Stdin,
    /// JSON-lines file
    File(PathBuf),
    /// Live `ws://` or `wss://` stream
    WebSocket(String),
}

impl FromStr for FeedSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s == "-" {
            Self::Stdin
        } else if s.starts_with("ws://") || s.starts_with("wss://") {
            Self::WebSocket(s.to_string())
        } else {
            Self::File(PathBuf::from(s))
        })
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::WebSocket(uri) => f.write_str(uri),
        }
    }
}

impl FeedSource {
    /// Short name used in logs and as the output `source` tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::File(_) => "file",
            Self::WebSocket(_) => "wss",
        }
    }

    pub async fn open(&self) -> Result<BoxStream<'static, SourceEvent>> {
        match self {
            Self::Stdin => Ok(line_source(BufReader::new(tokio::io::stdin())).boxed()),
            Self::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|error| RelayError::Unreadable {
                        path: path.display().to_string(),
                        error,
                    })?;
                info!("Reading feed from {}", path.display());
                Ok(line_source(BufReader::new(file)).boxed())
            }
            Self::WebSocket(uri) => websocket_source(uri).await,
        }
    }
}

/// One event per line, ending at EOF
pub fn line_source<R>(reader: R) -> impl Stream<Item = SourceEvent> + Send
where
    R: AsyncBufRead + Unpin + Send,
{
    stream::unfold(reader, |mut reader| async move {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => {
                let text = strip_line_ending(&line).to_string();
                Some((SourceEvent::Data(Payload::Text(text)), reader))
            }
            Err(e) => Some((SourceEvent::Error(e.into()), reader)),
        }
    })
}

/// Connect and yield each text (or UTF-8 binary) message. Pongs are queued by
/// tungstenite itself; close or end of stream yields `Hangup`.
pub async fn websocket_source(uri: &str) -> Result<BoxStream<'static, SourceEvent>> {
    info!("Connecting to {}", uri);
    let (ws, _response) = connect_async(uri).await?;
    info!("Connected to {}", uri);

    Ok(stream::unfold(Some(ws), |state| async move {
        let mut ws = state?;
        loop {
            let event = match ws.next().await {
                Some(Ok(Message::Text(text))) => SourceEvent::Data(Payload::Text(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => SourceEvent::Data(Payload::Text(text)),
                    Err(e) => SourceEvent::Error(RelayError::MalformedRecord(format!(
                        "binary frame is not UTF-8: {}",
                        e
                    ))),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "WebSocket closed by server");
                    return Some((SourceEvent::Hangup, None));
                }
                Some(Ok(other)) => {
                    trace!(?other, "ignoring control frame");
                    continue;
                }
                Some(Err(e)) => return Some((SourceEvent::Error(e.into()), None)),
                None => {
                    info!("WebSocket stream ended");
                    return Some((SourceEvent::Hangup, None));
                }
            };
            return Some((event, Some(ws)));
        }
    })
    .boxed())
}

/// Drop a trailing `\n` or `\r\n`
pub(crate) fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_source_parse() {
        assert_eq!("-".parse::<FeedSource>().unwrap(), FeedSource::Stdin);
        assert_eq!(
            "wss://stream.binance.com:9443/ws/btcusdt@trade"
                .parse::<FeedSource>()
                .unwrap(),
            FeedSource::WebSocket("wss://stream.binance.com:9443/ws/btcusdt@trade".into())
        );
        assert_eq!(
            "ws://127.0.0.1:60000".parse::<FeedSource>().unwrap().tag(),
            "wss"
        );
        assert_eq!(
            "trades.jsonl".parse::<FeedSource>().unwrap(),
            FeedSource::File(PathBuf::from("trades.jsonl"))
        );
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("abc\n"), "abc");
        assert_eq!(strip_line_ending("abc\r\n"), "abc");
        assert_eq!(strip_line_ending("abc"), "abc");
        assert_eq!(strip_line_ending("\n"), "");
    }

    #[tokio::test]
    async fn test_line_source_yields_lines_then_ends() {
        let input: &[u8] = b"first\nsecond\r\nlast";
        let events: Vec<SourceEvent> = line_source(input).collect().await;

        let lines: Vec<String> = events
            .into_iter()
            .map(|e| match e {
                SourceEvent::Data(Payload::Text(t)) => t,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(lines, vec!["first", "second", "last"]);
    }

    #[tokio::test]
    async fn test_missing_feed_file_is_reported() {
        let source = FeedSource::File(PathBuf::from("/nonexistent/feed.jsonl"));
        assert!(matches!(
            source.open().await,
            Err(RelayError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_websocket_source_answers_ping_once_and_hangs_up_on_close() {
        use futures_util::SinkExt;
        use std::time::Duration;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Ping(b"hb".to_vec())).await.unwrap();
            ws.send(Message::Text("trade".into())).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();

            let mut pongs = 0;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_pong() {
                    pongs += 1;
                }
            }
            pongs
        });

        let source = websocket_source(&format!("ws://{}", addr)).await.unwrap();
        let events: Vec<SourceEvent> = tokio::time::timeout(Duration::from_secs(5), source.collect())
            .await
            .unwrap();
        assert!(
            matches!(
                &events[..],
                [SourceEvent::Data(Payload::Text(t)), SourceEvent::Hangup] if t == "trade"
            ),
            "unexpected events {:?}",
            events
        );

        let pongs = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pongs, 1);
    }

    #[tokio::test]
    async fn test_file_feed_reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        std::fs::write(&path, "a\nb\n").unwrap();

        let stream = FeedSource::File(path).open().await.unwrap();
        let events: Vec<SourceEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
    }
}
