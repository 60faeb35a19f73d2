//! Feed line -> sign -> UDP -> verify -> JSON output

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trade_relay::feed::FeedSource;
use trade_relay::relay::{run_receiver, run_sender, Endpoint, SigningContext, UdpTransport};
use trade_relay::sink::TradeSink;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

async fn wait_for_lines(buf: &SharedBuf, count: usize) {
    while buf.contents().lines().count() < count {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_trade_line_is_relayed_and_verified() {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("feed.jsonl");
    std::fs::write(
        &feed_path,
        concat!(
            r#"{"e":"trade","p":"1.23","q":"4.5","t":99,"T":1000,"s":"BTCUSDT"}"#,
            "\n",
            r#"{"e":"depthUpdate","s":"BTCUSDT"}"#,
            "\n",
            r#"{"stream":"ethusdt@trade","data":{"e":"trade","p":"2034.5","q":"0.1","t":100,"T":1001,"s":"ETHUSDT"}}"#,
            "\n",
        ),
    )
    .unwrap();

    let signer = SigningContext::new(b"integration-secret").unwrap();
    let receiver_transport = UdpTransport::bind(0).await.unwrap();
    let port = receiver_transport.local_addr().unwrap().port();
    let destination: Endpoint = format!("127.0.0.1:{}", port).parse().unwrap();

    let feed_source = FeedSource::File(feed_path);
    let feed = feed_source.open().await.unwrap();
    let stats = run_sender(
        &signer,
        UdpTransport::bind(0).await.unwrap(),
        destination,
        feed_source.tag(),
        feed,
    )
    .await
    .unwrap();
    assert_eq!(stats.dispatched, 3);

    let buf = SharedBuf::default();
    let receiver = run_receiver(
        &signer,
        receiver_transport,
        None,
        TradeSink::from_writer(buf.clone()),
    );

    tokio::select! {
        result = receiver => panic!("receiver exited early: {:?}", result),
        waited = tokio::time::timeout(Duration::from_secs(5), wait_for_lines(&buf, 2)) => {
            assert!(waited.is_ok(), "timed out, output so far: {}", buf.contents());
        }
    }

    let out = buf.contents();
    let lines: Vec<serde_json::Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert!(out.contains("\"tradeId\":99"));
    assert!(out.contains("\"source\":\"udp\""));
    assert_eq!(lines[0]["price"], 1.23);
    assert_eq!(lines[0]["quantity"], 4.5);
    assert_eq!(lines[0]["tradeTime"], 1000);
    assert_eq!(lines[0]["market"], "BTCUSDT");
    assert_eq!(lines[1]["tradeId"], 100);
    assert_eq!(lines[1]["market"], "ETHUSDT");
}

#[tokio::test]
async fn test_receiver_with_wrong_key_rejects_relay() {
    let sender_key = SigningContext::new(b"sender-secret").unwrap();
    let receiver_key = SigningContext::new(b"receiver-secret").unwrap();

    let receiver_transport = UdpTransport::bind(0).await.unwrap();
    let port = receiver_transport.local_addr().unwrap().port();
    let destination: Endpoint = format!("127.0.0.1:{}", port).parse().unwrap();

    let feed = trade_relay::feed::line_source(
        &br#"{"e":"trade","p":"1","q":"1","t":1,"T":1,"s":"BTCUSDT"}"#[..],
    );
    run_sender(
        &sender_key,
        UdpTransport::bind(0).await.unwrap(),
        destination,
        "inline",
        Box::pin(feed),
    )
    .await
    .unwrap();

    let buf = SharedBuf::default();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_receiver(
            &receiver_key,
            receiver_transport,
            None,
            TradeSink::from_writer(buf.clone()),
        ),
    )
    .await
    .expect("receiver should stop on the forged datagram");

    assert!(matches!(result, Err(trade_relay::RelayError::BadSignature)));
    assert!(buf.contents().is_empty());
}
