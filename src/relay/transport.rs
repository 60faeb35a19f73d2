//! UDP transport with fixed-capacity framing
//!
//! One socket per process side. Datagrams are opaque byte buffers of at most
//! 8192 bytes; anything else is a logic or protocol error, never dropped
//! silently.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::error::{RelayError, Result};

/// Largest datagram the relay sends or accepts
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// IPv4 `host:port` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddrV4);

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }
}

impl FromStr for Endpoint {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| RelayError::InvalidEndpoint {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing ':port'"))?;
        let ip: Ipv4Addr = host
            .parse()
            .map_err(|_| invalid("host is not an IPv4 address"))?;
        let port: u16 = port.parse().map_err(|_| invalid("port is not a u16"))?;
        Ok(Self::new(ip, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}

/// One received datagram. `from` is informational only; authenticity comes
/// from the message tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

pub struct UdpTransport {
    socket: UdpSocket,
    // One spare byte so oversize datagrams are detected instead of truncated
    recv_buf: Box<[u8]>,
}

impl UdpTransport {
    /// Bind `0.0.0.0:port`. Port 0 picks an ephemeral port (send-only sockets).
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|error| RelayError::Bind { port, error })?;
        if port != 0 {
            info!("Listening for datagrams on {}", addr);
        }
        Ok(Self {
            socket,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE + 1].into_boxed_slice(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram; the whole buffer must go out in one call.
    pub async fn send_to(&self, dest: &Endpoint, bytes: &[u8]) -> Result<()> {
        check_size(bytes.len())?;
        let written = self.socket.send_to(bytes, dest.socket_addr()).await?;
        if written != bytes.len() {
            return Err(RelayError::ShortSend {
                written,
                expected: bytes.len(),
            });
        }
        trace!("sent {} bytes to {}", written, dest);
        Ok(())
    }

    /// Receive one datagram
    pub async fn recv(&mut self) -> Result<Datagram> {
        let (len, from) = self.socket.recv_from(&mut self.recv_buf).await?;
        check_size(len)?;
        debug!("received {} byte datagram from {}", len, from);
        Ok(Datagram {
            bytes: self.recv_buf[..len].to_vec(),
            from,
        })
    }
}

fn check_size(len: usize) -> Result<()> {
    if len == 0 || len > MAX_DATAGRAM_SIZE {
        return Err(RelayError::DatagramSize {
            len,
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (UdpTransport, UdpTransport, Endpoint) {
        let receiver = UdpTransport::bind(0).await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let sender = UdpTransport::bind(0).await.unwrap();
        (sender, receiver, Endpoint::new(Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn test_endpoint_parse() {
        let ep: Endpoint = "127.0.0.1:60000".parse().unwrap();
        assert_eq!(ep.port(), 60000);
        assert_eq!(ep.to_string(), "127.0.0.1:60000");

        assert!("127.0.0.1".parse::<Endpoint>().is_err());
        assert!("localhost:60000".parse::<Endpoint>().is_err());
        assert!("127.0.0.1:70000".parse::<Endpoint>().is_err());
        assert!("127.0.0.1:".parse::<Endpoint>().is_err());
        assert!("[::1]:60000".parse::<Endpoint>().is_err());
    }

    #[tokio::test]
    async fn test_loopback_all_sizes_byte_identical() {
        let (sender, mut receiver, dest) = loopback_pair().await;

        for size in 1..=MAX_DATAGRAM_SIZE {
            let payload: Vec<u8> = (0..size).map(|i| (i * 31 + size) as u8).collect();
            sender.send_to(&dest, &payload).await.unwrap();
            let datagram = receiver.recv().await.unwrap();
            assert_eq!(datagram.bytes, payload, "mismatch at size {}", size);
            assert_eq!(
                datagram.from.port(),
                sender.local_addr().unwrap().port()
            );
        }
    }

    #[tokio::test]
    async fn test_send_rejects_empty_and_oversize() {
        let (sender, _receiver, dest) = loopback_pair().await;

        assert!(matches!(
            sender.send_to(&dest, &[]).await,
            Err(RelayError::DatagramSize { len: 0, .. })
        ));
        let oversize = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(matches!(
            sender.send_to(&dest, &oversize).await,
            Err(RelayError::DatagramSize { len, max }) if len == MAX_DATAGRAM_SIZE + 1 && max == MAX_DATAGRAM_SIZE
        ));
    }

    #[tokio::test]
    async fn test_recv_rejects_oversize_datagram() {
        let (_sender, mut receiver, dest) = loopback_pair().await;
        let raw = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&vec![1u8; MAX_DATAGRAM_SIZE + 100], dest.socket_addr())
            .unwrap();

        assert!(matches!(
            receiver.recv().await,
            Err(RelayError::DatagramSize { .. })
        ));
    }

    #[tokio::test]
    async fn test_recv_rejects_empty_datagram() {
        let (_sender, mut receiver, dest) = loopback_pair().await;
        let raw = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[], dest.socket_addr()).unwrap();

        assert!(matches!(
            receiver.recv().await,
            Err(RelayError::DatagramSize { len: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = UdpTransport::bind(0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        match UdpTransport::bind(port).await {
            Err(RelayError::Bind { port: p, .. }) => assert_eq!(p, port),
            Err(other) => panic!("expected Bind error, got {}", other),
            Ok(_) => panic!("second bind on port {} succeeded", port),
        }
    }
}
