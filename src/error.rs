//! Relay error type
//!
//! Every failure the relay can hit is one of three kinds: transient (retried
//! in place), session-local (replay clients only), or fatal. Fatal errors end
//! the process through [`report_fatal`].

use std::io;
use std::panic::Location;

use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("secret key missing: environment variable {0} is unset or empty")]
    MissingSecret(String),

    #[error("invalid endpoint {input:?}: {reason}")]
    InvalidEndpoint { input: String, reason: String },

    #[error("failed to bind UDP port {port} (port in use or permission denied): {error}")]
    Bind { port: u16, error: io::Error },

    #[error("datagram size {len} outside 1..={max}")]
    DatagramSize { len: usize, max: usize },

    #[error("short send: wrote {written} of {expected} bytes")]
    ShortSend { written: usize, expected: usize },

    #[error("wire message is {actual} bytes, expected {expected}")]
    WireSize { actual: usize, expected: usize },

    #[error("authentication tag mismatch")]
    BadSignature,

    #[error("malformed feed record: {0}")]
    MalformedRecord(String),

    #[error("source {name} failed: {error}")]
    SourceFailed { name: String, error: Box<RelayError> },

    #[error("source {0} hung up")]
    SourceHangup(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("replay client send failed: {0}")]
    ClientSend(String),

    #[error("{path} is not readable: {error}")]
    Unreadable { path: String, error: io::Error },
}

impl RelayError {
    /// Interrupted or temporarily unavailable calls; retried with no state change.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Log a fatal error with the caller's location and terminate with status 1.
#[track_caller]
pub fn report_fatal(err: &anyhow::Error) -> ! {
    let location = Location::caller();
    error!(file = location.file(), line = location.line(), "fatal: {:#}", err);
    eprintln!("ERROR:{}:{}: {:#}", location.file(), location.line(), err);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_and_would_block_are_transient() {
        let interrupted = RelayError::from(io::Error::from(io::ErrorKind::Interrupted));
        let would_block = RelayError::from(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(interrupted.is_transient());
        assert!(would_block.is_transient());
    }

    #[test]
    fn test_protocol_errors_are_not_transient() {
        assert!(!RelayError::BadSignature.is_transient());
        assert!(!RelayError::WireSize { actual: 3, expected: 80 }.is_transient());
        assert!(!RelayError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_transient());
    }
}
