//! Trade log replay
//!
//! Serves captured JSON-line logs to WebSocket clients, each client starting
//! from the first line of the first file.

pub mod cursor;
pub mod server;
pub mod session;

pub use cursor::ReplayCursor;
pub use server::{router, serve, ReplayState};
pub use session::{run_session, validate_files, Delivery, RecordSink, ReplaySession, SessionEnd};
