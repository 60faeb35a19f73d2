//! One client's replay session
//!
//! A session walks the shared file list line by line with its own cursor.
//! Each attempt reopens the read position from the cursor, so the cursor is
//! the only state that has to be correct.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, trace, warn};

use super::cursor::ReplayCursor;
use crate::error::{RelayError, Result};
use crate::feed::source::strip_line_ending;

/// Where replayed records go. One call per record.
#[async_trait]
pub trait RecordSink: Send {
    async fn send_record(&mut self, record: String) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One record was handed to the sink
    Sent,
    /// Every file has been replayed; the session is now closed
    Exhausted,
    /// The session was already closed; nothing happened
    Cancelled,
}

pub struct ReplaySession {
    id: u64,
    files: Arc<[PathBuf]>,
    cursor: ReplayCursor,
    reader: Option<(usize, BufReader<File>)>,
    closed: bool,
    sent: u64,
}

impl ReplaySession {
    pub fn new(id: u64, files: Arc<[PathBuf]>) -> Self {
        Self {
            id,
            files,
            cursor: ReplayCursor::new(),
            reader: None,
            closed: false,
            sent: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cursor(&self) -> ReplayCursor {
        self.cursor
    }

    pub fn records_sent(&self) -> u64 {
        self.sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the session and release its open file
    pub fn close(&mut self) {
        if !self.closed {
            debug!(session = self.id, sent = self.sent, "replay session closed");
        }
        self.closed = true;
        self.reader = None;
    }

    /// Read the next non-blank line, rolling over to later files as needed.
    /// `None` once the last file is exhausted.
    pub async fn next_record(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            let index = self.cursor.file_index();
            let Some(path) = self.files.get(index) else {
                return Ok(None);
            };

            let reader = match &mut self.reader {
                Some((open_index, reader)) if *open_index == index => reader,
                slot => {
                    let file = File::open(path).await.map_err(|error| RelayError::Unreadable {
                        path: path.display().to_string(),
                        error,
                    })?;
                    &mut slot.insert((index, BufReader::new(file))).1
                }
            };

            buf.clear();
            reader
                .seek(SeekFrom::Start(self.cursor.byte_position()))
                .await?;
            let consumed = match reader.read_until(b'\n', &mut buf).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if consumed == 0 {
                trace!(session = self.id, file = index, "end of file, rolling over");
                self.cursor.roll_over();
                self.reader = None;
                continue;
            }
            self.cursor.advance(consumed as u64);

            let line = std::str::from_utf8(&buf).map_err(|e| {
                RelayError::MalformedRecord(format!("{}: {}", path.display(), e))
            })?;
            let line = strip_line_ending(line);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }

    /// Deliver one record to `sink`. A closed session does nothing.
    pub async fn deliver_next<S>(&mut self, sink: &mut S) -> Result<Delivery>
    where
        S: RecordSink + ?Sized,
    {
        if self.closed {
            return Ok(Delivery::Cancelled);
        }
        match self.next_record().await? {
            Some(record) => {
                sink.send_record(record).await?;
                self.sent += 1;
                Ok(Delivery::Sent)
            }
            None => {
                self.close();
                Ok(Delivery::Exhausted)
            }
        }
    }
}

/// How a session's delivery loop stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// Every record was delivered
    Exhausted,
    /// The client went away; seen before the next delivery
    Disconnected,
    /// The session had already been closed
    Cancelled,
    /// Reading a file or sending to the client failed
    Failed(RelayError),
}

/// Deliver records until the files run out, the client disconnects, or a
/// send fails. The session is closed on return.
pub async fn run_session<S>(
    session: &mut ReplaySession,
    sink: &mut S,
    disconnected: &AtomicBool,
) -> SessionEnd
where
    S: RecordSink + ?Sized,
{
    let id = session.id();
    let end = loop {
        if disconnected.load(Ordering::Acquire) {
            info!(session = id, sent = session.records_sent(), "client disconnected");
            break SessionEnd::Disconnected;
        }
        match session.deliver_next(sink).await {
            Ok(Delivery::Sent) => {}
            Ok(Delivery::Exhausted) => {
                info!(session = id, sent = session.records_sent(), "replay complete");
                break SessionEnd::Exhausted;
            }
            Ok(Delivery::Cancelled) => break SessionEnd::Cancelled,
            Err(e) => {
                warn!(session = id, error = %e, "replay session aborted");
                break SessionEnd::Failed(e);
            }
        }
    };
    session.close();
    end
}

/// Check that every file opens, and freeze the list for sharing.
pub fn validate_files(paths: Vec<PathBuf>) -> Result<Arc<[PathBuf]>> {
    for path in &paths {
        std::fs::File::open(path).map_err(|error| RelayError::Unreadable {
            path: path.display().to_string(),
            error,
        })?;
    }
    Ok(paths.into())
}
