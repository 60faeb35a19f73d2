//! WebSocket replay server
//!
//! Every connection gets its own [`ReplaySession`] over the shared file list.
//! A reader task watches the client side and raises a disconnect flag; the
//! delivery loop checks it before each record.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::session::{run_session, RecordSink, ReplaySession, SessionEnd};
use crate::error::{RelayError, Result};

#[derive(Clone)]
pub struct ReplayState {
    files: Arc<[PathBuf]>,
    next_session_id: Arc<AtomicU64>,
}

impl ReplayState {
    pub fn new(files: Arc<[PathBuf]>) -> Self {
        Self {
            files,
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Any path upgrades, so clients can keep exchange-style stream URLs.
pub fn router(files: Arc<[PathBuf]>) -> Router {
    Router::new()
        .route("/", get(replay_handler))
        .route("/*path", get(replay_handler))
        .with_state(ReplayState::new(files))
}

pub async fn serve(listener: TcpListener, files: Arc<[PathBuf]>) -> Result<()> {
    info!(
        "Replaying {} file(s) on ws://{}",
        files.len(),
        listener.local_addr()?
    );
    axum::serve(listener, router(files)).await?;
    Ok(())
}

async fn replay_handler(ws: WebSocketUpgrade, State(state): State<ReplayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct ClientSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl RecordSink for ClientSink {
    async fn send_record(&mut self, record: String) -> Result<()> {
        self.sender
            .send(Message::Text(record))
            .await
            .map_err(|e| RelayError::ClientSend(e.to_string()))
    }
}

impl ClientSink {
    async fn close_normal(&mut self) {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::from("replay complete"),
        };
        if let Err(e) = self.sender.send(Message::Close(Some(frame))).await {
            debug!("close frame not delivered: {}", e);
        }
    }
}

async fn handle_socket(socket: WebSocket, state: ReplayState) {
    let id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let (sender, mut receiver) = socket.split();

    let disconnected = Arc::new(AtomicBool::new(false));
    let reader = {
        let disconnected = disconnected.clone();
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(session = id, "client read error: {}", e);
                        break;
                    }
                }
            }
            disconnected.store(true, Ordering::Release);
        })
    };

    info!(session = id, "replay session started");
    let mut sink = ClientSink { sender };
    let mut session = ReplaySession::new(id, state.files.clone());

    if let SessionEnd::Exhausted = run_session(&mut session, &mut sink, &disconnected).await {
        sink.close_normal().await;
    }

    reader.abort();
}
