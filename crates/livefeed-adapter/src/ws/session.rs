/*
[INPUT]:  Streaming endpoint URL; outbound messages from any caller
[OUTPUT]: One live connection, FIFO flush on open, inbound frames handed to a FrameHandler
[POS]:    WebSocket layer - transport session (connection + outbound queue)
[UPDATE]: When changing connection lifecycle, queueing or id stamping
*/

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::http::{FeedError, Result};
use crate::ws::message::PendingMessage;

/// Default streaming endpoint
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8081/ws";
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Receives every inbound text frame on the connection task.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Closed,
    /// Connection-level failure; the session is closed afterwards and does not reconnect.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the connection with this sequence id.
    Sent { id: u64 },
    /// Buffered until the next open; `pending` is the queue length after the push.
    Queued { pending: usize },
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    queue: VecDeque<PendingMessage>,
    next_id: u64,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    /// Bumped on every open/close so a stale connection task cannot touch newer state.
    epoch: u64,
}

/// Owns one logical connection to the streaming endpoint.
///
/// `send` never waits: while the connection is not open messages queue up, and the
/// queue is flushed in insertion order, exactly once, when the connection opens.
pub struct TransportSession {
    url: String,
    inner: Mutex<SessionInner>,
    handler: Arc<dyn FrameHandler>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("url", &self.url)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    pub fn new(url: impl Into<String>, handler: Arc<dyn FrameHandler>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            url: url.into(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Closed,
                queue: VecDeque::new(),
                next_id: 1,
                outbound: None,
                epoch: 0,
            }),
            handler,
            events,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Subscribe to open/close/error notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Start connecting. A no-op while already opening or open.
    pub fn open(self: &Arc<Self>) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(FeedError::WebSocket(
                "TransportSession::open requires a Tokio runtime".to_string(),
            ));
        }

        let epoch = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Closed {
                return Ok(());
            }
            inner.state = SessionState::Opening;
            inner.epoch += 1;
            inner.epoch
        };

        info!(url = %self.url, "opening stream connection");
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_connection(epoch).await;
        });
        Ok(())
    }

    /// Tear the connection down. Queued messages stay queued for the next open.
    pub fn close(&self) {
        let was = {
            let mut inner = self.inner.lock();
            let was = inner.state;
            inner.state = SessionState::Closed;
            inner.outbound = None;
            inner.epoch += 1;
            was
        };
        if was != SessionState::Closed {
            info!(url = %self.url, "stream connection closed by caller");
            let _ = self.events.send(SessionEvent::Closed);
        }
    }

    /// Transmit now if open, otherwise append to the queue.
    pub fn send(&self, message: PendingMessage) -> SendOutcome {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Open {
            if let Some(outbound) = inner.outbound.as_ref() {
                let id = inner.next_id;
                if outbound.send(WsMessage::Text(message.encode(id).into())).is_ok() {
                    inner.next_id += 1;
                    log_message_sent(&message, id);
                    return SendOutcome::Sent { id };
                }
            }
            // Connection task is gone; fall back to buffering.
            inner.state = SessionState::Closed;
            inner.outbound = None;
        }

        inner.queue.push_back(message);
        SendOutcome::Queued {
            pending: inner.queue.len(),
        }
    }

    /// Flush the queue into `outbound` and mark the session open.
    ///
    /// Runs under the session lock, so concurrent sends land after every queued item.
    fn mark_open(&self, epoch: u64, outbound: mpsc::UnboundedSender<WsMessage>) -> bool {
        let flushed = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch || inner.state != SessionState::Opening {
                return false;
            }

            let mut flushed = 0usize;
            while let Some(message) = inner.queue.pop_front() {
                let id = inner.next_id;
                if outbound.send(WsMessage::Text(message.encode(id).into())).is_err() {
                    inner.queue.push_front(message);
                    break;
                }
                inner.next_id += 1;
                log_message_sent(&message, id);
                flushed += 1;
            }

            inner.outbound = Some(outbound);
            inner.state = SessionState::Open;
            flushed
        };

        info!(url = %self.url, flushed, "stream connection open");
        let _ = self.events.send(SessionEvent::Opened);
        true
    }

    fn mark_closed(&self, epoch: u64, error: Option<String>) {
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.state = SessionState::Closed;
            inner.outbound = None;
        }

        if let Some(error) = error {
            warn!(url = %self.url, error = %error, "stream connection failed");
            let _ = self.events.send(SessionEvent::Error(error));
        } else {
            info!(url = %self.url, "stream connection ended");
        }
        let _ = self.events.send(SessionEvent::Closed);
    }

    async fn run_connection(self: Arc<Self>, epoch: u64) {
        let ws_stream = match connect_async(self.url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(err) => {
                self.mark_closed(epoch, Some(err.to_string()));
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        if !self.mark_open(epoch, outbound_tx) {
            debug!(url = %self.url, "connection superseded before open; dropping it");
            let _ = write.send(WsMessage::Close(None)).await;
            return;
        }

        let exit_error = loop {
            tokio::select! {
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if let Err(err) = write.send(message).await {
                                break Some(err.to_string());
                            }
                        }
                        None => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            break None;
                        }
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => self.handler.on_frame(text.as_str()),
                        Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.handler.on_frame(text),
                            Err(_) => debug!(bytes = bytes.len(), "non-utf8 binary frame ignored"),
                        },
                        Some(Ok(WsMessage::Close(_))) => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            break None;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break Some(err.to_string()),
                        None => break None,
                    }
                }
            }
        };

        self.mark_closed(epoch, exit_error);
    }
}

fn log_message_sent(message: &PendingMessage, id: u64) {
    match (message.message_type(), message.room()) {
        (Some(kind), Some(room)) => debug!(id, kind, room, "ws message sent"),
        _ => debug!(id, "ws message sent"),
    }
}
