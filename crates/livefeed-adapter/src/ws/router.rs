/*
[INPUT]:  Raw inbound frame text from the transport session
[OUTPUT]: Typed payloads delivered to registered listeners, in registration order
[POS]:    WebSocket layer - the single place that understands the envelope format
[UPDATE]: When adding payload kinds or changing dispatch/isolation semantics
*/

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::types::RoomKind;
use crate::ws::message::{Envelope, PayloadError, decode_depth, decode_ticker, decode_trade};
use crate::ws::registry::{ListenerHandle, RoomSnapshot, SubscriptionRegistry};
use crate::ws::session::FrameHandler;

const PARSE_FAIL_LOG_LIMIT: usize = 3;
const PAYLOAD_DROP_LOG_LIMIT: usize = 5;
const RAW_LOG_MAX_BYTES: usize = 1024;

static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PAYLOAD_DROP_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to this many listeners (panicking ones included).
    Dispatched(usize),
    /// Nobody listens on the room; the inner payload was never decoded.
    NoListeners,
    /// Payload carried nothing to deliver (depth frame with neither side).
    Empty,
    /// Malformed envelope or payload.
    Dropped,
}

#[derive(Debug, Default)]
struct RouterCounters {
    frames: AtomicU64,
    decoded: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    listener_panics: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub frames: u64,
    /// Frames decoded into a typed payload. Rooms without listeners, empty depth
    /// frames and malformed payloads leave it flat.
    pub decoded: u64,
    pub dispatched: u64,
    pub dropped: u64,
    pub listener_panics: u64,
}

#[derive(Debug)]
pub struct EnvelopeRouter {
    registry: Arc<SubscriptionRegistry>,
    counters: RouterCounters,
}

impl EnvelopeRouter {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            counters: RouterCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            listener_panics: self.counters.listener_panics.load(Ordering::Relaxed),
        }
    }

    /// Decode one frame and invoke the room's listeners synchronously.
    pub fn route(&self, text: &str) -> RouteOutcome {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                log_parse_fail_once(&err, text);
                return self.drop_frame();
            }
        };

        let Some(snapshot) = self.registry.snapshot(&envelope.room) else {
            return RouteOutcome::NoListeners;
        };

        let inner = match envelope.decode_data() {
            Ok(inner) => inner,
            Err(err) => {
                log_payload_drop_once(&envelope.room, &err);
                return self.drop_frame();
            }
        };

        let outcome = match snapshot.room.kind() {
            RoomKind::Depth => match decode_depth(&inner) {
                Ok(Some(depth)) => self.dispatch(&snapshot, |listener| {
                    if let ListenerHandle::Depth(callback) = listener {
                        callback(&depth);
                    }
                }),
                Ok(None) => RouteOutcome::Empty,
                Err(err) => {
                    log_payload_drop_once(&envelope.room, &err);
                    return self.drop_frame();
                }
            },
            RoomKind::Trade => match decode_trade(&inner) {
                Ok(trade) => self.dispatch(&snapshot, |listener| {
                    if let ListenerHandle::Trade(callback) = listener {
                        callback(&trade);
                    }
                }),
                Err(err) => {
                    log_payload_drop_once(&envelope.room, &err);
                    return self.drop_frame();
                }
            },
            RoomKind::Ticker => {
                let ticker = decode_ticker(inner);
                self.dispatch(&snapshot, |listener| {
                    if let ListenerHandle::Ticker(callback) = listener {
                        callback(&ticker);
                    }
                })
            }
        };

        if let RouteOutcome::Dispatched(count) = outcome {
            self.counters.decoded.fetch_add(1, Ordering::Relaxed);
            self.counters
                .dispatched
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        outcome
    }

    /// Invoke each listener of the snapshot; a panic in one does not skip the rest.
    fn dispatch(&self, snapshot: &RoomSnapshot, invoke: impl Fn(&ListenerHandle)) -> RouteOutcome {
        for (index, listener) in snapshot.listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| invoke(listener))).is_err() {
                self.counters.listener_panics.fetch_add(1, Ordering::Relaxed);
                warn!(room = %snapshot.room, index, "listener panicked; continuing dispatch");
            }
        }
        RouteOutcome::Dispatched(snapshot.listeners.len())
    }

    fn drop_frame(&self) -> RouteOutcome {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        RouteOutcome::Dropped
    }
}

impl FrameHandler for EnvelopeRouter {
    fn on_frame(&self, text: &str) {
        self.route(text);
    }
}

fn log_parse_fail_once(err: &serde_json::Error, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws envelope parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            message = %preview,
            "ws envelope parse failed"
        );
    }
}

fn log_payload_drop_once(room: &str, err: &PayloadError) {
    let count = PAYLOAD_DROP_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PAYLOAD_DROP_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PAYLOAD_DROP_LOG_LIMIT,
            room,
            error = %err,
            "ws payload dropped"
        );
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
