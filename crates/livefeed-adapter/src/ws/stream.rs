/*
[INPUT]:  Stream URL; subscribe/register calls from UI and state owners
[OUTPUT]: One shared session + registry + router, wired together
[POS]:    WebSocket layer - public entry point for live market data
[UPDATE]: When the facade surface or wiring between session/registry/router changes
*/

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::http::Result;
use crate::types::{DepthBook, Room, TickerUpdate, TradeUpdate};
use crate::ws::message::PendingMessage;
use crate::ws::registry::{ListenerHandle, SubscriptionRegistry};
use crate::ws::router::{EnvelopeRouter, RouterStats};
use crate::ws::session::{
    DEFAULT_STREAM_URL, SendOutcome, SessionEvent, SessionState, TransportSession,
};

/// Live market data stream: owns the connection and the room listeners.
///
/// Construct once and share it (it is cheap to wrap in `Arc`). Subscribing tells the
/// server what to push; registering tells the stream who receives it. The two are
/// independent: a registered listener on an unsubscribed room simply never fires.
#[derive(Debug)]
pub struct MarketStream {
    session: Arc<TransportSession>,
    router: Arc<EnvelopeRouter>,
}

impl Default for MarketStream {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_URL)
    }
}

impl MarketStream {
    pub fn new(url: impl Into<String>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let router = Arc::new(EnvelopeRouter::new(registry));
        let session = Arc::new(TransportSession::new(url, router.clone()));
        Self { session, router }
    }

    /// Start connecting; queued messages flush once the connection is up.
    pub fn open(&self) -> Result<()> {
        self.session.open()
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub fn subscribe(&self, room: &Room) -> SendOutcome {
        self.session.send(PendingMessage::subscribe(room))
    }

    pub fn unsubscribe(&self, room: &Room) -> SendOutcome {
        self.session.send(PendingMessage::unsubscribe(room))
    }

    pub fn send_raw(&self, body: Map<String, Value>) -> SendOutcome {
        self.session.send(PendingMessage::raw(body))
    }

    pub fn register(&self, room: &Room, listener: ListenerHandle) -> Result<()> {
        self.router.registry().register(room, listener)
    }

    pub fn register_depth(
        &self,
        market: &str,
        callback: impl Fn(&DepthBook) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let handle = ListenerHandle::depth(callback);
        self.register_matching(market, handle)
    }

    pub fn register_trade(
        &self,
        market: &str,
        callback: impl Fn(&TradeUpdate) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let handle = ListenerHandle::trade(callback);
        self.register_matching(market, handle)
    }

    pub fn register_ticker(
        &self,
        market: &str,
        callback: impl Fn(&TickerUpdate) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let handle = ListenerHandle::ticker(callback);
        self.register_matching(market, handle)
    }

    pub fn deregister(&self, room: &Room, listener: &ListenerHandle) -> usize {
        self.router.registry().deregister(room, listener)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.events()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn session(&self) -> &Arc<TransportSession> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.router.registry()
    }

    fn register_matching(&self, market: &str, handle: ListenerHandle) -> ListenerHandle {
        let room = Room::new(handle.kind(), market);
        let registered = self.router.registry().register(&room, handle.clone());
        debug_assert!(registered.is_ok(), "room kind is taken from the listener");
        handle
    }
}
