/*
[INPUT]:  Room + typed listener registrations from UI/state owners
[OUTPUT]: Per-room, insertion-ordered listener snapshots for dispatch
[POS]:    WebSocket layer - who wants which room's data
[UPDATE]: When adding payload kinds or changing registration semantics
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::http::{FeedError, Result};
use crate::types::{DepthBook, Room, RoomKind, TickerUpdate, TradeUpdate};

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A registered callback, tagged with the payload kind it accepts.
///
/// Clones share the same callback, so a clone can be used to deregister.
#[derive(Clone)]
pub enum ListenerHandle {
    Depth(Listener<DepthBook>),
    Trade(Listener<TradeUpdate>),
    Ticker(Listener<TickerUpdate>),
}

impl ListenerHandle {
    pub fn depth(callback: impl Fn(&DepthBook) + Send + Sync + 'static) -> Self {
        ListenerHandle::Depth(Arc::new(callback))
    }

    pub fn trade(callback: impl Fn(&TradeUpdate) + Send + Sync + 'static) -> Self {
        ListenerHandle::Trade(Arc::new(callback))
    }

    pub fn ticker(callback: impl Fn(&TickerUpdate) + Send + Sync + 'static) -> Self {
        ListenerHandle::Ticker(Arc::new(callback))
    }

    pub fn kind(&self) -> RoomKind {
        match self {
            ListenerHandle::Depth(_) => RoomKind::Depth,
            ListenerHandle::Trade(_) => RoomKind::Trade,
            ListenerHandle::Ticker(_) => RoomKind::Ticker,
        }
    }

    /// Reference equality; two separately created closures never match.
    pub fn same_callback(&self, other: &ListenerHandle) -> bool {
        match (self, other) {
            (ListenerHandle::Depth(a), ListenerHandle::Depth(b)) => Arc::ptr_eq(a, b),
            (ListenerHandle::Trade(a), ListenerHandle::Trade(b)) => Arc::ptr_eq(a, b),
            (ListenerHandle::Ticker(a), ListenerHandle::Ticker(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerHandle").field(&self.kind()).finish()
    }
}

#[derive(Debug)]
struct RoomEntry {
    room: Room,
    listeners: Vec<ListenerHandle>,
}

/// Listeners for one room, copied out of the registry at dispatch start.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room: Room,
    pub listeners: Vec<ListenerHandle>,
}

/// Room-keyed listener sets. Every mutation is a single map operation under the lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    rooms: RwLock<HashMap<String, RoomEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Duplicates are kept; the listener kind must match the room kind.
    pub fn register(&self, room: &Room, listener: ListenerHandle) -> Result<()> {
        if listener.kind() != room.kind() {
            return Err(FeedError::InvalidRoom(format!(
                "{} listener cannot be registered on {}",
                listener.kind(),
                room
            )));
        }

        let mut rooms = self.rooms.write();
        let entry = rooms.entry(room.key()).or_insert_with(|| RoomEntry {
            room: room.clone(),
            listeners: Vec::new(),
        });
        entry.listeners.push(listener);
        debug!(room = %room, listeners = entry.listeners.len(), "listener registered");
        Ok(())
    }

    /// Remove every exact-reference match. Returns how many were removed.
    pub fn deregister(&self, room: &Room, listener: &ListenerHandle) -> usize {
        let key = room.key();
        let mut rooms = self.rooms.write();
        let Some(entry) = rooms.get_mut(&key) else {
            return 0;
        };

        let before = entry.listeners.len();
        entry.listeners.retain(|existing| !existing.same_callback(listener));
        let removed = before - entry.listeners.len();
        if entry.listeners.is_empty() {
            rooms.remove(&key);
        }
        if removed > 0 {
            debug!(room = %room, removed, "listener deregistered");
        }
        removed
    }

    /// Copy of the listener list for a wire room key, `None` when nobody listens.
    pub fn snapshot(&self, room_key: &str) -> Option<RoomSnapshot> {
        let rooms = self.rooms.read();
        let entry = rooms.get(room_key)?;
        if entry.listeners.is_empty() {
            return None;
        }
        Some(RoomSnapshot {
            room: entry.room.clone(),
            listeners: entry.listeners.clone(),
        })
    }

    pub fn listener_count(&self, room: &Room) -> usize {
        self.rooms
            .read()
            .get(&room.key())
            .map_or(0, |entry| entry.listeners.len())
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.read().values().map(|entry| entry.room.clone()).collect()
    }
}
