/*
[INPUT]:  Depth/trade/ticker listener callbacks; REST snapshots at startup
[OUTPUT]: Latest depth, recent trades (newest first) and ticker for one market
[POS]:    UI state layer - what a market page reads
[UPDATE]: When the trade table depth or the tracked payloads change
*/

use std::collections::VecDeque;
use std::sync::Arc;

use livefeed_adapter::{
    DepthBook, ListenerHandle, MarketStream, Room, TickerUpdate, TradeRecord, TradeUpdate,
};
use parking_lot::RwLock;
use tracing::debug;

/// Rows kept in the recent-trades table.
pub const TRADE_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default)]
struct BoardState {
    depth: Option<DepthBook>,
    trades: VecDeque<TradeUpdate>,
    ticker: Option<TickerUpdate>,
}

/// The three handles registered for one board; keep them to detach later.
#[derive(Debug, Clone)]
pub struct BoardListeners {
    pub depth: ListenerHandle,
    pub trade: ListenerHandle,
    pub ticker: ListenerHandle,
}

#[derive(Debug, Clone)]
pub struct MarketBoard {
    market: String,
    state: Arc<RwLock<BoardState>>,
}

impl MarketBoard {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            state: Arc::new(RwLock::new(BoardState::default())),
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn depth(&self) -> Option<DepthBook> {
        self.state.read().depth.clone()
    }

    /// Newest first.
    pub fn trades(&self) -> Vec<TradeUpdate> {
        self.state.read().trades.iter().cloned().collect()
    }

    pub fn ticker(&self) -> Option<TickerUpdate> {
        self.state.read().ticker.clone()
    }

    pub fn set_depth(&self, depth: DepthBook) {
        self.state.write().depth = Some(depth);
    }

    pub fn push_trade(&self, trade: TradeUpdate) {
        let mut state = self.state.write();
        state.trades.push_front(trade);
        state.trades.truncate(TRADE_HISTORY_LIMIT);
    }

    pub fn set_ticker(&self, ticker: TickerUpdate) {
        self.state.write().ticker = Some(ticker);
    }

    /// Replace the trade table with snapshot rows (given newest first).
    pub fn seed_trades(&self, records: &[TradeRecord]) {
        let mut state = self.state.write();
        state.trades = records
            .iter()
            .take(TRADE_HISTORY_LIMIT)
            .map(TradeRecord::to_update)
            .collect();
        debug!(market = %self.market, trades = state.trades.len(), "trade table seeded");
    }

    /// Listener handles that write into this board.
    pub fn listeners(&self) -> BoardListeners {
        let depth_board = self.clone();
        let trade_board = self.clone();
        let ticker_board = self.clone();
        BoardListeners {
            depth: ListenerHandle::depth(move |depth| depth_board.set_depth(depth.clone())),
            trade: ListenerHandle::trade(move |trade| trade_board.push_trade(trade.clone())),
            ticker: ListenerHandle::ticker(move |ticker| ticker_board.set_ticker(ticker.clone())),
        }
    }

    fn rooms(&self) -> [Room; 3] {
        [
            Room::depth(&self.market),
            Room::trade(&self.market),
            Room::ticker(&self.market),
        ]
    }

    /// Register this board's listeners and subscribe its rooms.
    pub fn attach(&self, stream: &MarketStream) -> livefeed_adapter::Result<BoardListeners> {
        let listeners = self.listeners();
        let [depth, trade, ticker] = self.rooms();
        stream.register(&depth, listeners.depth.clone())?;
        stream.register(&trade, listeners.trade.clone())?;
        stream.register(&ticker, listeners.ticker.clone())?;
        for room in [&depth, &trade, &ticker] {
            stream.subscribe(room);
        }
        debug!(market = %self.market, "board attached");
        Ok(listeners)
    }

    /// Unsubscribe the rooms and drop the listeners returned by `attach`.
    pub fn detach(&self, stream: &MarketStream, listeners: &BoardListeners) {
        let [depth, trade, ticker] = self.rooms();
        stream.deregister(&depth, &listeners.depth);
        stream.deregister(&trade, &listeners.trade);
        stream.deregister(&ticker, &listeners.ticker);
        for room in [&depth, &trade, &ticker] {
            stream.unsubscribe(room);
        }
        debug!(market = %self.market, "board detached");
    }
}
