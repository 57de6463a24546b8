/*
[INPUT]:  Public API exports for livefeed-chart crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod bars;
pub mod board;
pub mod config;
pub mod error;
pub mod feed;
pub mod sink;

// Re-export main types for convenience
pub use bars::{Bar, BarBuilder, BarUpdate, SeriesKey};
pub use board::{BoardListeners, MarketBoard};
pub use config::{ChartConfig, SeriesConfig};
pub use error::ChartError;
pub use feed::{FeedCoordinator, KlineSource};
pub use sink::{BarSink, LogSink};
