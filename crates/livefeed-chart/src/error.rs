/*
[INPUT]:  Failures from snapshot fetches, activation races and configuration
[OUTPUT]: Typed chart errors for callers of the feed coordinator
[POS]:    Error layer - chart crate
[UPDATE]: When adding new failure modes
*/

use livefeed_adapter::FeedError;
use thiserror::Error;

use crate::bars::SeriesKey;

#[derive(Debug, Error)]
pub enum ChartError {
    /// Bootstrap fetch failed; the caller may activate again later.
    #[error("snapshot fetch failed: {0}")]
    Snapshot(#[from] FeedError),

    /// Another activation or a deactivation happened while the snapshot was in flight.
    #[error("activation of {0} was superseded")]
    Superseded(SeriesKey),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChartError>;
