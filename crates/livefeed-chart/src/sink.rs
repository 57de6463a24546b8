/*
[INPUT]:  Seeded history and incremental bar updates from the feed coordinator
[OUTPUT]: Rendered (here: logged) candles, last bar per series
[POS]:    Presentation seam - where bars leave the aggregation core
[UPDATE]: When the sink contract or the logging sink output changes
*/

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bars::{Bar, BarUpdate, SeriesKey};

/// Receives bars for rendering. Calls for one series arrive in order.
pub trait BarSink: Send + Sync {
    /// Replace everything drawn for the series.
    fn set_history(&self, key: &SeriesKey, bars: &[Bar]);

    /// Start a new candle (`new_period`) or revise the current one.
    fn update(&self, key: &SeriesKey, update: &BarUpdate);
}

/// Sink that writes bars to the tracing log.
#[derive(Debug, Default)]
pub struct LogSink {
    last: Mutex<HashMap<SeriesKey, Bar>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_bar(&self, key: &SeriesKey) -> Option<Bar> {
        self.last.lock().get(key).copied()
    }
}

impl BarSink for LogSink {
    fn set_history(&self, key: &SeriesKey, bars: &[Bar]) {
        let mut last = self.last.lock();
        match bars.last() {
            Some(bar) => {
                last.insert(key.clone(), *bar);
                info!(
                    series = %key,
                    bars = bars.len(),
                    first = bars.first().map_or(bar.timestamp, |first| first.timestamp),
                    last = bar.timestamp,
                    close = bar.close,
                    "history loaded"
                );
            }
            None => {
                last.remove(key);
                info!(series = %key, "history loaded (empty)");
            }
        }
    }

    fn update(&self, key: &SeriesKey, update: &BarUpdate) {
        self.last.lock().insert(key.clone(), update.bar);
        if update.new_period {
            info!(
                series = %key,
                timestamp = update.bar.timestamp,
                close = update.bar.close,
                volume = update.bar.volume,
                "new candle"
            );
        } else {
            debug!(
                series = %key,
                timestamp = update.bar.timestamp,
                close = update.bar.close,
                volume = update.bar.volume,
                "candle updated"
            );
        }
    }
}
