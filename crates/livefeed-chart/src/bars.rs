/*
[INPUT]:  Raw bar records from snapshots, polls or live ticks
[OUTPUT]: Strictly time-ordered bars per series + new-period/in-place signals
[POS]:    Aggregation layer - owns the per-series cursor
[UPDATE]: When changing bucket alignment, dedupe rules or numeric parsing
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use livefeed_adapter::{Interval, NumericField, RawBarRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

const PARSE_FAIL_LOG_LIMIT: usize = 10;
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// One chart series: a market at a bar interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SeriesKey {
    pub market: String,
    pub interval: Interval,
}

impl SeriesKey {
    pub fn new(market: impl Into<String>, interval: Interval) -> Self {
        Self {
            market: market.into(),
            interval,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.market, self.interval)
    }
}

/// Normalized OHLCV bar; `timestamp` is the bucket start in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: f64,
}

/// Result of applying one incremental record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarUpdate {
    pub bar: Bar,
    /// `true` starts a new candle, `false` revises the current one.
    pub new_period: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarParseError {
    #[error("record has no timestamp")]
    MissingTimestamp,
    #[error("unparseable timestamp")]
    InvalidTimestamp,
    #[error("record has no close price")]
    MissingClose,
    #[error("non-numeric `{0}` field")]
    InvalidNumber(&'static str),
}

/// Parse and bucket-align one raw record.
///
/// A record carrying only `end` is placed in the bucket that contains `end - 1ms`,
/// so both inclusive and exclusive period ends land in the right bucket.
pub fn normalize(record: &RawBarRecord, interval: Interval) -> Result<Bar, BarParseError> {
    let timestamp = match (&record.start, &record.end) {
        (Some(start), _) => start.to_timestamp_ms().ok_or(BarParseError::InvalidTimestamp)?,
        (None, Some(end)) => end
            .to_timestamp_ms()
            .ok_or(BarParseError::InvalidTimestamp)?
            .saturating_sub(1),
        (None, None) => return Err(BarParseError::MissingTimestamp),
    };
    let timestamp = interval
        .bucket_start(timestamp)
        .ok_or(BarParseError::InvalidTimestamp)?;

    let close = record.close.as_ref().ok_or(BarParseError::MissingClose)?;
    Ok(Bar {
        timestamp,
        open: optional_number(record.open.as_ref(), "open")?,
        high: optional_number(record.high.as_ref(), "high")?,
        low: optional_number(record.low.as_ref(), "low")?,
        close: close.to_f64().ok_or(BarParseError::InvalidNumber("close"))?,
        volume: optional_number(record.volume.as_ref(), "volume")?.unwrap_or(0.0),
    })
}

fn optional_number(
    field: Option<&NumericField>,
    name: &'static str,
) -> Result<Option<f64>, BarParseError> {
    field
        .map(|value| value.to_f64().ok_or(BarParseError::InvalidNumber(name)))
        .transpose()
}

#[derive(Debug, Default)]
struct Series {
    bars: Vec<Bar>,
    cursor: i64,
}

/// Committed bar sequences and cursors for every series.
#[derive(Debug, Default)]
pub struct BarBuilder {
    series: HashMap<SeriesKey, Series>,
    rejected: u64,
}

impl BarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series history with a snapshot.
    ///
    /// Records are sorted ascending and deduplicated by bucket; among duplicates the
    /// later record in the input wins. With no usable records the cursor is set to the
    /// bucket containing `now_ms`.
    pub fn seed(&mut self, key: &SeriesKey, records: &[RawBarRecord], now_ms: i64) -> &[Bar] {
        let mut parsed: Vec<Bar> = records
            .iter()
            .filter_map(|record| self.parse(key, record))
            .collect();
        parsed.sort_by_key(|bar| bar.timestamp);

        let mut bars: Vec<Bar> = Vec::with_capacity(parsed.len());
        for bar in parsed {
            match bars.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => bars.push(bar),
            }
        }

        let cursor = bars
            .last()
            .map_or_else(
                || key.interval.bucket_start(now_ms).unwrap_or(now_ms),
                |bar| bar.timestamp,
            );
        debug!(series = %key, bars = bars.len(), cursor, "series seeded");

        let series = self.series.entry(key.clone()).or_default();
        series.bars = bars;
        series.cursor = cursor;
        &series.bars
    }

    /// Fold one record into the series.
    ///
    /// Newer than the cursor starts a new period, equal revises the last bar, older is
    /// discarded. Unparseable records are discarded with a warning.
    pub fn apply_incremental(&mut self, key: &SeriesKey, record: &RawBarRecord) -> Option<BarUpdate> {
        let bar = self.parse(key, record)?;
        let series = self.series.entry(key.clone()).or_default();

        if bar.timestamp > series.cursor {
            series.bars.push(bar);
            series.cursor = bar.timestamp;
            return Some(BarUpdate {
                bar,
                new_period: true,
            });
        }

        if bar.timestamp == series.cursor {
            return match series.bars.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => {
                    *last = bar;
                    Some(BarUpdate {
                        bar,
                        new_period: false,
                    })
                }
                // Cursor came from an empty seed; this is the first bar of the series.
                _ => {
                    series.bars.push(bar);
                    Some(BarUpdate {
                        bar,
                        new_period: true,
                    })
                }
            };
        }

        debug!(
            series = %key,
            timestamp = bar.timestamp,
            cursor = series.cursor,
            "stale bar discarded"
        );
        None
    }

    pub fn bars(&self, key: &SeriesKey) -> &[Bar] {
        self.series
            .get(key)
            .map(|series| series.bars.as_slice())
            .unwrap_or_default()
    }

    pub fn cursor(&self, key: &SeriesKey) -> Option<i64> {
        self.series.get(key).map(|series| series.cursor)
    }

    pub fn clear(&mut self, key: &SeriesKey) {
        self.series.remove(key);
    }

    /// Records discarded for parse failures since construction.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn parse(&mut self, key: &SeriesKey, record: &RawBarRecord) -> Option<Bar> {
        match normalize(record, key.interval) {
            Ok(bar) => Some(bar),
            Err(err) => {
                self.rejected += 1;
                let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
                if count < PARSE_FAIL_LOG_LIMIT {
                    warn!(
                        series = %key,
                        error = %err,
                        sample_index = count + 1,
                        sample_limit = PARSE_FAIL_LOG_LIMIT,
                        "bar record dropped"
                    );
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;
    const BASE: i64 = 1_700_000_040_000; // minute-aligned

    fn record(ts: i64, close: &str) -> RawBarRecord {
        RawBarRecord {
            open: Some("1".into()),
            high: Some("2".into()),
            low: Some("0.5".into()),
            close: Some(close.into()),
            volume: Some("10".into()),
            start: Some(ts.into()),
            end: None,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("SOL_USDC", Interval::OneMinute)
    }

    #[test]
    fn seed_sorts_and_dedupes_last_wins() {
        let mut builder = BarBuilder::new();
        let records = vec![
            record(BASE + 2 * MINUTE, "3"),
            record(BASE, "1"),
            record(BASE + MINUTE, "2"),
            record(BASE + MINUTE + 5_000, "2.5"),
        ];
        let bars = builder.seed(&key(), &records, BASE + 10 * MINUTE);
        let summary: Vec<(i64, f64)> = bars.iter().map(|bar| (bar.timestamp, bar.close)).collect();
        assert_eq!(
            summary,
            vec![(BASE, 1.0), (BASE + MINUTE, 2.5), (BASE + 2 * MINUTE, 3.0)]
        );
        assert_eq!(builder.cursor(&key()), Some(BASE + 2 * MINUTE));
    }

    #[test]
    fn empty_seed_sets_cursor_to_current_bucket() {
        let mut builder = BarBuilder::new();
        builder.seed(&key(), &[], BASE + 30_000);
        assert_eq!(builder.cursor(&key()), Some(BASE));
        assert!(builder.bars(&key()).is_empty());

        let update = builder
            .apply_incremental(&key(), &record(BASE + 1_000, "5"))
            .expect("first bar");
        assert!(update.new_period);
        assert_eq!(builder.bars(&key()).len(), 1);
    }

    #[test]
    fn out_of_order_record_is_ignored() {
        let mut builder = BarBuilder::new();
        let k = key();

        assert!(builder.apply_incremental(&k, &record(BASE + MINUTE, "1")).is_some());
        assert!(builder.apply_incremental(&k, &record(BASE + 3 * MINUTE, "3")).is_some());
        assert!(builder.apply_incremental(&k, &record(BASE + 2 * MINUTE, "2")).is_none());

        assert_eq!(builder.cursor(&k), Some(BASE + 3 * MINUTE));
        let stamps: Vec<i64> = builder.bars(&k).iter().map(|bar| bar.timestamp).collect();
        assert_eq!(stamps, vec![BASE + MINUTE, BASE + 3 * MINUTE]);
    }

    #[test]
    fn same_bucket_revises_in_place() {
        let mut builder = BarBuilder::new();
        let k = key();
        builder.seed(&k, &[record(BASE, "1")], BASE);

        let update = builder
            .apply_incremental(&k, &record(BASE + 20_000, "1.7"))
            .expect("revision");
        assert!(!update.new_period);
        assert_eq!(builder.bars(&k).len(), 1);
        assert_eq!(builder.bars(&k)[0].close, 1.7);
        assert_eq!(builder.cursor(&k), Some(BASE));
    }

    #[test]
    fn repeated_record_is_idempotent() {
        let mut builder = BarBuilder::new();
        let k = key();
        builder.seed(&k, &[record(BASE, "1")], BASE);

        let tick = record(BASE + MINUTE, "4");
        builder.apply_incremental(&k, &tick);
        let once = builder.bars(&k).to_vec();
        builder.apply_incremental(&k, &tick);
        assert_eq!(builder.bars(&k), once.as_slice());
        assert_eq!(builder.cursor(&k), Some(BASE + MINUTE));
    }

    #[test]
    fn malformed_record_is_dropped() {
        let mut builder = BarBuilder::new();
        let k = key();
        builder.seed(&k, &[record(BASE, "1")], BASE);

        assert!(builder.apply_incremental(&k, &record(BASE + MINUTE, "n/a")).is_none());
        let mut no_time = record(BASE + MINUTE, "1");
        no_time.start = None;
        assert!(builder.apply_incremental(&k, &no_time).is_none());

        assert_eq!(builder.rejected(), 2);
        assert_eq!(builder.cursor(&k), Some(BASE));
    }

    #[test]
    fn out_of_range_timestamp_is_dropped() {
        let mut builder = BarBuilder::new();
        let k = key();
        builder.seed(&k, &[record(BASE, "1")], BASE);

        let mut far_past = record(0, "7");
        far_past.start = Some("-1e30".into());
        assert_eq!(normalize(&far_past, Interval::OneMinute), Err(BarParseError::InvalidTimestamp));
        assert!(builder.apply_incremental(&k, &far_past).is_none());

        let mut end_only = record(0, "7");
        end_only.start = None;
        end_only.end = Some("-1e30".into());
        assert!(builder.apply_incremental(&k, &end_only).is_none());

        let mut weekly = record(0, "7");
        weekly.start = Some((i64::MIN + 1).into());
        let week_key = SeriesKey::new("SOL_USDC", Interval::OneWeek);
        let bars = builder.seed(&week_key, &[weekly, record(BASE, "2")], BASE);
        assert_eq!(bars.len(), 1);

        assert_eq!(builder.rejected(), 3);
        assert_eq!(builder.cursor(&k), Some(BASE));
        assert_eq!(builder.bars(&k).len(), 1);
    }

    #[test]
    fn end_only_record_lands_in_its_own_bucket() {
        let mut raw = record(0, "9");
        raw.start = None;
        raw.end = Some("2024-01-02T00:00:00Z".into());
        let bar = normalize(&raw, Interval::OneDay).expect("bar");
        assert_eq!(bar.timestamp, 1_704_067_200_000);

        raw.volume = None;
        raw.open = None;
        let bar = normalize(&raw, Interval::OneDay).expect("bar");
        assert_eq!(bar.volume, 0.0);
        assert_eq!(bar.open, None);
    }
}
