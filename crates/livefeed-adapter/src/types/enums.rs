/*
[INPUT]:  Wire strings for topic kinds, bar intervals and trade sides
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When adding topic kinds or supported intervals
*/

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
/// 1970-01-01 is a Thursday; the first Monday is four days later.
const WEEK_ANCHOR_MS: i64 = 4 * DAY_MS;

/// Topic kind of a room, the part before the first `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Depth,
    Trade,
    Ticker,
}

impl RoomKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RoomKind::Depth => "depth",
            RoomKind::Trade => "trade",
            RoomKind::Ticker => "ticker",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "depth" => Ok(RoomKind::Depth),
            "trade" => Ok(RoomKind::Trade),
            "ticker" => Ok(RoomKind::Ticker),
            other => Err(format!("unknown room kind `{other}`")),
        }
    }
}

/// Candlestick interval supported by the klines endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
        }
    }

    /// Width of one bar in milliseconds.
    pub const fn bucket_ms(self) -> i64 {
        match self {
            Interval::OneMinute => MINUTE_MS,
            Interval::OneHour => HOUR_MS,
            Interval::OneDay => DAY_MS,
            Interval::OneWeek => WEEK_MS,
        }
    }

    /// How far back the bootstrap snapshot reaches.
    pub const fn lookback(self) -> Duration {
        match self {
            Interval::OneMinute => Duration::from_secs(60 * 60),
            Interval::OneHour => Duration::from_secs(7 * 24 * 60 * 60),
            Interval::OneDay => Duration::from_secs(180 * 24 * 60 * 60),
            Interval::OneWeek => Duration::from_secs(104 * 7 * 24 * 60 * 60),
        }
    }

    /// Start of the bucket containing `timestamp_ms`. Weekly buckets start on Monday UTC.
    ///
    /// `None` when the bucket start is not representable as an `i64`.
    pub fn bucket_start(self, timestamp_ms: i64) -> Option<i64> {
        let width = self.bucket_ms();
        let anchor = match self {
            Interval::OneWeek => WEEK_ANCHOR_MS,
            _ => 0,
        };
        let offset = timestamp_ms.checked_sub(anchor)?.checked_rem_euclid(width)?;
        timestamp_ms.checked_sub(offset)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1m" => Ok(Interval::OneMinute),
            "1h" => Ok(Interval::OneHour),
            "1d" => Ok(Interval::OneDay),
            "1w" => Ok(Interval::OneWeek),
            other => Err(format!("invalid interval `{other}` (must be one of 1m|1h|1d|1w)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lenient parse of the side strings seen on the wire (`buy`, `Bid`, `SELL`, ...).
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" => Some(Side::Buy),
            "sell" | "ask" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trips_wire_strings() {
        for value in ["1m", "1h", "1d", "1w"] {
            let interval: Interval = value.parse().expect("interval");
            assert_eq!(interval.as_str(), value);
        }
        assert!("5m".parse::<Interval>().is_err());
    }

    #[test]
    fn bucket_start_aligns_to_width() {
        assert_eq!(Interval::OneMinute.bucket_start(125_000), Some(120_000));
        assert_eq!(Interval::OneMinute.bucket_start(120_000), Some(120_000));
        assert_eq!(Interval::OneHour.bucket_start(HOUR_MS + 1), Some(HOUR_MS));
    }

    #[test]
    fn bucket_start_rejects_unrepresentable_timestamps() {
        assert_eq!(Interval::OneMinute.bucket_start(i64::MIN), None);
        assert_eq!(Interval::OneWeek.bucket_start(i64::MIN + 1), None);
        assert!(Interval::OneDay.bucket_start(i64::MAX).is_some());
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // 2024-01-03 (Wednesday) 12:00 UTC
        let wednesday = 1_704_283_200_000;
        // 2024-01-01 (Monday) 00:00 UTC
        let monday = 1_704_067_200_000;
        assert_eq!(Interval::OneWeek.bucket_start(wednesday), Some(monday));
    }

    #[test]
    fn side_parses_loosely() {
        assert_eq!(Side::from_wire("Buy"), Some(Side::Buy));
        assert_eq!(Side::from_wire("ask"), Some(Side::Sell));
        assert_eq!(Side::from_wire("hold"), None);
    }
}
