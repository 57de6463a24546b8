/*
[INPUT]:  Topic kind + market identifier, or a `kind@market` room string
[OUTPUT]: Typed Room key used by the registry and control messages
[POS]:    Data layer - multiplexed topic identifiers
[UPDATE]: When the room naming scheme changes
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::enums::RoomKind;
use crate::http::FeedError;

/// A multiplexed topic, `kind@market` on the wire.
///
/// The kind is resolved once here so routing never has to re-inspect the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room {
    kind: RoomKind,
    market: String,
}

impl Room {
    pub fn new(kind: RoomKind, market: impl Into<String>) -> Self {
        Self {
            kind,
            market: market.into(),
        }
    }

    pub fn depth(market: impl Into<String>) -> Self {
        Self::new(RoomKind::Depth, market)
    }

    pub fn trade(market: impl Into<String>) -> Self {
        Self::new(RoomKind::Trade, market)
    }

    pub fn ticker(market: impl Into<String>) -> Self {
        Self::new(RoomKind::Ticker, market)
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Wire form, e.g. `depth@BTC_USDC`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.market)
    }
}

impl FromStr for Room {
    type Err = FeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, market) = value
            .split_once('@')
            .ok_or_else(|| FeedError::InvalidRoom(format!("missing `@` in `{value}`")))?;
        let kind = kind.parse::<RoomKind>().map_err(FeedError::InvalidRoom)?;
        if market.is_empty() {
            return Err(FeedError::InvalidRoom(format!("empty market in `{value}`")));
        }
        Ok(Room::new(kind, market))
    }
}

impl Serialize for Room {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_parses_kind_before_first_at() {
        let room: Room = "depth@SOL_USDC".parse().expect("room");
        assert_eq!(room.kind(), RoomKind::Depth);
        assert_eq!(room.market(), "SOL_USDC");
        assert_eq!(room.key(), "depth@SOL_USDC");

        let odd: Room = "trade@A@B".parse().expect("room");
        assert_eq!(odd.kind(), RoomKind::Trade);
        assert_eq!(odd.market(), "A@B");
    }

    #[test]
    fn room_rejects_unknown_kind_and_empty_market() {
        assert!("kline@BTC_USDC".parse::<Room>().is_err());
        assert!("depth@".parse::<Room>().is_err());
        assert!("depth".parse::<Room>().is_err());
    }

    #[test]
    fn room_serializes_as_wire_string() {
        let value = serde_json::to_value(Room::ticker("BTC_USDC")).expect("serialize");
        assert_eq!(value, serde_json::json!("ticker@BTC_USDC"));
    }
}
