/*
[INPUT]:  Snapshot API rows and decoded stream payloads
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::Side;

/// One `[price, quantity]` book level, decimal strings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(
    #[serde(
        deserialize_with = "serde_helpers::deserialize_decimal",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub Decimal,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_decimal",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub Decimal,
);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn quantity(&self) -> Decimal {
        self.1
    }
}

/// Order book sides as delivered to depth consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthBook {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// Trade print decoded from a `trade@` room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeUpdate {
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Option<Side>,
    /// Milliseconds since epoch.
    pub timestamp: Option<i64>,
}

/// Ticker payloads are owned by the consumer and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerUpdate(pub Value);

/// Historical trade row from the trades endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_decimal",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub price: Decimal,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_decimal",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "serde_helpers::deserialize_decimal_opt")]
    pub volume: Option<Decimal>,
    pub time: String,
    #[serde(default, alias = "market_ticker", alias = "currency_code")]
    pub market: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
}

impl TradeRecord {
    /// Same shape as a streamed trade, so snapshot rows and live prints share one table.
    pub fn to_update(&self) -> TradeUpdate {
        TradeUpdate {
            price: self.price,
            quantity: self.quantity,
            side: self.side.as_deref().and_then(Side::from_wire),
            timestamp: NumericField::from(self.time.as_str()).to_timestamp_ms(),
        }
    }
}

/// Market listing row; only `base_asset` is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTicker {
    pub base_asset: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Numeric value that may arrive as a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(serde_json::Number),
    Text(String),
}

impl NumericField {
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            NumericField::Number(number) => number.as_f64()?,
            NumericField::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Milliseconds since epoch from an integer, float or RFC 3339 string.
    pub fn to_timestamp_ms(&self) -> Option<i64> {
        match self {
            NumericField::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
            NumericField::Text(text) => {
                let text = text.trim();
                if let Ok(value) = text.parse::<i64>() {
                    return Some(value);
                }
                if let Ok(value) = text.parse::<f64>() {
                    return value.is_finite().then_some(value as i64);
                }
                chrono::DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            }
        }
    }
}

impl From<&str> for NumericField {
    fn from(value: &str) -> Self {
        NumericField::Text(value.to_string())
    }
}

impl From<i64> for NumericField {
    fn from(value: i64) -> Self {
        NumericField::Number(value.into())
    }
}

/// Snapshot or live bar record before numeric normalization.
///
/// Accepts both the object form (`{open, high, low, close, volume, start, end}`,
/// string fields) and the row form `[ts, open, high, low, close, volume]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBarWire")]
pub struct RawBarRecord {
    pub open: Option<NumericField>,
    pub high: Option<NumericField>,
    pub low: Option<NumericField>,
    pub close: Option<NumericField>,
    pub volume: Option<NumericField>,
    pub start: Option<NumericField>,
    pub end: Option<NumericField>,
}

impl RawBarRecord {
    /// Period timestamp field; the bucket start wins over the period end.
    pub fn timestamp_field(&self) -> Option<&NumericField> {
        self.start.as_ref().or(self.end.as_ref())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBarWire {
    Row(Vec<Option<NumericField>>),
    Object(RawBarObject),
}

#[derive(Deserialize)]
struct RawBarObject {
    #[serde(default)]
    open: Option<NumericField>,
    #[serde(default)]
    high: Option<NumericField>,
    #[serde(default)]
    low: Option<NumericField>,
    #[serde(default)]
    close: Option<NumericField>,
    #[serde(default)]
    volume: Option<NumericField>,
    #[serde(default, alias = "bucket", alias = "timestamp", alias = "time")]
    start: Option<NumericField>,
    #[serde(default)]
    end: Option<NumericField>,
}

impl From<RawBarWire> for RawBarRecord {
    fn from(wire: RawBarWire) -> Self {
        match wire {
            RawBarWire::Row(columns) => {
                let mut columns = columns.into_iter();
                let mut next = || columns.next().flatten();
                let start = next();
                RawBarRecord {
                    start,
                    open: next(),
                    high: next(),
                    low: next(),
                    close: next(),
                    volume: next(),
                    end: None,
                }
            }
            RawBarWire::Object(object) => RawBarRecord {
                open: object.open,
                high: object.high,
                low: object.low,
                close: object.close,
                volume: object.volume,
                start: object.start,
                end: object.end,
            },
        }
    }
}

pub mod serde_helpers {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn decimal_from_value(value: &Value) -> Result<Decimal, String> {
        match value {
            Value::String(raw) => {
                Decimal::from_str(raw.trim()).map_err(|err| format!("invalid decimal `{raw}`: {err}"))
            }
            Value::Number(number) => Decimal::from_str(&number.to_string())
                .or_else(|_| Decimal::from_scientific(&number.to_string()))
                .map_err(|err| format!("invalid decimal `{number}`: {err}")),
            other => Err(format!("expected decimal, found `{other}`")),
        }
    }

    pub fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        decimal_from_value(&value).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_decimal_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Null => Ok(None),
            Value::String(raw) if raw.trim().is_empty() => Ok(None),
            _ => decimal_from_value(&value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }

    pub fn serialize_decimal<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }
}
