/*
[INPUT]:  Outbound control requests; raw inbound envelope text
[OUTPUT]: Stamped wire frames; decoded depth/trade/ticker payloads
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new message types or changing format
*/

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::serde_helpers::decimal_from_value;
use crate::types::{DepthBook, PriceLevel, Room, Side, TickerUpdate, TradeUpdate};

/// Trade timestamps below this are taken to be seconds rather than milliseconds.
const SECONDS_CUTOFF: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Subscribe,
    Unsubscribe,
}

impl ControlType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlType::Subscribe => "SUBSCRIBE",
            ControlType::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// Outbound message waiting for its sequence id.
///
/// The id is assigned when the frame is actually written, so ids on the wire are
/// strictly increasing in transmit order.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    body: Map<String, Value>,
}

impl PendingMessage {
    pub fn control(kind: ControlType, room: &Room) -> Self {
        let mut payload = Map::new();
        payload.insert("room".to_string(), Value::String(room.key()));

        let mut body = Map::new();
        body.insert("type".to_string(), Value::from(kind.as_str()));
        body.insert("payload".to_string(), Value::Object(payload));
        Self { body }
    }

    pub fn subscribe(room: &Room) -> Self {
        Self::control(ControlType::Subscribe, room)
    }

    pub fn unsubscribe(room: &Room) -> Self {
        Self::control(ControlType::Unsubscribe, room)
    }

    /// Arbitrary JSON object; any `id` it carries is overwritten at send time.
    pub fn raw(body: Map<String, Value>) -> Self {
        Self { body }
    }

    pub fn message_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    pub fn room(&self) -> Option<&str> {
        self.body
            .get("payload")
            .and_then(|payload| payload.get("room"))
            .and_then(Value::as_str)
    }

    /// JSON text of the frame with `id` stamped in.
    pub fn encode(&self, id: u64) -> String {
        let mut body = self.body.clone();
        body.insert("id".to_string(), Value::from(id));
        Value::Object(body).to_string()
    }
}

/// Top-level inbound frame `{ room, data }`; `data` normally holds JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub room: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode the inner payload. Only called once a listener is known to exist.
    pub fn decode_data(&self) -> Result<Value, PayloadError> {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw).map_err(PayloadError::InvalidJson),
            Value::Null => Err(PayloadError::MissingField("data")),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("inner payload is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// The engine publishes `{ stream, data: { a, b, e } }`; peel the wrapper when present.
fn unwrap_data(inner: &Value) -> &Value {
    match inner.get("data") {
        Some(data @ Value::Object(_)) => data,
        _ => inner,
    }
}

fn present<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    body.get(key).filter(|value| !value.is_null())
}

fn levels(value: Option<&Value>, field: &'static str) -> Result<Vec<PriceLevel>, PayloadError> {
    match value {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
            PayloadError::InvalidField {
                field,
                reason: err.to_string(),
            }
        }),
    }
}

/// Depth payload with `a`/`b` level arrays. `Ok(None)` when both sides are absent.
pub fn decode_depth(inner: &Value) -> Result<Option<DepthBook>, PayloadError> {
    let body = unwrap_data(inner);
    let asks = present(body, "a");
    let bids = present(body, "b");
    if asks.is_none() && bids.is_none() {
        return Ok(None);
    }

    Ok(Some(DepthBook {
        bids: levels(bids, "b")?,
        asks: levels(asks, "a")?,
    }))
}

/// Trade payload `{ price, quantity, side, timestamp }`; `price` is required.
pub fn decode_trade(inner: &Value) -> Result<TradeUpdate, PayloadError> {
    let body = unwrap_data(inner);
    let price = present(body, "price").ok_or(PayloadError::MissingField("price"))?;
    let price = decimal_from_value(price).map_err(|reason| PayloadError::InvalidField {
        field: "price",
        reason,
    })?;

    let quantity = match present(body, "quantity") {
        Some(value) => decimal_from_value(value).map_err(|reason| PayloadError::InvalidField {
            field: "quantity",
            reason,
        })?,
        None => rust_decimal::Decimal::ZERO,
    };

    let side = present(body, "side")
        .and_then(Value::as_str)
        .and_then(Side::from_wire);

    let timestamp = present(body, "timestamp")
        .and_then(|value| value.as_i64().or_else(|| value.as_str()?.trim().parse().ok()))
        .map(normalize_epoch_ms);

    Ok(TradeUpdate {
        price,
        quantity,
        side,
        timestamp,
    })
}

pub fn decode_ticker(inner: Value) -> TickerUpdate {
    TickerUpdate(inner)
}

fn normalize_epoch_ms(value: i64) -> i64 {
    if value.abs() < SECONDS_CUTOFF {
        value.saturating_mul(1_000)
    } else {
        value
    }
}
