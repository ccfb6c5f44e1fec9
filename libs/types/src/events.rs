//! Lifecycle events and the wire envelope.
//!
//! Every event published to the stream is wrapped in an [`Event`] envelope
//! carrying a fresh UUID, an RFC 3339 timestamp, and the integer type code,
//! with the typed payload riding inside as nested JSON. Type codes and
//! payload keys are wire-stable; the listener depends on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::order::{OrderKind, Side};

/// Stable integer codes identifying each lifecycle event on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum EventType {
    OrderPlaced,
    OrderCancelled,
    OrderFilled,
    OrderPartiallyFilled,
    OrderRejected,
    TradeExecuted,
}

impl From<EventType> for i64 {
    fn from(event_type: EventType) -> i64 {
        match event_type {
            EventType::OrderPlaced => 0,
            EventType::OrderCancelled => 1,
            EventType::OrderFilled => 2,
            EventType::OrderPartiallyFilled => 3,
            EventType::OrderRejected => 4,
            EventType::TradeExecuted => 5,
        }
    }
}

impl TryFrom<i64> for EventType {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(EventType::OrderPlaced),
            1 => Ok(EventType::OrderCancelled),
            2 => Ok(EventType::OrderFilled),
            3 => Ok(EventType::OrderPartiallyFilled),
            4 => Ok(EventType::OrderRejected),
            5 => Ok(EventType::TradeExecuted),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub order_id: String,
    pub trader_id: i64,
    pub stock_ticker: String,
    pub order_type: OrderKind,
    pub order_side: Side,
    pub quantity: i64,
    pub limit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: String,
    pub trader_id: i64,
    pub order_type: OrderKind,
    pub order_side: Side,
    pub stock_ticker: String,
    pub remaining_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub order_id: String,
    pub trader_id: i64,
    pub total_quantity: i64,
    pub fill_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPartiallyFilledEvent {
    pub order_id: String,
    pub trader_id: i64,
    pub filled_quantity: i64,
    pub remaining_quantity: i64,
    pub fill_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub order_id: String,
    pub trader_id: i64,
    pub reason: String,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub stock_ticker: String,
    pub buyer_order_id: String,
    pub seller_order_id: String,
    pub buyer_order_type: OrderKind,
    pub buyer_trader_id: i64,
    pub seller_trader_id: i64,
    pub quantity: i64,
    pub price_cents: i64,
    pub total_value_cents: i64,
}

/// Sum of the six lifecycle events the engine can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    OrderPlaced(OrderPlacedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderFilled(OrderFilledEvent),
    OrderPartiallyFilled(OrderPartiallyFilledEvent),
    OrderRejected(OrderRejectedEvent),
    TradeExecuted(TradeExecutedEvent),
}

impl EngineEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            EngineEvent::OrderPlaced(_) => EventType::OrderPlaced,
            EngineEvent::OrderCancelled(_) => EventType::OrderCancelled,
            EngineEvent::OrderFilled(_) => EventType::OrderFilled,
            EngineEvent::OrderPartiallyFilled(_) => EventType::OrderPartiallyFilled,
            EngineEvent::OrderRejected(_) => EventType::OrderRejected,
            EngineEvent::TradeExecuted(_) => EventType::TradeExecuted,
        }
    }

    /// Serialize the payload alone, without the envelope.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EngineEvent::OrderPlaced(ev) => serde_json::to_value(ev),
            EngineEvent::OrderCancelled(ev) => serde_json::to_value(ev),
            EngineEvent::OrderFilled(ev) => serde_json::to_value(ev),
            EngineEvent::OrderPartiallyFilled(ev) => serde_json::to_value(ev),
            EngineEvent::OrderRejected(ev) => serde_json::to_value(ev),
            EngineEvent::TradeExecuted(ev) => serde_json::to_value(ev),
        }
    }
}

/// Wire envelope around a single event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum EventCodecError {
    #[error("event JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wrap `event` in an envelope with a fresh id and serialize to JSON bytes.
pub fn encode_event(event: &EngineEvent) -> Result<Vec<u8>, EventCodecError> {
    let envelope = Event {
        event_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        event_type: event.event_type(),
        data: event.payload_json()?,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse an envelope and its typed payload back out of JSON bytes.
pub fn decode_event(data: &[u8]) -> Result<(Event, EngineEvent), EventCodecError> {
    let envelope: Event = serde_json::from_slice(data)?;
    let payload = match envelope.event_type {
        EventType::OrderPlaced => {
            EngineEvent::OrderPlaced(serde_json::from_value(envelope.data.clone())?)
        }
        EventType::OrderCancelled => {
            EngineEvent::OrderCancelled(serde_json::from_value(envelope.data.clone())?)
        }
        EventType::OrderFilled => {
            EngineEvent::OrderFilled(serde_json::from_value(envelope.data.clone())?)
        }
        EventType::OrderPartiallyFilled => {
            EngineEvent::OrderPartiallyFilled(serde_json::from_value(envelope.data.clone())?)
        }
        EventType::OrderRejected => {
            EngineEvent::OrderRejected(serde_json::from_value(envelope.data.clone())?)
        }
        EventType::TradeExecuted => {
            EngineEvent::TradeExecuted(serde_json::from_value(envelope.data.clone())?)
        }
    };
    Ok((envelope, payload))
}
