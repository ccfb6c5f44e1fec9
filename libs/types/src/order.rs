//! Order model
//!
//! All monetary fields are integer cents and all quantities are whole
//! shares. Transport enums arrive 1-based and are mapped to the 0-based
//! internal codes below; event payloads serialize the internal codes as
//! plain integers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the book an order falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Map the 1-based transport encoding: 1 is a buy, anything else a sell.
    pub fn from_wire(raw: i32) -> Self {
        if raw == 1 {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl From<Side> for i64 {
    fn from(side: Side) -> i64 {
        match side {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

impl TryFrom<i64> for Side {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            other => Err(format!("invalid order side: {other}")),
        }
    }
}

/// Market or limit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    /// Map the 1-based transport encoding: 1 is market, anything else limit.
    pub fn from_wire(raw: i32) -> Self {
        if raw == 1 {
            OrderKind::Market
        } else {
            OrderKind::Limit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
        }
    }
}

impl From<OrderKind> for i64 {
    fn from(kind: OrderKind) -> i64 {
        match kind {
            OrderKind::Market => 0,
            OrderKind::Limit => 1,
        }
    }
}

impl TryFrom<i64> for OrderKind {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(OrderKind::Market),
            1 => Ok(OrderKind::Limit),
            other => Err(format!("invalid order type: {other}")),
        }
    }
}

/// An accepted order.
///
/// Identity fields never change after acceptance; `quantity` only ever
/// decreases as fills are taken off it. `limit_price_cents` is meaningful
/// for limit orders only, `available_balance_cents` for market buys only.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub trader_id: i64,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: i64,
    pub limit_price_cents: i64,
    pub available_balance_cents: i64,
    pub timestamp: DateTime<Utc>,
}

/// A single fill produced while walking the opposite side of the book.
///
/// Internal to a submit call; its information reaches the stream split
/// across TradeExecuted and the per-order fill events.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub buyer_order_id: String,
    pub seller_order_id: String,
    pub price_cents: i64,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}
