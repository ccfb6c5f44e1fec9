//! Wire request/response shapes for the order API.
//!
//! Enum fields are 1-based on the wire: side 1 = buy, 2 = sell; order_type
//! 1 = market, 2 = limit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub trader_id: i64,
    pub stock_ticker: String,
    pub side: i32,
    pub order_type: i32,
    pub quantity: i64,
    #[serde(default)]
    pub limit_price_cents: i64,
    #[serde(default)]
    pub available_balance_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub success: bool,
    pub order_id: String,
    pub was_filled_immediately: bool,
    pub filled_quantity: i64,
    pub average_fill_price_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrderRequest {
    pub stock_ticker: String,
    pub order_id: String,
    pub side: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderResponse {
    pub success: bool,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub is_healthy: bool,
    pub orders_processed: u64,
    pub uptime_seconds: u64,
}
