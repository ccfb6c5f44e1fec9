//! Error taxonomy for order intake
//!
//! Validation failures reject the order before any book state changes; each
//! variant maps onto the reason/message pair carried by the OrderRejected
//! event.

use thiserror::Error;

/// Why an order was refused at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order is empty")]
    EmptyOrder,

    #[error("ticker is empty")]
    EmptyTicker,

    #[error("order id is empty")]
    EmptyOrderId,

    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("invalid limit price")]
    InvalidLimitPrice,
}

impl OrderError {
    /// Short reason carried on the OrderRejected event.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "Order is empty",
            OrderError::EmptyTicker => "Ticker is empty",
            OrderError::EmptyOrderId => "OrderId is empty",
            OrderError::InvalidQuantity => "Invalid quantity",
            OrderError::InvalidLimitPrice => "Invalid limit price",
        }
    }

    /// Human-readable message for the OrderRejected event.
    pub fn message(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "Order is empty",
            OrderError::EmptyTicker => "Ticker is empty",
            OrderError::EmptyOrderId => "OrderId is empty",
            OrderError::InvalidQuantity => "Quantity must be greater than 0",
            OrderError::InvalidLimitPrice => "Limit price must be greater than 0",
        }
    }
}
