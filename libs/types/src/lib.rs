//! Shared domain types for the trading pipeline.
//!
//! Both processes (the matching engine server and the event listener) speak
//! the vocabulary defined here: the order model, the lifecycle event sum
//! type, the wire envelope, and the validation error taxonomy.

pub mod errors;
pub mod events;
pub mod order;

pub use errors::OrderError;
pub use events::{EngineEvent, Event, EventType};
pub use order::{MatchEvent, Order, OrderKind, Side};
