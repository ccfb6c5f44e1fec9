//! Event Stream Service
//!
//! Carries engine lifecycle events to the durable Valkey stream and reads
//! them back on the listener side.
//!
//! The publisher half is a message-passing actor: producers enqueue onto a
//! bounded channel, a single background worker drains it to the stream with
//! retry, backoff, and health gating. The consumer half is a blocking read
//! loop with a cursor, feeding an idempotent sink.

pub mod consumer;
pub mod publisher;
pub mod testing;
pub mod valkey;

use std::time::Duration;

use async_trait::async_trait;
use types::events::{EngineEvent, EventCodecError, EventType};

pub use consumer::{EventSink, SinkError, StreamConsumer};
pub use publisher::{PublisherConfig, StreamPublisher};
pub use valkey::{ValkeyEventStream, ValkeyOptions, ValkeyTransport};

/// Asynchronous, buffered event publication.
///
/// Implementations serialize the event, buffer it, and deliver it from a
/// background worker; `publish` returns once the event is queued, not once
/// it is durable.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Queue an event for delivery. Waits at most the enqueue timeout for
    /// buffer space.
    async fn publish(&self, event: EngineEvent) -> Result<(), StreamError>;

    /// Live probe of the downstream log. Updates the cached health flag.
    async fn is_healthy(&self) -> Result<bool, StreamError>;

    /// Flush buffered events and shut the stream down. Idempotent; a second
    /// call returns without error.
    async fn close(&self, deadline: Duration) -> Result<(), StreamError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("event codec error: {0}")]
    Codec(#[from] EventCodecError),

    #[error("enqueue timed out")]
    EnqueueTimeout,

    #[error("publisher is shutting down")]
    ShuttingDown,

    #[error("event queue is closed")]
    Closed,

    #[error("close deadline exceeded, worker still draining")]
    DeadlineExceeded,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors surfaced by a [`StreamTransport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("unexpected ping response: {0}")]
    UnexpectedPong(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    Other(String),
}

/// The wire-level operations the publisher needs from the downstream log.
///
/// Kept narrow so retry, health gating, and drain behavior can be exercised
/// against in-memory fakes.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Append one grouped `(type, data)` entry to `stream`.
    async fn append(
        &self,
        stream: &str,
        event_type: EventType,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Health probe against the log.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Tear down the underlying connection.
    async fn close(&self);
}
