//! Blocking read loop over the Valkey stream.
//!
//! Maintains a `last_id` cursor, starting at the "only new entries"
//! sentinel, and feeds decoded events to an [`EventSink`]. The stream is
//! at-least-once; sinks must be idempotent.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use types::events::{decode_event, EngineEvent, Event, EventCodecError};

use crate::valkey::ValkeyOptions;
use crate::TransportError;

/// Sentinel id: read only entries appended after this consumer started.
const READ_LATEST: &str = "$";
const READ_BLOCK: Duration = Duration::from_secs(5);
const READ_BATCH: usize = 100;
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Where decoded events land.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn apply(&self, envelope: &Event, event: &EngineEvent) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("payload rejected: {0}")]
    Payload(String),

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("event decode failed: {0}")]
    Decode(#[from] EventCodecError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

struct StreamEntry {
    id: String,
    data: Vec<u8>,
}

pub struct StreamConsumer {
    connection: ConnectionManager,
    stream_name: String,
    last_id: String,
}

impl StreamConsumer {
    pub async fn connect(options: &ValkeyOptions) -> Result<Self, TransportError> {
        let client =
            redis::Client::open(format!("redis://{}:{}", options.host, options.port))?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            stream_name: options.stream_name.clone(),
            last_id: READ_LATEST.to_string(),
        })
    }

    /// Read and dispatch until `shutdown` flips true.
    ///
    /// Read failures back off one second and retry; a bad entry is logged
    /// and skipped without aborting the rest of its batch.
    pub async fn run(&mut self, sink: &dyn EventSink, mut shutdown: watch::Receiver<bool>) {
        info!(
            stream = %self.stream_name,
            last_id = %self.last_id,
            "starting stream listener"
        );

        loop {
            if *shutdown.borrow() {
                info!("stream listener shutting down");
                return;
            }

            let batch = tokio::select! {
                result = self.read_batch() => result,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            };

            let entries = match batch {
                Ok(entries) => entries,
                Err(err) => {
                    error!(
                        stream = %self.stream_name,
                        error = %err,
                        "failed to read from stream"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };

            for entry in entries {
                if let Err(err) = process_entry(sink, &entry.data).await {
                    error!(entry_id = %entry.id, error = %err, "failed to process event");
                }
            }
        }
    }

    async fn read_batch(&mut self) -> Result<Vec<StreamEntry>, TransportError> {
        let options = StreamReadOptions::default()
            .block(READ_BLOCK.as_millis() as usize)
            .count(READ_BATCH);
        let mut connection = self.connection.clone();
        let reply: StreamReadReply = connection
            .xread_options(
                &[self.stream_name.as_str()],
                &[self.last_id.as_str()],
                &options,
            )
            .await?;

        let mut entries = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                self.last_id = id.id.clone();
                let Some(value) = id.map.get("data") else {
                    warn!(entry_id = %id.id, "stream entry missing 'data' field");
                    continue;
                };
                let data: Vec<u8> = redis::from_redis_value(value)?;
                entries.push(StreamEntry { id: id.id, data });
            }
        }
        Ok(entries)
    }
}

/// Decode one raw entry and hand it to the sink.
pub async fn process_entry(sink: &dyn EventSink, data: &[u8]) -> Result<(), ConsumerError> {
    let (envelope, event) = decode_event(data)?;
    debug!(
        event_id = %envelope.event_id,
        event_type = i64::from(envelope.event_type),
        "event decoded"
    );
    sink.apply(&envelope, &event).await?;
    Ok(())
}
