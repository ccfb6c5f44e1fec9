//! Valkey-backed stream transport.
//!
//! Events land as stream entries with two fields: `type`, the decimal
//! event-type code, and `data`, the JSON envelope bytes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;
use types::events::EventType;

use crate::publisher::{PublisherConfig, StreamPublisher};
use crate::{StreamTransport, TransportError};

/// Connection options for the Valkey stream.
#[derive(Debug, Clone)]
pub struct ValkeyOptions {
    pub host: String,
    pub port: u16,
    pub stream_name: String,
    pub request_timeout_ms: u64,
}

pub struct ValkeyTransport {
    connection: ConnectionManager,
}

impl ValkeyTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let client = redis::Client::open(format!("redis://{host}:{port}"))?;
        let connection = ConnectionManager::new(client).await?;
        debug!(host, port, "connected to valkey");
        Ok(Self { connection })
    }
}

#[async_trait]
impl StreamTransport for ValkeyTransport {
    async fn append(
        &self,
        stream: &str,
        event_type: EventType,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut connection = self.connection.clone();
        let fields: [(&str, Vec<u8>); 2] = [
            ("type", i64::from(event_type).to_string().into_bytes()),
            ("data", data.to_vec()),
        ];
        let _id: String = connection.xadd(stream, "*", &fields).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        let mut connection = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(TransportError::UnexpectedPong(pong))
        }
    }

    async fn close(&self) {
        // ConnectionManager tears down when the last clone drops.
    }
}

/// The production publisher: bounded queue in front of a Valkey stream.
pub type ValkeyEventStream = StreamPublisher<ValkeyTransport>;

/// Connect to Valkey and start a publisher against the configured stream.
pub async fn connect_publisher(
    options: &ValkeyOptions,
) -> Result<ValkeyEventStream, TransportError> {
    let transport = ValkeyTransport::connect(&options.host, options.port).await?;
    let config = PublisherConfig::new(&options.stream_name, options.request_timeout_ms);
    Ok(StreamPublisher::new(transport, config))
}
