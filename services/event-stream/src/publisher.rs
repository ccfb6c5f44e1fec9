//! Buffered, retrying event publisher.
//!
//! Producers enqueue serialized envelopes onto a bounded channel; a single
//! worker task drains it to the downstream stream. While the publisher is
//! running a failed append is never dropped: the worker retries with
//! exponential backoff, flips the health flag off after the retry budget is
//! spent, and parks on the same event until a probe restores health. Once
//! shutdown is signalled the worker switches to a best-effort drain with a
//! fresh per-event budget so close always makes progress, even against a
//! dead downstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use types::events::{encode_event, EngineEvent, EventType};

use crate::{EventStream, StreamError, StreamTransport, TransportError};

/// How often the worker re-checks the health flag while gated.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// First backoff step; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub stream_name: String,
    /// Queue capacity between producers and the worker.
    pub buffer_size: usize,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Per-attempt network timeout.
    pub request_timeout: Duration,
    /// How long `publish` may wait for queue space.
    pub enqueue_timeout: Duration,
}

impl PublisherConfig {
    /// Standard configuration: 10k buffer, 3 retries, enqueue bounded by
    /// the request timeout. A zero `request_timeout_ms` falls back to 2s.
    pub fn new(stream_name: impl Into<String>, request_timeout_ms: u64) -> Self {
        let request_timeout = if request_timeout_ms == 0 {
            Duration::from_secs(2)
        } else {
            Duration::from_millis(request_timeout_ms)
        };
        Self {
            stream_name: stream_name.into(),
            buffer_size: 10_000,
            max_retries: 3,
            request_timeout,
            enqueue_timeout: request_timeout,
        }
    }
}

struct QueuedEvent {
    event_type: EventType,
    data: Vec<u8>,
}

/// Publisher handle shared by producers. Cheap to share behind an `Arc`.
pub struct StreamPublisher<T: StreamTransport> {
    transport: Arc<T>,
    config: PublisherConfig,
    tx: RwLock<Option<mpsc::Sender<QueuedEvent>>>,
    healthy: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: StreamTransport> StreamPublisher<T> {
    /// Start the publisher and its background worker.
    pub fn new(transport: T, config: PublisherConfig) -> Self {
        let transport = Arc::new(transport);
        let healthy = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(config.buffer_size);

        let worker = tokio::spawn(worker_loop(
            Worker {
                transport: transport.clone(),
                config: config.clone(),
                healthy: healthy.clone(),
                shutdown: shutdown_rx,
            },
            rx,
        ));

        Self {
            transport,
            config,
            tx: RwLock::new(Some(tx)),
            healthy,
            shutdown: shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Cached health flag: flipped off by the worker after an exhausted
    /// retry budget, back on by a successful probe.
    pub fn healthy_flag(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: StreamTransport> EventStream for StreamPublisher<T> {
    async fn publish(&self, event: EngineEvent) -> Result<(), StreamError> {
        let data = encode_event(&event)?;
        let queued = QueuedEvent {
            event_type: event.event_type(),
            data,
        };

        let tx = self.tx.read().clone().ok_or(StreamError::Closed)?;
        if *self.shutdown.borrow() {
            return Err(StreamError::ShuttingDown);
        }
        let mut shutdown = self.shutdown.subscribe();

        tokio::select! {
            result = tx.send_timeout(queued, self.config.enqueue_timeout) => match result {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(StreamError::EnqueueTimeout),
                Err(SendTimeoutError::Closed(_)) => Err(StreamError::Closed),
            },
            _ = shutdown.changed() => Err(StreamError::ShuttingDown),
        }
    }

    async fn is_healthy(&self) -> Result<bool, StreamError> {
        match self.transport.ping().await {
            Ok(()) => {
                self.healthy.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Err(err) => {
                self.healthy.store(false, Ordering::SeqCst);
                Err(StreamError::Transport(err))
            }
        }
    }

    async fn close(&self, deadline: Duration) -> Result<(), StreamError> {
        let _ = self.shutdown.send(true);
        // Dropping the sender closes the queue once in-flight clones drop,
        // which is what lets the worker's recv loop terminate.
        self.tx.write().take();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            match tokio::time::timeout(deadline, worker).await {
                Ok(join) => {
                    if let Err(err) = join {
                        warn!(error = %err, "publisher worker terminated abnormally");
                    }
                }
                // Deadline hit; the worker keeps draining in the background.
                Err(_) => return Err(StreamError::DeadlineExceeded),
            }
        }

        self.transport.close().await;
        Ok(())
    }
}

struct Worker<T: StreamTransport> {
    transport: Arc<T>,
    config: PublisherConfig,
    healthy: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

async fn worker_loop<T: StreamTransport>(mut worker: Worker<T>, mut rx: mpsc::Receiver<QueuedEvent>) {
    while let Some(event) = rx.recv().await {
        worker.deliver(event).await;
    }
    info!("worker finished processing all events");
}

impl<T: StreamTransport> Worker<T> {
    fn shutting_down(&self) -> bool {
        // A dropped sender (handle dropped without close) also counts.
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Deliver one event: retry until it lands, the publisher shuts down
    /// and the drain attempt fails, or health recovery lets a later pass
    /// succeed.
    async fn deliver(&mut self, event: QueuedEvent) {
        loop {
            self.wait_for_healthy().await;

            if self.shutting_down() {
                // Drain mode: a fresh bounded budget per event, not the
                // cancelled runtime budget. Failures drop the event so
                // shutdown always advances.
                let drained = tokio::time::timeout(
                    self.config.request_timeout,
                    self.append_with_retry(&event, false),
                )
                .await
                .unwrap_or(Err(TransportError::Timeout));
                if let Err(err) = drained {
                    warn!(
                        event_type = i64::from(event.event_type),
                        error = %err,
                        "dropping event during shutdown after failed publish"
                    );
                }
                return;
            }

            match self.append_with_retry(&event, true).await {
                Ok(()) => return,
                Err(err) => {
                    error!(
                        stream = %self.config.stream_name,
                        event_type = i64::from(event.event_type),
                        error = %err,
                        max_retries = self.config.max_retries,
                        "failed to publish event after retries, will retry after health recovery"
                    );
                    self.healthy.store(false, Ordering::SeqCst);
                    // Keep the event and loop back to the health gate.
                }
            }
        }
    }

    /// Block until the health flag is set, polling at 100ms. Returns
    /// immediately once shutdown is signalled.
    async fn wait_for_healthy(&mut self) {
        while !self.healthy.load(Ordering::SeqCst) {
            if self.shutting_down() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(HEALTH_POLL_INTERVAL) => {}
                _ = self.shutdown.changed() => return,
            }
        }
    }

    /// One retry cycle: up to `max_retries + 1` attempts with exponential
    /// backoff, each attempt bounded by the request timeout.
    async fn append_with_retry(
        &mut self,
        event: &QueuedEvent,
        respect_shutdown: bool,
    ) -> Result<(), TransportError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = TransportError::Timeout;

        for attempt in 0..=self.config.max_retries {
            let outcome = tokio::time::timeout(
                self.config.request_timeout,
                self.transport
                    .append(&self.config.stream_name, event.event_type, &event.data),
            )
            .await;

            match outcome {
                Ok(Ok(())) => {
                    if attempt > 0 {
                        info!(
                            attempt = attempt + 1,
                            event_type = i64::from(event.event_type),
                            "event published after retry"
                        );
                    }
                    return Ok(());
                }
                Ok(Err(err)) => last_err = err,
                Err(_) => last_err = TransportError::Timeout,
            }

            if attempt < self.config.max_retries {
                warn!(
                    attempt = attempt + 1,
                    event_type = i64::from(event.event_type),
                    error = %last_err,
                    backoff_ms = backoff.as_millis() as u64,
                    "failed to publish event, retrying"
                );
                if respect_shutdown {
                    if self.shutting_down() {
                        return Err(last_err);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.changed() => return Err(last_err),
                    }
                } else {
                    tokio::time::sleep(backoff).await;
                }
                backoff *= 2;
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use types::events::{decode_event, OrderFilledEvent, OrderPlacedEvent};
    use types::{OrderKind, Side};

    fn placed(order_id: &str) -> EngineEvent {
        EngineEvent::OrderPlaced(OrderPlacedEvent {
            order_id: order_id.to_string(),
            trader_id: 1,
            stock_ticker: "AAPL".to_string(),
            order_type: OrderKind::Limit,
            order_side: Side::Buy,
            quantity: 10,
            limit_price_cents: 15000,
        })
    }

    fn filled(order_id: &str) -> EngineEvent {
        EngineEvent::OrderFilled(OrderFilledEvent {
            order_id: order_id.to_string(),
            trader_id: 1,
            total_quantity: 10,
            fill_price_cents: 15000,
        })
    }

    fn test_config() -> PublisherConfig {
        PublisherConfig {
            stream_name: "test_stream".to_string(),
            buffer_size: 64,
            max_retries: 3,
            request_timeout: Duration::from_millis(200),
            enqueue_timeout: Duration::from_millis(100),
        }
    }

    /// Records appended entries in order.
    #[derive(Default)]
    struct RecordingTransport {
        entries: Arc<Mutex<Vec<(EventType, Vec<u8>)>>>,
    }

    #[async_trait]
    impl StreamTransport for RecordingTransport {
        async fn append(
            &self,
            _stream: &str,
            event_type: EventType,
            data: &[u8],
        ) -> Result<(), TransportError> {
            self.entries.lock().push((event_type, data.to_vec()));
            Ok(())
        }

        async fn ping(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    /// Fails every append, counting attempts.
    #[derive(Default)]
    struct FailingTransport {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StreamTransport for FailingTransport {
        async fn append(
            &self,
            _stream: &str,
            _event_type: EventType,
            _data: &[u8],
        ) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Other("downstream down".to_string()))
        }

        async fn ping(&self) -> Result<(), TransportError> {
            Err(TransportError::Other("downstream down".to_string()))
        }

        async fn close(&self) {}
    }

    /// Appends never complete.
    struct BlockingTransport;

    #[async_trait]
    impl StreamTransport for BlockingTransport {
        async fn append(
            &self,
            _stream: &str,
            _event_type: EventType,
            _data: &[u8],
        ) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_publishes_in_queue_order() {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport {
            entries: entries.clone(),
        };
        let publisher = StreamPublisher::new(transport, test_config());

        publisher.publish(placed("a")).await.unwrap();
        publisher.publish(filled("a")).await.unwrap();
        publisher.publish(placed("b")).await.unwrap();
        publisher.close(Duration::from_secs(1)).await.unwrap();

        let recorded = entries.lock();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].0, EventType::OrderPlaced);
        assert_eq!(recorded[1].0, EventType::OrderFilled);
        assert_eq!(recorded[2].0, EventType::OrderPlaced);

        // Entries carry decodable envelopes in the same order.
        let (_, event) = decode_event(&recorded[1].1).unwrap();
        assert_eq!(event, filled("a"));
    }

    #[tokio::test]
    async fn test_retry_budget_then_health_flag_flips() {
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = FailingTransport {
            attempts: attempts.clone(),
        };
        let publisher = StreamPublisher::new(transport, test_config());

        publisher.publish(placed("a")).await.unwrap();

        // Initial attempt plus three retries, then the flag drops.
        let mut flipped = false;
        for _ in 0..100 {
            if !publisher.healthy_flag() {
                flipped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flipped, "health flag never flipped");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_close_drops_undeliverable_events() {
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = FailingTransport {
            attempts: attempts.clone(),
        };
        let publisher = StreamPublisher::new(transport, test_config());

        publisher.publish(placed("a")).await.unwrap();
        // The worker must not wedge shutdown on a dead downstream.
        publisher.close(Duration::from_secs(5)).await.unwrap();
        assert!(attempts.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let publisher = StreamPublisher::new(RecordingTransport::default(), test_config());

        publisher.close(Duration::from_secs(1)).await.unwrap();
        publisher.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_after_close_is_an_error() {
        let publisher = StreamPublisher::new(RecordingTransport::default(), test_config());
        publisher.close(Duration::from_secs(1)).await.unwrap();

        let result = publisher.publish(placed("a")).await;
        assert!(matches!(
            result,
            Err(StreamError::Closed) | Err(StreamError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_times_out_when_queue_is_full() {
        let config = PublisherConfig {
            buffer_size: 1,
            enqueue_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(60),
            ..test_config()
        };
        let publisher = StreamPublisher::new(BlockingTransport, config);

        // First event reaches the worker and hangs in append.
        publisher.publish(placed("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Second fills the single buffer slot.
        publisher.publish(placed("b")).await.unwrap();
        // Third has nowhere to go.
        let result = publisher.publish(placed("c")).await;
        assert!(matches!(result, Err(StreamError::EnqueueTimeout)));
    }

    #[tokio::test]
    async fn test_probe_restores_health_flag() {
        let publisher = StreamPublisher::new(RecordingTransport::default(), test_config());
        publisher.healthy.store(false, Ordering::SeqCst);

        assert!(publisher.is_healthy().await.unwrap());
        assert!(publisher.healthy_flag());
    }
}
