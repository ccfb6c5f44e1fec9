//! The order service facade.
//!
//! Sits between the transport handlers and the engine: assigns ids, maps
//! wire enums, refuses work while the downstream event stream is
//! unreachable, and keeps the degraded flag fresh with a background health
//! poller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use event_stream::EventStream;
use matching_engine::MatchingEngine;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use types::{Order, OrderKind, Side};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    CancelOrderRequest, CancelOrderResponse, HealthCheckResponse, PlaceOrderRequest,
    PlaceOrderResponse,
};

const STARTUP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

pub struct OrderService {
    engine: Arc<MatchingEngine>,
    stream: Arc<dyn EventStream>,
    degraded: Arc<AtomicBool>,
    orders_processed: AtomicU64,
    started_at: Instant,
    shutdown: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl OrderService {
    /// Probe the stream once, then start the background health poller.
    pub async fn start(stream: Arc<dyn EventStream>) -> Arc<Self> {
        let engine = Arc::new(MatchingEngine::new(stream.clone()));
        let degraded = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let ok = probe(&engine, STARTUP_PROBE_TIMEOUT).await;
        degraded.store(!ok, Ordering::SeqCst);
        if !ok {
            warn!("event stream unreachable at startup, starting in degraded mode");
        }

        let poller = {
            let engine = engine.clone();
            let degraded = degraded.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(POLL_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let ok = probe(&engine, POLL_PROBE_TIMEOUT).await;
                            degraded.store(!ok, Ordering::SeqCst);
                        }
                        _ = shutdown_rx.changed() => return,
                    }
                }
            })
        };

        Arc::new(Self {
            engine,
            stream,
            degraded,
            orders_processed: AtomicU64::new(0),
            started_at: Instant::now(),
            shutdown: shutdown_tx,
            poller: Mutex::new(Some(poller)),
        })
    }

    /// Degraded gate: when the flag is set, one short re-probe decides
    /// whether to proceed or refuse.
    async fn ensure_accepting(&self) -> Result<(), ApiError> {
        if !self.degraded.load(Ordering::SeqCst) {
            return Ok(());
        }
        if probe(&self.engine, RETRY_PROBE_TIMEOUT).await {
            self.degraded.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(ApiError::Degraded)
        }
    }

    pub async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderResponse, ApiError> {
        self.ensure_accepting().await?;

        let order_id = Uuid::new_v4().to_string();
        let order = Order {
            order_id: order_id.clone(),
            trader_id: req.trader_id,
            symbol: req.stock_ticker.clone(),
            side: Side::from_wire(req.side),
            kind: OrderKind::from_wire(req.order_type),
            quantity: req.quantity,
            limit_price_cents: req.limit_price_cents,
            available_balance_cents: req.available_balance_cents,
            timestamp: Utc::now(),
        };

        let outcome = self.engine.submit_order(order).await.map_err(|err| {
            error!(order_id = %order_id, error = %err, "failed to submit order");
            ApiError::InvalidArgument(format!("failed to place order: {err}"))
        })?;
        self.orders_processed.fetch_add(1, Ordering::SeqCst);

        let filled_quantity = req.quantity - outcome.remaining_quantity;
        let traded_value: i64 = outcome
            .matches
            .iter()
            .map(|m| m.price_cents * m.quantity)
            .sum();
        let average_fill_price_cents = if filled_quantity > 0 {
            traded_value / filled_quantity
        } else {
            0
        };

        Ok(PlaceOrderResponse {
            success: true,
            order_id,
            was_filled_immediately: !outcome.matches.is_empty(),
            filled_quantity,
            average_fill_price_cents,
        })
    }

    pub async fn cancel_order(
        &self,
        req: CancelOrderRequest,
    ) -> Result<CancelOrderResponse, ApiError> {
        self.ensure_accepting().await?;

        let side = Side::from_wire(req.side);
        let found = self
            .engine
            .cancel_order(&req.stock_ticker, &req.order_id, side)
            .await
            .map_err(|err| {
                error!(order_id = %req.order_id, error = %err, "failed to cancel order");
                ApiError::InvalidArgument(format!("failed to cancel order: {err}"))
            })?;

        if !found {
            warn!(
                order_id = %req.order_id,
                stock = %req.stock_ticker,
                "order not found for cancellation"
            );
            return Err(ApiError::NotFound(req.order_id));
        }
        self.orders_processed.fetch_add(1, Ordering::SeqCst);

        Ok(CancelOrderResponse {
            success: true,
            order_id: req.order_id,
        })
    }

    /// Live probe; updates the degraded flag either way.
    pub async fn health_check(&self) -> HealthCheckResponse {
        let healthy = matches!(self.engine.is_stream_healthy().await, Ok(true));
        self.degraded.store(!healthy, Ordering::SeqCst);
        HealthCheckResponse {
            is_healthy: healthy,
            orders_processed: self.orders_processed.load(Ordering::SeqCst),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Stop the poller, then drain and close the publisher under the
    /// caller's deadline.
    pub async fn close(&self, deadline: Duration) {
        let _ = self.shutdown.send(true);
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            let _ = poller.await;
        }
        if let Err(err) = self.stream.close(deadline).await {
            warn!(error = %err, "event stream close returned error");
        }
    }
}

async fn probe(engine: &MatchingEngine, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, engine.is_stream_healthy()).await,
        Ok(Ok(true))
    )
}
