//! Postgres sink: folds lifecycle events into the relational store.
//!
//! Idempotency: `orders.id` is the order UUID and `trades.event_id` the
//! envelope UUID, both upserted with `ON CONFLICT DO NOTHING`, so replaying
//! a stream entry is harmless. Status updates are naturally idempotent.

use async_trait::async_trait;
use event_stream::{EventSink, SinkError};
use sqlx::types::Uuid;
use sqlx::PgPool;
use tracing::debug;
use types::events::{EngineEvent, Event};
use types::OrderKind;

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, SinkError> {
    Uuid::parse_str(raw).map_err(|err| SinkError::Payload(format!("could not parse UUID: {err}")))
}

fn db_err(err: sqlx::Error) -> SinkError {
    SinkError::Database(err.to_string())
}

#[async_trait]
impl EventSink for PostgresSink {
    async fn apply(&self, envelope: &Event, event: &EngineEvent) -> Result<(), SinkError> {
        match event {
            EngineEvent::OrderPlaced(ev) => {
                let id = parse_uuid(&ev.order_id)?;
                sqlx::query(
                    "INSERT INTO orders \
                       (id, trader_id, stock_ticker, order_type, order_side, \
                        quantity, remaining_quantity, limit_price_cents, status, placed_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $6, $7, 'PLACED', $8) \
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(id)
                .bind(ev.trader_id)
                .bind(&ev.stock_ticker)
                .bind(ev.order_type.as_str())
                .bind(ev.order_side.as_str())
                .bind(ev.quantity)
                .bind((ev.order_type == OrderKind::Limit).then_some(ev.limit_price_cents))
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }

            EngineEvent::OrderCancelled(ev) => {
                let id = parse_uuid(&ev.order_id)?;
                sqlx::query(
                    "UPDATE orders \
                     SET status = 'CANCELLED', remaining_quantity = $2, updated_at = $3 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(ev.remaining_quantity)
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }

            EngineEvent::OrderFilled(ev) => {
                let id = parse_uuid(&ev.order_id)?;
                sqlx::query(
                    "UPDATE orders \
                     SET status = 'FILLED', remaining_quantity = 0, updated_at = $2 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }

            EngineEvent::OrderPartiallyFilled(ev) => {
                let id = parse_uuid(&ev.order_id)?;
                sqlx::query(
                    "UPDATE orders \
                     SET status = 'PARTIALLY_FILLED', remaining_quantity = $2, updated_at = $3 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(ev.remaining_quantity)
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }

            EngineEvent::OrderRejected(ev) => {
                // Rejections that failed identity validation have no id to
                // persist against.
                if ev.order_id.is_empty() {
                    debug!(reason = %ev.reason, "skipping rejected event without order id");
                    return Ok(());
                }
                let id = parse_uuid(&ev.order_id)?;
                sqlx::query(
                    "INSERT INTO orders \
                       (id, trader_id, quantity, remaining_quantity, status, reject_reason, placed_at) \
                     VALUES ($1, $2, 0, 0, 'REJECTED', $3, $4) \
                     ON CONFLICT (id) DO UPDATE \
                       SET status = 'REJECTED', reject_reason = EXCLUDED.reject_reason",
                )
                .bind(id)
                .bind(ev.trader_id)
                .bind(&ev.reason)
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }

            EngineEvent::TradeExecuted(ev) => {
                let event_id = parse_uuid(&envelope.event_id)?;
                let buyer_order_id = parse_uuid(&ev.buyer_order_id)?;
                let seller_order_id = parse_uuid(&ev.seller_order_id)?;
                sqlx::query(
                    "INSERT INTO trades \
                       (event_id, stock_ticker, buyer_order_id, seller_order_id, \
                        buyer_trader_id, seller_trader_id, quantity, price_cents, \
                        total_value_cents, executed_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     ON CONFLICT (event_id) DO NOTHING",
                )
                .bind(event_id)
                .bind(&ev.stock_ticker)
                .bind(buyer_order_id)
                .bind(seller_order_id)
                .bind(ev.buyer_trader_id)
                .bind(ev.seller_trader_id)
                .bind(ev.quantity)
                .bind(ev.price_cents)
                .bind(ev.total_value_cents)
                .bind(envelope.timestamp)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }
        }

        debug!(
            event_id = %envelope.event_id,
            event_type = i64::from(envelope.event_type),
            "event persisted"
        );
        Ok(())
    }
}
