//! Matching engine core
//!
//! Per-symbol book registry, order validation, and the buy/sell match
//! loops. Matching walks the opposite side best-price-first and drains each
//! level FIFO; the execution price is always the resting order's price.
//!
//! Every lifecycle event produced by a single submit or cancel is published
//! while the symbol's lock is held, so the per-symbol event order seen
//! downstream is exactly the order specified here: OrderPlaced, then per
//! match TradeExecuted followed by the resting order's fill event, then the
//! incoming order's summary events, then (market orders) the IOC
//! cancellation.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use event_stream::{EventStream, StreamError};
use tracing::warn;
use types::events::{
    EngineEvent, OrderCancelledEvent, OrderFilledEvent, OrderPartiallyFilledEvent,
    OrderPlacedEvent, OrderRejectedEvent, TradeExecutedEvent,
};
use types::{MatchEvent, Order, OrderError, OrderKind, Side};

use crate::book::{BookSides, SymbolBook};

/// Outcome of a submitted order: the fills it produced and what was left.
///
/// For limit orders the remainder rests on the book; for market orders it
/// was cancelled (immediate-or-cancel).
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub matches: Vec<MatchEvent>,
    pub remaining_quantity: i64,
}

/// Best bid and ask for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    pub bid_price_cents: Option<i64>,
    pub bid_volume: i64,
    pub ask_price_cents: Option<i64>,
    pub ask_volume: i64,
}

/// The matching engine: one order book per symbol, created on first use.
pub struct MatchingEngine {
    books: DashMap<String, Arc<SymbolBook>>,
    stream: Arc<dyn EventStream>,
}

impl MatchingEngine {
    pub fn new(stream: Arc<dyn EventStream>) -> Self {
        Self {
            books: DashMap::new(),
            stream,
        }
    }

    /// Live probe of the downstream event stream.
    pub async fn is_stream_healthy(&self) -> Result<bool, StreamError> {
        self.stream.is_healthy().await
    }

    /// Get or create the book for a symbol.
    ///
    /// The entry API keeps a racing insert from being lost; the shard guard
    /// is dropped before any book work happens.
    fn book(&self, symbol: &str) -> Arc<SymbolBook> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(SymbolBook::new(symbol)))
            .value()
            .clone()
    }

    /// Fire-and-forget emission: publish failures are logged, matching is
    /// never blocked on or aborted for the stream.
    async fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.stream.publish(event).await {
            warn!(error = %err, "event publish failed");
        }
    }

    fn validate(order: &Order) -> Result<(), OrderError> {
        if order.symbol.is_empty() {
            return Err(OrderError::EmptyTicker);
        }
        if order.order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        if order.quantity <= 0 {
            return Err(OrderError::InvalidQuantity);
        }
        if order.kind == OrderKind::Limit && order.limit_price_cents <= 0 {
            return Err(OrderError::InvalidLimitPrice);
        }
        Ok(())
    }

    /// Validate, accept, and match an order.
    ///
    /// A validation failure publishes OrderRejected and returns the error
    /// with the book untouched. On acceptance, OrderPlaced is published and
    /// the order is matched against the opposite side under the symbol's
    /// lock; the lock is released before returning.
    pub async fn submit_order(&self, order: Order) -> Result<SubmitOutcome, OrderError> {
        if let Err(err) = Self::validate(&order) {
            // Orders refused before identity checks reject anonymously.
            let (order_id, trader_id) = match err {
                OrderError::EmptyTicker | OrderError::EmptyOrderId => (String::new(), 0),
                _ => (order.order_id.clone(), order.trader_id),
            };
            self.emit(EngineEvent::OrderRejected(OrderRejectedEvent {
                order_id,
                trader_id,
                reason: err.reason().to_string(),
                error_message: err.message().to_string(),
            }))
            .await;
            return Err(err);
        }

        let book = self.book(&order.symbol);
        let mut sides = book.lock().await;

        self.emit(EngineEvent::OrderPlaced(OrderPlacedEvent {
            order_id: order.order_id.clone(),
            trader_id: order.trader_id,
            stock_ticker: order.symbol.clone(),
            order_type: order.kind,
            order_side: order.side,
            quantity: order.quantity,
            limit_price_cents: order.limit_price_cents,
        }))
        .await;

        let outcome = match order.side {
            Side::Buy => self.match_buy(&mut sides, order).await,
            Side::Sell => self.match_sell(&mut sides, order).await,
        };
        Ok(outcome)
    }

    /// Match an incoming buy against the ask side.
    async fn match_buy(&self, sides: &mut BookSides, mut order: Order) -> SubmitOutcome {
        let mut matches = Vec::new();
        let original = order.quantity;
        let mut remaining = order.quantity;
        // Remaining cash; consulted for market buys only.
        let mut balance = order.available_balance_cents;

        while remaining > 0 {
            let Some(ask) = sides.asks.best_price() else {
                break;
            };
            if order.kind == OrderKind::Limit && ask > order.limit_price_cents {
                break; // no cross
            }
            if order.kind == OrderKind::Market && balance < ask {
                break; // cannot afford a single share at this level
            }

            // One timestamp for every match drained from this level.
            let now = Utc::now();
            while remaining > 0 {
                if order.kind == OrderKind::Market && balance < ask {
                    break;
                }
                let head = sides
                    .asks
                    .level_mut(ask)
                    .and_then(|level| level.head())
                    .map(|resting| (resting.order_id.clone(), resting.trader_id, resting.quantity));
                let Some((resting_id, resting_trader, resting_qty)) = head else {
                    break; // this level is drained; re-read the best price
                };

                let mut match_qty = remaining.min(resting_qty);
                if order.kind == OrderKind::Market {
                    let affordable = balance / ask;
                    if affordable < match_qty {
                        match_qty = affordable;
                    }
                    if match_qty == 0 {
                        remaining = 0;
                        break;
                    }
                }
                let trade_cost = ask * match_qty;

                matches.push(MatchEvent {
                    buyer_order_id: order.order_id.clone(),
                    seller_order_id: resting_id.clone(),
                    price_cents: ask,
                    quantity: match_qty,
                    timestamp: now,
                });
                self.emit(EngineEvent::TradeExecuted(TradeExecutedEvent {
                    stock_ticker: order.symbol.clone(),
                    buyer_order_id: order.order_id.clone(),
                    seller_order_id: resting_id.clone(),
                    buyer_order_type: order.kind,
                    buyer_trader_id: order.trader_id,
                    seller_trader_id: resting_trader,
                    quantity: match_qty,
                    price_cents: ask,
                    total_value_cents: trade_cost,
                }))
                .await;

                remaining -= match_qty;
                if order.kind == OrderKind::Market {
                    balance -= trade_cost;
                }

                if match_qty == resting_qty {
                    // Resting ask fully consumed.
                    self.emit(EngineEvent::OrderFilled(OrderFilledEvent {
                        order_id: resting_id.clone(),
                        trader_id: resting_trader,
                        total_quantity: resting_qty,
                        fill_price_cents: ask,
                    }))
                    .await;
                    sides.asks.remove(&resting_id);
                } else {
                    if let Some(level) = sides.asks.level_mut(ask) {
                        level.fill_head(match_qty);
                    }
                    self.emit(EngineEvent::OrderPartiallyFilled(OrderPartiallyFilledEvent {
                        order_id: resting_id,
                        trader_id: resting_trader,
                        filled_quantity: match_qty,
                        remaining_quantity: resting_qty - match_qty,
                        fill_price_cents: ask,
                    }))
                    .await;
                }
            }
        }

        self.emit_incoming_summary(&order, original, remaining).await;

        if remaining > 0 && order.kind == OrderKind::Limit {
            order.quantity = remaining;
            sides.bids.add(order);
        }

        SubmitOutcome {
            matches,
            remaining_quantity: remaining,
        }
    }

    /// Match an incoming sell against the bid side.
    async fn match_sell(&self, sides: &mut BookSides, mut order: Order) -> SubmitOutcome {
        let mut matches = Vec::new();
        let original = order.quantity;
        let mut remaining = order.quantity;

        while remaining > 0 {
            let Some(bid) = sides.bids.best_price() else {
                break;
            };
            if order.kind == OrderKind::Limit && bid < order.limit_price_cents {
                break; // no cross
            }

            let now = Utc::now();
            while remaining > 0 {
                let head = sides
                    .bids
                    .level_mut(bid)
                    .and_then(|level| level.head())
                    .map(|resting| {
                        (
                            resting.order_id.clone(),
                            resting.trader_id,
                            resting.quantity,
                            resting.kind,
                        )
                    });
                let Some((resting_id, resting_trader, resting_qty, resting_kind)) = head else {
                    break; // this level is drained; re-read the best price
                };

                let match_qty = remaining.min(resting_qty);
                let trade_cost = bid * match_qty;

                matches.push(MatchEvent {
                    buyer_order_id: resting_id.clone(),
                    seller_order_id: order.order_id.clone(),
                    price_cents: bid,
                    quantity: match_qty,
                    timestamp: now,
                });
                self.emit(EngineEvent::TradeExecuted(TradeExecutedEvent {
                    stock_ticker: order.symbol.clone(),
                    buyer_order_id: resting_id.clone(),
                    seller_order_id: order.order_id.clone(),
                    buyer_order_type: resting_kind,
                    buyer_trader_id: resting_trader,
                    seller_trader_id: order.trader_id,
                    quantity: match_qty,
                    price_cents: bid,
                    total_value_cents: trade_cost,
                }))
                .await;

                remaining -= match_qty;

                if match_qty == resting_qty {
                    // Resting bid fully consumed.
                    self.emit(EngineEvent::OrderFilled(OrderFilledEvent {
                        order_id: resting_id.clone(),
                        trader_id: resting_trader,
                        total_quantity: resting_qty,
                        fill_price_cents: bid,
                    }))
                    .await;
                    sides.bids.remove(&resting_id);
                } else {
                    if let Some(level) = sides.bids.level_mut(bid) {
                        level.fill_head(match_qty);
                    }
                    self.emit(EngineEvent::OrderPartiallyFilled(OrderPartiallyFilledEvent {
                        order_id: resting_id,
                        trader_id: resting_trader,
                        filled_quantity: match_qty,
                        remaining_quantity: resting_qty - match_qty,
                        fill_price_cents: bid,
                    }))
                    .await;
                }
            }
        }

        self.emit_incoming_summary(&order, original, remaining).await;

        if remaining > 0 && order.kind == OrderKind::Limit {
            order.quantity = remaining;
            sides.asks.add(order);
        }

        SubmitOutcome {
            matches,
            remaining_quantity: remaining,
        }
    }

    /// Summary events for the incoming order, then the IOC cancellation for
    /// an unfilled market tail. Summary fill prices are zero: fills may
    /// span levels, and clients reconstruct the average from the per-match
    /// events.
    async fn emit_incoming_summary(&self, order: &Order, original: i64, remaining: i64) {
        if remaining == 0 && original > 0 {
            self.emit(EngineEvent::OrderFilled(OrderFilledEvent {
                order_id: order.order_id.clone(),
                trader_id: order.trader_id,
                total_quantity: original,
                fill_price_cents: 0,
            }))
            .await;
        } else if remaining > 0 && remaining < original {
            self.emit(EngineEvent::OrderPartiallyFilled(OrderPartiallyFilledEvent {
                order_id: order.order_id.clone(),
                trader_id: order.trader_id,
                filled_quantity: original - remaining,
                remaining_quantity: remaining,
                fill_price_cents: 0,
            }))
            .await;
        }

        if remaining > 0 && order.kind == OrderKind::Market {
            self.emit(EngineEvent::OrderCancelled(OrderCancelledEvent {
                order_id: order.order_id.clone(),
                trader_id: order.trader_id,
                order_type: order.kind,
                order_side: order.side,
                stock_ticker: order.symbol.clone(),
                remaining_quantity: remaining,
            }))
            .await;
        }
    }

    /// Cancel a resting order.
    ///
    /// Returns whether the order was found; cancelling an unknown order is
    /// not an error. On removal an OrderCancelled event carries the
    /// quantity that was still resting.
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        side: Side,
    ) -> Result<bool, OrderError> {
        if symbol.is_empty() {
            return Err(OrderError::EmptyTicker);
        }
        if order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }

        let Some(book) = self.books.get(symbol).map(|entry| entry.value().clone()) else {
            return Ok(false);
        };
        let mut sides = book.lock().await;

        let removed = match side {
            Side::Buy => sides.bids.remove(order_id),
            Side::Sell => sides.asks.remove(order_id),
        };
        let Some(order) = removed else {
            return Ok(false);
        };

        self.emit(EngineEvent::OrderCancelled(OrderCancelledEvent {
            order_id: order.order_id.clone(),
            trader_id: order.trader_id,
            order_type: order.kind,
            order_side: order.side,
            stock_ticker: order.symbol.clone(),
            remaining_quantity: order.quantity,
        }))
        .await;

        Ok(true)
    }

    /// Best bid and ask for a symbol, if its book exists.
    pub async fn top_of_book(&self, symbol: &str) -> Option<TopOfBook> {
        let book = self.books.get(symbol).map(|entry| entry.value().clone())?;
        let mut sides = book.lock().await;
        let bid_price_cents = sides.bids.best_price();
        let bid_volume = sides
            .bids
            .best_level_mut()
            .map(|level| level.volume())
            .unwrap_or(0);
        let ask_price_cents = sides.asks.best_price();
        let ask_volume = sides
            .asks
            .best_level_mut()
            .map(|level| level.volume())
            .unwrap_or(0);
        Some(TopOfBook {
            bid_price_cents,
            bid_volume,
            ask_price_cents,
            ask_volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_stream::testing::RecordingStream;
    use types::events::EventType;

    fn engine_with_stream() -> (MatchingEngine, Arc<RecordingStream>) {
        let stream = Arc::new(RecordingStream::new());
        (MatchingEngine::new(stream.clone()), stream)
    }

    fn limit_order(id: &str, symbol: &str, side: Side, quantity: i64, price: i64) -> Order {
        Order {
            order_id: id.to_string(),
            trader_id: 1,
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Limit,
            quantity,
            limit_price_cents: price,
            available_balance_cents: 0,
            timestamp: Utc::now(),
        }
    }

    fn market_buy(id: &str, symbol: &str, quantity: i64, balance: i64) -> Order {
        Order {
            order_id: id.to_string(),
            trader_id: 1,
            symbol: symbol.to_string(),
            side: Side::Buy,
            kind: OrderKind::Market,
            quantity,
            limit_price_cents: 0,
            available_balance_cents: balance,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unmatched_limit_order_rests() {
        let (engine, _) = engine_with_stream();

        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.remaining_quantity, 100);

        let top = engine.top_of_book("AAPL").await.unwrap();
        assert_eq!(top.bid_price_cents, Some(15000));
        assert_eq!(top.bid_volume, 100);
        assert_eq!(top.ask_price_cents, None);
    }

    #[tokio::test]
    async fn test_full_crossing_match() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 100, 15000))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.remaining_quantity, 0);
        let matched = &outcome.matches[0];
        assert_eq!(matched.buyer_order_id, "buy1");
        assert_eq!(matched.seller_order_id, "sell1");
        assert_eq!(matched.price_cents, 15000);
        assert_eq!(matched.quantity, 100);

        assert_eq!(
            stream.event_types(),
            vec![
                EventType::OrderPlaced,       // sell1
                EventType::OrderPlaced,       // buy1
                EventType::TradeExecuted,
                EventType::OrderFilled,       // resting sell1
                EventType::OrderFilled,       // incoming buy1
            ]
        );

        let events = stream.events();
        match (&events[3], &events[4]) {
            (EngineEvent::OrderFilled(resting), EngineEvent::OrderFilled(incoming)) => {
                assert_eq!(resting.order_id, "sell1");
                assert_eq!(resting.fill_price_cents, 15000);
                assert_eq!(incoming.order_id, "buy1");
                assert_eq!(incoming.fill_price_cents, 0);
                assert_eq!(incoming.total_quantity, 100);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_match_at_resting_price() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 14500))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 50, 15000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].price_cents, 14500);
    }

    #[tokio::test]
    async fn test_partial_fill_rests_remainder() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].quantity, 50);
        assert_eq!(outcome.remaining_quantity, 50);

        let top = engine.top_of_book("AAPL").await.unwrap();
        assert_eq!(top.bid_price_cents, Some(15000));
        assert_eq!(top.bid_volume, 50);

        let events = stream.events();
        let incoming_partial = events
            .iter()
            .find_map(|event| match event {
                EngineEvent::OrderPartiallyFilled(ev) if ev.order_id == "buy1" => Some(ev),
                _ => None,
            })
            .expect("incoming partial event");
        assert_eq!(incoming_partial.filled_quantity, 50);
        assert_eq!(incoming_partial.remaining_quantity, 50);
        assert_eq!(incoming_partial.fill_price_cents, 0);
    }

    #[tokio::test]
    async fn test_fifo_at_same_price() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 30, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 30, 15000))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 50, 15000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].seller_order_id, "sell1");
        assert_eq!(outcome.matches[0].quantity, 30);
        assert_eq!(outcome.matches[1].seller_order_id, "sell2");
        assert_eq!(outcome.matches[1].quantity, 20);
        assert_eq!(outcome.remaining_quantity, 0);

        // Conservation: fills plus remainder account for the request.
        let filled: i64 = outcome.matches.iter().map(|m| m.quantity).sum();
        assert_eq!(filled + outcome.remaining_quantity, 50);
    }

    #[tokio::test]
    async fn test_price_priority_beats_time() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 15100))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 50, 15100))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].seller_order_id, "sell2");
        assert_eq!(outcome.matches[0].price_cents, 15000);
    }

    #[tokio::test]
    async fn test_cross_recheck_after_level_drains() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 30, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 30, 15100))
            .await
            .unwrap();

        // Crosses 15000 but not 15100: exactly one fill, remainder rests.
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 60, 15050))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].price_cents, 15000);
        assert_eq!(outcome.matches[0].quantity, 30);
        assert_eq!(outcome.remaining_quantity, 30);

        let top = engine.top_of_book("AAPL").await.unwrap();
        assert_eq!(top.bid_price_cents, Some(15050));
        assert_eq!(top.ask_price_cents, Some(15100));
    }

    #[tokio::test]
    async fn test_no_match_when_prices_do_not_cross() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 100, 15500))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.remaining_quantity, 100);
    }

    #[tokio::test]
    async fn test_market_buy_sweeps_levels() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 50, 15100))
            .await
            .unwrap();
        let outcome = engine
            .submit_order(market_buy("buy1", "AAPL", 100, 1_600_000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.remaining_quantity, 0);
    }

    #[tokio::test]
    async fn test_market_buy_stops_at_balance() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 50, 15100))
            .await
            .unwrap();
        // 800_000 buys 50 @ 15000 (750_000) then 3 @ 15100 (45_300).
        let outcome = engine
            .submit_order(market_buy("buy1", "AAPL", 100, 800_000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].quantity, 50);
        assert_eq!(outcome.matches[0].price_cents, 15000);
        assert_eq!(outcome.matches[1].quantity, 3);
        assert_eq!(outcome.matches[1].price_cents, 15100);
        assert_eq!(outcome.remaining_quantity, 47);

        // Spend never exceeds the balance, and the residual cannot afford
        // another share at the next ask.
        let spend: i64 = outcome
            .matches
            .iter()
            .map(|m| m.price_cents * m.quantity)
            .sum();
        assert!(spend <= 800_000);
        assert!(800_000 - spend < 15100);

        // The IOC cancellation trails the incoming summary event.
        let types = stream.event_types();
        let partial_at = types
            .iter()
            .rposition(|t| *t == EventType::OrderPartiallyFilled)
            .unwrap();
        let cancel_at = types
            .iter()
            .rposition(|t| *t == EventType::OrderCancelled)
            .unwrap();
        assert!(cancel_at > partial_at);

        let cancelled = stream
            .events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::OrderCancelled(ev) => Some(ev),
                _ => None,
            })
            .expect("IOC cancellation");
        assert_eq!(cancelled.order_id, "buy1");
        assert_eq!(cancelled.remaining_quantity, 47);

        // Nothing rested on the bid side.
        let top = engine.top_of_book("AAPL").await.unwrap();
        assert_eq!(top.bid_price_cents, None);
    }

    #[tokio::test]
    async fn test_market_sell_is_ioc() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 30, 15000))
            .await
            .unwrap();
        let order = Order {
            kind: OrderKind::Market,
            limit_price_cents: 0,
            ..limit_order("sell1", "AAPL", Side::Sell, 50, 0)
        };
        let outcome = engine.submit_order(order).await.unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].quantity, 30);
        assert_eq!(outcome.remaining_quantity, 20);

        let cancelled = stream
            .events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::OrderCancelled(ev) if ev.order_id == "sell1" => Some(ev),
                _ => None,
            })
            .expect("IOC cancellation for market sell");
        assert_eq!(cancelled.remaining_quantity, 20);

        // The market remainder never rests.
        let top = engine.top_of_book("AAPL").await.unwrap();
        assert_eq!(top.ask_price_cents, None);
    }

    #[tokio::test]
    async fn test_trade_value_is_price_times_quantity() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 40, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 40, 15000))
            .await
            .unwrap();

        let trade = stream
            .events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::TradeExecuted(ev) => Some(ev),
                _ => None,
            })
            .expect("trade event");
        assert_eq!(trade.total_value_cents, trade.price_cents * trade.quantity);
        assert_eq!(trade.total_value_cents, 600_000);
    }

    #[tokio::test]
    async fn test_validation_rejects_without_book_mutation() {
        let (engine, stream) = engine_with_stream();

        let mut order = limit_order("", "AAPL", Side::Buy, 100, 15000);
        assert_eq!(
            engine.submit_order(order.clone()).await,
            Err(OrderError::EmptyOrderId)
        );

        order.order_id = "buy1".to_string();
        order.symbol = String::new();
        assert_eq!(
            engine.submit_order(order.clone()).await,
            Err(OrderError::EmptyTicker)
        );

        order.symbol = "AAPL".to_string();
        order.quantity = 0;
        assert_eq!(
            engine.submit_order(order.clone()).await,
            Err(OrderError::InvalidQuantity)
        );

        order.quantity = 100;
        order.limit_price_cents = 0;
        assert_eq!(
            engine.submit_order(order).await,
            Err(OrderError::InvalidLimitPrice)
        );

        assert_eq!(
            stream.event_types(),
            vec![EventType::OrderRejected; 4],
        );
        assert!(engine.top_of_book("AAPL").await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_event_carries_reason() {
        let (engine, stream) = engine_with_stream();

        let order = limit_order("buy1", "AAPL", Side::Buy, -5, 15000);
        let _ = engine.submit_order(order).await;

        match &stream.events()[0] {
            EngineEvent::OrderRejected(ev) => {
                assert_eq!(ev.order_id, "buy1");
                assert_eq!(ev.reason, "Invalid quantity");
                assert_eq!(ev.error_message, "Quantity must be greater than 0");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_removes_order() {
        let (engine, stream) = engine_with_stream();

        engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert!(engine.cancel_order("AAPL", "buy1", Side::Buy).await.unwrap());
        // Second cancel reports not-found rather than erroring.
        assert!(!engine.cancel_order("AAPL", "buy1", Side::Buy).await.unwrap());

        let cancelled = stream
            .events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::OrderCancelled(ev) => Some(ev),
                _ => None,
            })
            .expect("cancel event");
        assert_eq!(cancelled.order_id, "buy1");
        assert_eq!(cancelled.remaining_quantity, 100);
    }

    #[tokio::test]
    async fn test_cancelled_order_never_matches() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("sell1", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("sell2", "AAPL", Side::Sell, 50, 15000))
            .await
            .unwrap();
        engine.cancel_order("AAPL", "sell1", Side::Sell).await.unwrap();

        let outcome = engine
            .submit_order(limit_order("buy1", "AAPL", Side::Buy, 50, 15000))
            .await
            .unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].seller_order_id, "sell2");
    }

    #[tokio::test]
    async fn test_cancel_validation_and_unknown_book() {
        let (engine, _) = engine_with_stream();

        assert_eq!(
            engine.cancel_order("", "buy1", Side::Buy).await,
            Err(OrderError::EmptyTicker)
        );
        assert_eq!(
            engine.cancel_order("AAPL", "", Side::Buy).await,
            Err(OrderError::EmptyOrderId)
        );
        // No book for the symbol: not found, not an error.
        assert!(!engine.cancel_order("AAPL", "buy1", Side::Buy).await.unwrap());
    }

    #[tokio::test]
    async fn test_symbols_are_independent() {
        let (engine, _) = engine_with_stream();

        engine
            .submit_order(limit_order("aapl-sell", "AAPL", Side::Sell, 100, 15000))
            .await
            .unwrap();
        engine
            .submit_order(limit_order("googl-sell", "GOOGL", Side::Sell, 50, 140_000))
            .await
            .unwrap();

        let outcome = engine
            .submit_order(limit_order("aapl-buy", "AAPL", Side::Buy, 100, 15000))
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].seller_order_id, "aapl-sell");

        let googl = engine.top_of_book("GOOGL").await.unwrap();
        assert_eq!(googl.ask_price_cents, Some(140_000));
        assert_eq!(googl.ask_volume, 50);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_submissions_do_not_deadlock() {
        let (engine, _) = engine_with_stream();
        let engine = Arc::new(engine);
        let symbols = ["AAPL", "GOOGL", "MSFT", "AMZN", "META"];

        let mut handles = Vec::new();
        for i in 0..100 {
            let engine = engine.clone();
            let symbol = symbols[i % symbols.len()].to_string();
            handles.push(tokio::spawn(async move {
                let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                let order = Order {
                    order_id: format!("order-{i}"),
                    trader_id: i as i64,
                    symbol,
                    side,
                    kind: OrderKind::Limit,
                    quantity: 10,
                    limit_price_cents: 15000 + i as i64,
                    available_balance_cents: 0,
                    timestamp: Utc::now(),
                };
                engine.submit_order(order).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
