//! One side of a symbol's book
//!
//! Occupied prices live in a map of levels; a binary heap over the prices
//! gives O(log L) best-price access, oriented by the side tag (max-heap for
//! bids, min-heap for asks). The heap is cleaned lazily: removing the last
//! order at a price drops the level but leaves the price in the heap as a
//! stale marker, skipped the next time the best price is read. An
//! `order_id → price` index locates a resting order for cancellation.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use types::{Order, Side};

use super::price_level::PriceLevel;

/// Heap entry ordered so the top is always the side's best price:
/// highest first for bids, lowest first for asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriceKey {
    price_cents: i64,
    side: Side,
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.side {
            Side::Buy => self.price_cents.cmp(&other.price_cents),
            Side::Sell => other.price_cents.cmp(&self.price_cents),
        }
    }
}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct BookSide {
    side: Side,
    levels: HashMap<i64, PriceLevel>,
    prices: BinaryHeap<PriceKey>,
    index: HashMap<String, i64>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: HashMap::new(),
            prices: BinaryHeap::new(),
            index: HashMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Rest an order on this side at its limit price, creating the level
    /// (and its heap entry) if the price was unoccupied.
    pub fn add(&mut self, order: Order) {
        let price = order.limit_price_cents;
        self.index.insert(order.order_id.clone(), price);
        match self.levels.entry(price) {
            Entry::Occupied(mut occupied) => occupied.get_mut().push(order),
            Entry::Vacant(vacant) => {
                self.prices.push(PriceKey {
                    price_cents: price,
                    side: self.side,
                });
                vacant.insert(PriceLevel::new()).push(order);
            }
        }
    }

    /// Remove a resting order by id.
    ///
    /// Drops the level when it becomes empty; its heap entry stays behind
    /// as a stale marker.
    pub fn remove(&mut self, order_id: &str) -> Option<Order> {
        let price = self.index.remove(order_id)?;
        let level = self.levels.get_mut(&price)?;
        let order = level.remove(order_id);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        order
    }

    /// Best price on this side, skipping stale heap entries.
    ///
    /// Read-idempotent: repeated calls without mutation return the same
    /// value.
    pub fn best_price(&mut self) -> Option<i64> {
        while let Some(top) = self.prices.peek() {
            if self.levels.contains_key(&top.price_cents) {
                return Some(top.price_cents);
            }
            self.prices.pop();
        }
        None
    }

    /// Mutable access to the level at the best price.
    pub fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        let price = self.best_price()?;
        self.levels.get_mut(&price)
    }

    /// Mutable access to the level at a specific price.
    ///
    /// Match loops drain one price at a time; pinning the level by price
    /// keeps a drained level from silently giving way to the next-best one
    /// mid-loop.
    pub fn level_mut(&mut self, price_cents: i64) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price_cents)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of resting orders across all levels.
    pub fn order_count(&self) -> usize {
        self.index.len()
    }
}
