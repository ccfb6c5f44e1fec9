//! Order book infrastructure
//!
//! Price levels, book sides, and the per-symbol book with its lock.

pub mod book_side;
pub mod price_level;

pub use book_side::BookSide;
pub use price_level::PriceLevel;

use tokio::sync::{Mutex, MutexGuard};
use types::Side;

/// Both sides of one symbol's book. Only reachable through the
/// [`SymbolBook`] lock.
#[derive(Debug)]
pub struct BookSides {
    pub bids: BookSide,
    pub asks: BookSide,
}

/// The order book for a single symbol.
///
/// One exclusive lock covers both sides; every read or mutation goes
/// through it, which is what serializes calls per symbol and keeps event
/// sequences from interleaving.
#[derive(Debug)]
pub struct SymbolBook {
    symbol: String,
    sides: Mutex<BookSides>,
}

impl SymbolBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sides: Mutex::new(BookSides {
                bids: BookSide::new(Side::Buy),
                asks: BookSide::new(Side::Sell),
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn lock(&self) -> MutexGuard<'_, BookSides> {
        self.sides.lock().await
    }
}
