//! Per-symbol order book
//!
//! Two price-ordered level maps (asks, bids) with snapshot load, incremental
//! updates, stale-level pruning against the live touch, and best-of-side
//! queries. All mutation and iteration go through one internal lock.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the book a level (or an order block) sits on.
/// Bid-side blocks are long candidates, ask-side blocks short candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    Ask,
    Bid,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookSide::Ask => write!(f, "Ask"),
            BookSide::Bid => write!(f, "Bid"),
        }
    }
}

/// A single resting price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub volume: Decimal,
    pub side: BookSide,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, volume: Decimal, side: BookSide) -> Self {
        Self { price, volume, side }
    }
}

#[derive(Debug, Default)]
struct BookState {
    asks: BTreeMap<Decimal, OrderBookLevel>,
    bids: BTreeMap<Decimal, OrderBookLevel>,
}

/// Price-ordered order book for one symbol.
#[derive(Debug, Default)]
pub struct OrderBook {
    inner: Mutex<BookState>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load a fresh snapshot, replacing any existing levels.
    pub fn load_snapshot(
        &self,
        asks: impl IntoIterator<Item = (Decimal, Decimal)>,
        bids: impl IntoIterator<Item = (Decimal, Decimal)>,
    ) {
        let mut state = self.inner.lock().unwrap();
        state.asks.clear();
        state.bids.clear();
        for (price, volume) in asks {
            state
                .asks
                .insert(price, OrderBookLevel::new(price, volume, BookSide::Ask));
        }
        for (price, volume) in bids {
            state
                .bids
                .insert(price, OrderBookLevel::new(price, volume, BookSide::Bid));
        }
    }

    /// Incremental volume updates. Zero or negative volume removes the level,
    /// anything else upserts it on the given side.
    pub fn apply_incremental(
        &self,
        ask_updates: impl IntoIterator<Item = (Decimal, Decimal)>,
        bid_updates: impl IntoIterator<Item = (Decimal, Decimal)>,
    ) {
        let mut state = self.inner.lock().unwrap();
        for (price, volume) in ask_updates {
            if volume <= Decimal::ZERO {
                state.asks.remove(&price);
            } else {
                state
                    .asks
                    .insert(price, OrderBookLevel::new(price, volume, BookSide::Ask));
            }
        }
        for (price, volume) in bid_updates {
            if volume <= Decimal::ZERO {
                state.bids.remove(&price);
            } else {
                state
                    .bids
                    .insert(price, OrderBookLevel::new(price, volume, BookSide::Bid));
            }
        }
    }

    /// Prune stale levels that have crossed the live touch: asks priced below
    /// `best_ask` and bids priced above `best_bid` can no longer be valid
    /// resting orders.
    pub fn prune_by_price(&self, best_ask: Decimal, best_bid: Decimal) {
        let mut state = self.inner.lock().unwrap();
        let stale_asks: Vec<Decimal> = state
            .asks
            .range(..best_ask)
            .map(|(price, _)| *price)
            .collect();
        for price in stale_asks {
            state.asks.remove(&price);
        }
        let mut stale_bids: Vec<Decimal> = Vec::new();
        for (price, _) in state.bids.range(..).rev() {
            if *price > best_bid {
                stale_bids.push(*price);
            } else {
                break;
            }
        }
        for price in stale_bids {
            state.bids.remove(&price);
        }
    }

    /// Fetch a level by price, checking both sides.
    pub fn try_get(&self, price: Decimal) -> Option<OrderBookLevel> {
        let state = self.inner.lock().unwrap();
        state
            .asks
            .get(&price)
            .or_else(|| state.bids.get(&price))
            .copied()
    }

    /// All current levels across both sides, asks first.
    pub fn all_levels(&self) -> Vec<OrderBookLevel> {
        let state = self.inner.lock().unwrap();
        state
            .asks
            .values()
            .chain(state.bids.values())
            .copied()
            .collect()
    }

    /// Lowest ask, if any.
    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        let state = self.inner.lock().unwrap();
        state.asks.values().next().copied()
    }

    /// Highest bid, if any.
    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        let state = self.inner.lock().unwrap();
        state.bids.values().next_back().copied()
    }

    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap();
        state.asks.len() + state.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top `depth` levels per side for audit snapshots: asks ascending,
    /// bids descending.
    pub fn top_of_book(&self, depth: usize) -> (Vec<OrderBookLevel>, Vec<OrderBookLevel>) {
        let state = self.inner.lock().unwrap();
        let asks = state.asks.values().take(depth).copied().collect();
        let bids = state.bids.values().rev().take(depth).copied().collect();
        (asks, bids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_book() -> OrderBook {
        let book = OrderBook::new();
        book.load_snapshot(
            vec![(dec!(101), dec!(5)), (dec!(102), dec!(3)), (dec!(103), dec!(7))],
            vec![(dec!(100), dec!(4)), (dec!(99), dec!(6)), (dec!(98), dec!(2))],
        );
        book
    }

    #[test]
    fn test_load_snapshot() {
        let book = sample_book();
        assert_eq!(book.len(), 6);
        assert_eq!(book.best_ask().unwrap().price, dec!(101));
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
    }

    #[test]
    fn test_apply_incremental_upsert() {
        let book = sample_book();
        book.apply_incremental(vec![(dec!(101), dec!(9))], vec![(dec!(97), dec!(1))]);
        assert_eq!(book.try_get(dec!(101)).unwrap().volume, dec!(9));
        assert_eq!(book.try_get(dec!(97)).unwrap().side, BookSide::Bid);
        assert_eq!(book.len(), 7);
    }

    #[test]
    fn test_apply_incremental_zero_volume_removes() {
        let book = sample_book();
        book.apply_incremental(vec![(dec!(102), dec!(0))], vec![(dec!(99), dec!(-1))]);
        assert!(book.try_get(dec!(102)).is_none());
        assert!(book.try_get(dec!(99)).is_none());
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn test_prune_by_price() {
        let book = sample_book();
        // Touch moved to 102/99: the 101 ask and 100 bid are stale.
        book.prune_by_price(dec!(102), dec!(99));
        assert!(book.try_get(dec!(101)).is_none());
        assert!(book.try_get(dec!(100)).is_none());
        assert_eq!(book.best_ask().unwrap().price, dec!(102));
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
    }

    #[test]
    fn test_prune_never_leaves_crossed_levels() {
        let book = sample_book();
        book.prune_by_price(dec!(103.5), dec!(97.5));
        for level in book.all_levels() {
            match level.side {
                BookSide::Ask => assert!(level.price >= dec!(103.5)),
                BookSide::Bid => assert!(level.price <= dec!(97.5)),
            }
        }
    }

    #[test]
    fn test_try_get_checks_both_sides() {
        let book = sample_book();
        assert_eq!(book.try_get(dec!(103)).unwrap().side, BookSide::Ask);
        assert_eq!(book.try_get(dec!(98)).unwrap().side, BookSide::Bid);
        assert!(book.try_get(dec!(55)).is_none());
    }

    #[test]
    fn test_top_of_book_ordering() {
        let book = sample_book();
        let (asks, bids) = book.top_of_book(2);
        assert_eq!(asks.iter().map(|l| l.price).collect::<Vec<_>>(), vec![dec!(101), dec!(102)]);
        assert_eq!(bids.iter().map(|l| l.price).collect::<Vec<_>>(), vec![dec!(100), dec!(99)]);
    }

    #[test]
    fn test_empty_book_queries() {
        let book = OrderBook::new();
        assert!(book.best_ask().is_none());
        assert!(book.best_bid().is_none());
        assert!(book.is_empty());
    }
}
