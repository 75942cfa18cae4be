//! Order blocks and their registry
//!
//! An order block is a book level whose volume met the volatility threshold,
//! tracked as a candidate support/resistance signal. Candidates dwell for a
//! fixed interval before they are promoted to signals; removal before the
//! interval elapses cancels the promotion.
//!
//! Promotion timing is a min-heap of eligible-at deadlines swept by the
//! owning ticker's event loop rather than one background task per block.
//! Removal leaves a stale heap entry behind; the sweep skips entries whose
//! block is gone or already signaled, so cancellation is a map removal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::order_book::{BookSide, OrderBookLevel};

/// A tracked candidate level. Identity is the price alone; volume and side
/// are a snapshot from creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub price: Decimal,
    pub volume: Decimal,
    pub side: BookSide,
    pub created_at: DateTime<Utc>,
    pub is_signal: bool,
}

impl OrderBlock {
    fn from_level(level: &OrderBookLevel) -> Self {
        Self {
            price: level.price,
            volume: level.volume,
            side: level.side,
            created_at: Utc::now(),
            is_signal: false,
        }
    }
}

impl std::fmt::Display for OrderBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {}", self.price, self.volume, self.side)
    }
}

/// Scheduled promotion. Carries the block's creation time so a block
/// removed and re-created at the same price is not promoted by the old
/// entry's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Promotion {
    due: Instant,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl Ord for Promotion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due).then(self.price.cmp(&other.price))
    }
}

impl PartialOrd for Promotion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-ticker registry of candidate order blocks keyed by price.
#[derive(Debug)]
pub struct OrderBlockRegistry {
    blocks: HashMap<Decimal, OrderBlock>,
    promotions: BinaryHeap<Reverse<Promotion>>,
    dwell: Duration,
}

impl OrderBlockRegistry {
    pub fn new(dwell: Duration) -> Self {
        Self {
            blocks: HashMap::new(),
            promotions: BinaryHeap::new(),
            dwell,
        }
    }

    /// Track a new candidate from a qualifying level and schedule its
    /// promotion. Prices already tracked are left untouched.
    pub fn add_candidate(&mut self, level: &OrderBookLevel) -> bool {
        if self.blocks.contains_key(&level.price) {
            return false;
        }
        let block = OrderBlock::from_level(level);
        self.promotions.push(Reverse(Promotion {
            due: Instant::now() + self.dwell,
            price: level.price,
            created_at: block.created_at,
        }));
        self.blocks.insert(level.price, block);
        true
    }

    /// Drop a candidate. Its scheduled promotion becomes a stale heap entry
    /// that the next sweep discards.
    pub fn remove_candidate(&mut self, price: Decimal) -> Option<OrderBlock> {
        self.blocks.remove(&price)
    }

    /// Earliest scheduled promotion deadline, if any entries remain. May
    /// point at an already-removed block; the sweep sorts that out.
    pub fn next_promotion(&self) -> Option<Instant> {
        self.promotions.peek().map(|entry| entry.0.due)
    }

    /// Promote every due candidate that is still tracked and not yet a
    /// signal. Returns how many blocks were promoted.
    pub fn promote_due(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while let Some(Reverse(entry)) = self.promotions.peek().copied() {
            if entry.due > now {
                break;
            }
            self.promotions.pop();
            if let Some(block) = self.blocks.get_mut(&entry.price) {
                if block.created_at == entry.created_at && !block.is_signal {
                    block.is_signal = true;
                    promoted += 1;
                }
            }
        }
        promoted
    }

    /// Best signaled block for a side: highest price for bids (best long
    /// entry), lowest for asks (best short entry).
    pub fn best_signal(&self, side: BookSide) -> Option<&OrderBlock> {
        self.blocks
            .values()
            .filter(|block| block.is_signal && block.side == side)
            .max_by_key(|block| match side {
                BookSide::Bid => block.price,
                BookSide::Ask => -block.price,
            })
    }

    pub fn get(&self, price: Decimal) -> Option<&OrderBlock> {
        self.blocks.get(&price)
    }

    pub fn contains(&self, price: Decimal) -> bool {
        self.blocks.contains_key(&price)
    }

    /// Tracked prices, for the stale-removal pass.
    pub fn prices(&self) -> Vec<Decimal> {
        self.blocks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop all candidates and scheduled promotions.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.promotions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, volume: Decimal, side: BookSide) -> OrderBookLevel {
        OrderBookLevel::new(price, volume, side)
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_candidate_once_per_price() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(120));
        assert!(registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Ask)));
        assert!(!registry.add_candidate(&level(dec!(100), dec!(70), BookSide::Ask)));
        assert_eq!(registry.len(), 1);
        // The first snapshot wins.
        assert_eq!(registry.get(dec!(100)).unwrap().volume, dec!(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotion_after_dwell() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(120));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Ask));
        assert!(!registry.get(dec!(100)).unwrap().is_signal);

        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(registry.promote_due(Instant::now()), 0);
        assert!(!registry.get(dec!(100)).unwrap().is_signal);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(registry.promote_due(Instant::now()), 1);
        assert!(registry.get(dec!(100)).unwrap().is_signal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_cancels_promotion() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(120));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Ask));
        registry.remove_candidate(dec!(100));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(registry.promote_due(Instant::now()), 0);
        assert!(registry.best_signal(BookSide::Ask).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreated_block_dwells_again() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(120));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Ask));
        tokio::time::advance(Duration::from_secs(60)).await;
        registry.remove_candidate(dec!(100));
        registry.add_candidate(&level(dec!(100), dec!(60), BookSide::Ask));

        // The original deadline passes but must not promote the new block.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.promote_due(Instant::now()), 0);
        assert!(!registry.get(dec!(100)).unwrap().is_signal);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(registry.promote_due(Instant::now()), 1);
        assert!(registry.get(dec!(100)).unwrap().is_signal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_signal_per_side() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(1));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Bid));
        registry.add_candidate(&level(dec!(98), dec!(40), BookSide::Bid));
        registry.add_candidate(&level(dec!(105), dec!(30), BookSide::Ask));
        registry.add_candidate(&level(dec!(107), dec!(35), BookSide::Ask));

        tokio::time::advance(Duration::from_secs(2)).await;
        registry.promote_due(Instant::now());

        assert_eq!(registry.best_signal(BookSide::Bid).unwrap().price, dec!(100));
        assert_eq!(registry.best_signal(BookSide::Ask).unwrap().price, dec!(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_signal_ignores_unpromoted() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(120));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Bid));
        assert!(registry.best_signal(BookSide::Bid).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_everything() {
        let mut registry = OrderBlockRegistry::new(Duration::from_secs(1));
        registry.add_candidate(&level(dec!(100), dec!(50), BookSide::Bid));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.next_promotion().is_none());
    }
}
