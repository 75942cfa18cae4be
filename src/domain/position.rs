//! Pending and open positions
//!
//! A pending position tracks the best signaled order block of one side and
//! waits for a qualifying price retracement. An open position carries the
//! solved stop-loss, take-profit and position size, plus the statistics
//! snapshot taken at open time for the audit record.
//!
//! Direction follows the block side: a bid-side block backs a long, an
//! ask-side block backs a short.
//!
//! Order execution prices: a long opens at the ask and closes at the bid;
//! a short opens at the bid and closes at the ask.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order_block::OrderBlock;
use super::order_book::BookSide;
use super::record::BookSnapshot;

/// Fixed risk parameters applied to every open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Maximum net loss per trade, in quote currency.
    pub max_loss: Decimal,
    /// Total capital, caps the position size.
    pub capital: Decimal,
    /// Commission percent per side (0.05 means 0.05%).
    pub commission_pct: Decimal,
    /// Profit:loss asymmetry applied when solving the take-profit.
    pub profit_ratio: Decimal,
}

impl RiskParams {
    /// Commission factor per side: 0.05% becomes 0.0005.
    pub fn commission_factor(&self) -> Decimal {
        self.commission_pct / Decimal::ONE_HUNDRED
    }

    /// Round-trip commission cost for a position of `size`.
    pub fn round_trip_commission(&self, size: Decimal) -> Decimal {
        Decimal::TWO * size * self.commission_factor()
    }
}

/// An unopened position awaiting a retracement into its entry band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPosition {
    pub block: OrderBlock,
    pub open_price: Decimal,
    pub pip_size: Decimal,
}

impl PendingPosition {
    /// Open price sits one pip beyond the block: above for a long (bid-side
    /// block), below for a short (ask-side block).
    pub fn new(block: OrderBlock, pip_size: Decimal) -> Self {
        let open_price = match block.side {
            BookSide::Bid => block.price + pip_size,
            BookSide::Ask => block.price - pip_size,
        };
        Self { block, open_price, pip_size }
    }

    /// Entry test. A long opens when the ask retraces into
    /// [block price, open price]; a short when the bid retraces into
    /// [open price, block price].
    pub fn should_open(&self, bid: Decimal, ask: Decimal) -> bool {
        match self.block.side {
            BookSide::Bid => ask <= self.open_price && ask >= self.block.price,
            BookSide::Ask => bid >= self.open_price && bid <= self.block.price,
        }
    }

    /// Convert into an open position, snapshotting the ticker statistics.
    pub fn into_open(self, stats: OpenStats, risk: &RiskParams, book_on_open: BookSnapshot) -> OpenPosition {
        OpenPosition::new(self.block, self.pip_size, stats, risk, book_on_open)
    }
}

/// Ticker statistics captured at the moment a position opens. Audit only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenStats {
    pub threshold: Decimal,
    pub median: Decimal,
    pub std_dev: Decimal,
}

/// Why an open position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "StopLoss"),
            CloseReason::TakeProfit => write!(f, "TakeProfit"),
        }
    }
}

/// A live position under stop-loss / take-profit management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub block: OrderBlock,
    pub open_price: Decimal,
    pub pip_size: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Size in quote currency.
    pub size: Decimal,
    /// Running best price seen while open: max bid for a long, min ask for
    /// a short. Feeds max-potential-PnL reporting only.
    pub max_profit_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub stats_on_open: OpenStats,
    pub block_volume_on_open: Decimal,
    /// How long the block had existed when the position opened.
    pub block_age_on_open_ms: i64,
    pub book_on_open: BookSnapshot,
}

impl OpenPosition {
    /// Solve stop-loss, size and take-profit from the risk parameters.
    ///
    /// The stop sits one pip beyond the block. The size is chosen so that a
    /// stop-out, net of round-trip commission, loses exactly `max_loss`:
    ///   size = max_loss / (|open - stop| / open + 2 * commission_factor)
    /// The take-profit applies the profit:loss asymmetry to the uncapped
    /// size; the capital cap is applied to the size afterwards.
    pub fn new(
        block: OrderBlock,
        pip_size: Decimal,
        stats: OpenStats,
        risk: &RiskParams,
        book_on_open: BookSnapshot,
    ) -> Self {
        let open_price = match block.side {
            BookSide::Bid => block.price + pip_size,
            BookSide::Ask => block.price - pip_size,
        };
        let stop_loss = match block.side {
            BookSide::Bid => block.price - pip_size,
            BookSide::Ask => block.price + pip_size,
        };
        let distance = (open_price - stop_loss).abs();
        let comm = risk.commission_factor();

        let size = risk.max_loss / (distance / open_price + Decimal::TWO * comm);

        let reward = risk.max_loss * risk.profit_ratio / size;
        let take_profit = match block.side {
            BookSide::Bid => open_price * (Decimal::ONE + reward + Decimal::TWO * comm),
            BookSide::Ask => open_price * (Decimal::ONE - reward - Decimal::TWO * comm),
        };

        let size = size.min(risk.capital);
        let block_age_on_open_ms = (Utc::now() - block.created_at).num_milliseconds();
        let block_volume_on_open = block.volume;

        Self {
            block,
            open_price,
            pip_size,
            stop_loss,
            take_profit,
            size,
            max_profit_price: open_price,
            open_time: Utc::now(),
            stats_on_open: stats,
            block_volume_on_open,
            block_age_on_open_ms,
            book_on_open,
        }
    }

    pub fn side(&self) -> BookSide {
        self.block.side
    }

    /// Stop-loss trigger: bid through the stop for a long, ask through the
    /// stop for a short.
    pub fn is_stop_loss_hit(&self, bid: Decimal, ask: Decimal) -> bool {
        match self.block.side {
            BookSide::Bid => bid <= self.stop_loss,
            BookSide::Ask => ask >= self.stop_loss,
        }
    }

    /// Take-profit trigger. Also advances the running max-favorable price,
    /// so this must be evaluated on every price event while open.
    pub fn is_take_profit_hit(&mut self, bid: Decimal, ask: Decimal) -> bool {
        match self.block.side {
            BookSide::Bid => {
                self.max_profit_price = self.max_profit_price.max(bid);
                bid >= self.take_profit
            }
            BookSide::Ask => {
                self.max_profit_price = self.max_profit_price.min(ask);
                ask <= self.take_profit
            }
        }
    }

    /// Quantity of the asset: size / open price.
    pub fn coins(&self) -> Decimal {
        self.size / self.open_price
    }

    /// Realized PnL for a close at `close_price`, net of round-trip
    /// commission.
    pub fn realized_pnl(&self, close_price: Decimal, risk: &RiskParams) -> Decimal {
        let gross = match self.block.side {
            BookSide::Bid => (close_price - self.open_price) * self.coins(),
            BookSide::Ask => (self.open_price - close_price) * self.coins(),
        };
        gross - risk.round_trip_commission(self.size)
    }

    /// PnL had the position been closed at the max-favorable price, net of
    /// round-trip commission.
    pub fn max_potential_pnl(&self, risk: &RiskParams) -> Decimal {
        let gross = match self.block.side {
            BookSide::Bid => (self.max_profit_price - self.open_price) * self.coins(),
            BookSide::Ask => (self.open_price - self.max_profit_price) * self.coins(),
        };
        gross - risk.round_trip_commission(self.size)
    }
}
