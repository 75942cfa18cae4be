//! Closed-position audit records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order_book::{BookSide, OrderBookLevel};
use super::position::{CloseReason, OpenPosition, OpenStats, RiskParams};

/// Top-of-book snapshot captured at open and close time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub taken_at: Option<DateTime<Utc>>,
    /// Asks in ascending price order.
    pub asks: Vec<(Decimal, Decimal)>,
    /// Bids in descending price order.
    pub bids: Vec<(Decimal, Decimal)>,
}

impl BookSnapshot {
    pub fn capture(asks: &[OrderBookLevel], bids: &[OrderBookLevel]) -> Self {
        Self {
            taken_at: Some(Utc::now()),
            asks: asks.iter().map(|l| (l.price, l.volume)).collect(),
            bids: bids.iter().map(|l| (l.price, l.volume)).collect(),
        }
    }
}

/// Immutable record emitted the instant a position closes. Terminal; never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPositionRecord {
    pub symbol: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub pip_size: Decimal,
    pub block_price: Decimal,
    pub block_volume: Decimal,
    pub block_volume_on_open: Decimal,
    pub block_side: BookSide,
    pub block_created_at: DateTime<Utc>,
    pub block_age_on_open_ms: i64,
    pub stats_on_open: OpenStats,
    pub open_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub max_profit_price: Decimal,
    pub position_size: Decimal,
    pub close_price: Decimal,
    pub pnl: Decimal,
    pub max_potential_pnl: Decimal,
    pub close_time: DateTime<Utc>,
    pub close_reason: CloseReason,
    pub book_on_open: BookSnapshot,
    pub book_on_close: BookSnapshot,
}

impl ClosedPositionRecord {
    /// Build the record for a position closing at its stop or take-profit
    /// level.
    ///
    /// The stop-loss path computes max-potential PnL from the tracked
    /// max-favorable price. The take-profit path reports it equal to the
    /// realized PnL instead; the two paths intentionally disagree pending
    /// product clarification, so do not unify them.
    pub fn from_close(
        symbol: &str,
        position: &OpenPosition,
        reason: CloseReason,
        bid: Decimal,
        ask: Decimal,
        risk: &RiskParams,
        book_on_close: BookSnapshot,
    ) -> Self {
        let close_price = match reason {
            CloseReason::StopLoss => position.stop_loss,
            CloseReason::TakeProfit => position.take_profit,
        };
        let pnl = position.realized_pnl(close_price, risk);
        let max_potential_pnl = match reason {
            CloseReason::StopLoss => position.max_potential_pnl(risk),
            CloseReason::TakeProfit => pnl,
        };

        Self {
            symbol: symbol.to_string(),
            bid_price: bid,
            ask_price: ask,
            pip_size: position.pip_size,
            block_price: position.block.price,
            block_volume: position.block.volume,
            block_volume_on_open: position.block_volume_on_open,
            block_side: position.block.side,
            block_created_at: position.block.created_at,
            block_age_on_open_ms: position.block_age_on_open_ms,
            stats_on_open: position.stats_on_open,
            open_price: position.open_price,
            open_time: position.open_time,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            max_profit_price: position.max_profit_price,
            position_size: position.size,
            close_price,
            pnl,
            max_potential_pnl,
            close_time: Utc::now(),
            close_reason: reason,
            book_on_open: position.book_on_open.clone(),
            book_on_close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_block::OrderBlock;
    use rust_decimal_macros::dec;

    fn risk() -> RiskParams {
        RiskParams {
            max_loss: dec!(5),
            capital: dec!(10000),
            commission_pct: dec!(0.05),
            profit_ratio: dec!(20),
        }
    }

    fn open_long() -> OpenPosition {
        let block = OrderBlock {
            price: dec!(100),
            volume: dec!(50),
            side: BookSide::Bid,
            created_at: Utc::now(),
            is_signal: true,
        };
        let stats = OpenStats { threshold: dec!(40), median: dec!(30), std_dev: dec!(10) };
        OpenPosition::new(block, dec!(1), stats, &risk(), BookSnapshot::default())
    }

    #[test]
    fn test_record_mirrors_position_fields() {
        let pos = open_long();
        let record = ClosedPositionRecord::from_close(
            "BTCUSDT",
            &pos,
            CloseReason::StopLoss,
            dec!(99),
            dec!(99.1),
            &risk(),
            BookSnapshot::default(),
        );
        assert_eq!(record.block_price, pos.block.price);
        assert_eq!(record.block_volume, pos.block.volume);
        assert_eq!(record.block_side, pos.block.side);
        assert_eq!(record.open_price, pos.open_price);
        assert_eq!(record.position_size, pos.size);
        assert_eq!(record.close_price, pos.stop_loss);
    }

    #[test]
    fn test_stop_loss_close_is_a_loss() {
        let pos = open_long();
        let record = ClosedPositionRecord::from_close(
            "BTCUSDT",
            &pos,
            CloseReason::StopLoss,
            dec!(99),
            dec!(99.1),
            &risk(),
            BookSnapshot::default(),
        );
        assert_eq!(record.close_reason, CloseReason::StopLoss);
        assert!(record.pnl < Decimal::ZERO);
    }

    #[test]
    fn test_take_profit_reports_pnl_as_max_potential() {
        let mut pos = open_long();
        // Run price beyond the take-profit so the tracked maximum differs
        // from the close price.
        pos.is_take_profit_hit(pos.take_profit + dec!(5), pos.take_profit + dec!(5.1));
        let record = ClosedPositionRecord::from_close(
            "BTCUSDT",
            &pos,
            CloseReason::TakeProfit,
            pos.take_profit,
            pos.take_profit + dec!(0.1),
            &risk(),
            BookSnapshot::default(),
        );
        assert!(record.pnl > Decimal::ZERO);
        // This close path mirrors realized PnL, not the tracked maximum.
        assert_eq!(record.max_potential_pnl, record.pnl);
    }

    #[test]
    fn test_stop_loss_uses_tracked_maximum() {
        let mut pos = open_long();
        pos.is_take_profit_hit(dec!(110), dec!(110.1));
        let record = ClosedPositionRecord::from_close(
            "BTCUSDT",
            &pos,
            CloseReason::StopLoss,
            dec!(99),
            dec!(99.1),
            &risk(),
            BookSnapshot::default(),
        );
        assert!(record.max_potential_pnl > record.pnl);
    }
}
