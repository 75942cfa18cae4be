//! CSV closed-position sink
//!
//! Appends one flat row per closed position to an audit file. Writing runs
//! on a background task fed by an unbounded channel so the hot path in the
//! ticker loop never blocks on disk.

use std::fs::OpenOptions;
use std::path::Path;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::error;

use crate::domain::record::ClosedPositionRecord;
use crate::ports::ClosedPositionSink;

/// Row layout of the audit file. Nested structures (open-time statistics,
/// book snapshots) are flattened or JSON-encoded so the file stays a plain
/// one-line-per-position CSV.
#[derive(Debug, Serialize)]
struct CsvRow {
    symbol: String,
    close_time: String,
    close_reason: String,
    block_side: String,
    block_price: String,
    block_volume: String,
    block_volume_on_open: String,
    block_created_at: String,
    block_age_on_open_ms: i64,
    threshold_on_open: String,
    median_on_open: String,
    std_dev_on_open: String,
    open_time: String,
    open_price: String,
    stop_loss: String,
    take_profit: String,
    position_size: String,
    pip_size: String,
    bid_price: String,
    ask_price: String,
    max_profit_price: String,
    close_price: String,
    pnl: String,
    max_potential_pnl: String,
    book_on_open: String,
    book_on_close: String,
}

impl CsvRow {
    fn from_record(record: &ClosedPositionRecord) -> Self {
        Self {
            symbol: record.symbol.clone(),
            close_time: record.close_time.to_rfc3339(),
            close_reason: record.close_reason.to_string(),
            block_side: record.block_side.to_string(),
            block_price: record.block_price.to_string(),
            block_volume: record.block_volume.to_string(),
            block_volume_on_open: record.block_volume_on_open.to_string(),
            block_created_at: record.block_created_at.to_rfc3339(),
            block_age_on_open_ms: record.block_age_on_open_ms,
            threshold_on_open: record.stats_on_open.threshold.to_string(),
            median_on_open: record.stats_on_open.median.to_string(),
            std_dev_on_open: record.stats_on_open.std_dev.to_string(),
            open_time: record.open_time.to_rfc3339(),
            open_price: record.open_price.to_string(),
            stop_loss: record.stop_loss.to_string(),
            take_profit: record.take_profit.to_string(),
            position_size: record.position_size.to_string(),
            pip_size: record.pip_size.to_string(),
            bid_price: record.bid_price.to_string(),
            ask_price: record.ask_price.to_string(),
            max_profit_price: record.max_profit_price.to_string(),
            close_price: record.close_price.to_string(),
            pnl: record.pnl.to_string(),
            max_potential_pnl: record.max_potential_pnl.to_string(),
            book_on_open: serde_json::to_string(&record.book_on_open).unwrap_or_default(),
            book_on_close: serde_json::to_string(&record.book_on_close).unwrap_or_default(),
        }
    }
}

pub struct CsvPositionSink {
    tx: mpsc::UnboundedSender<ClosedPositionRecord>,
}

impl CsvPositionSink {
    /// Open (or create) the audit file and start the writer task. Headers
    /// are written only when the file is empty, so restarts append cleanly.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let fresh = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);

        let (tx, mut rx) = mpsc::unbounded_channel::<ClosedPositionRecord>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = writer.serialize(CsvRow::from_record(&record)) {
                    error!(symbol = %record.symbol, %err, "failed to write closed position row");
                    continue;
                }
                if let Err(err) = writer.flush() {
                    error!(%err, "failed to flush closed position file");
                }
            }
        });
        Ok(Self { tx })
    }
}

impl ClosedPositionSink for CsvPositionSink {
    fn log(&self, record: ClosedPositionRecord) {
        // Receiver only goes away at process teardown.
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_block::OrderBlock;
    use crate::domain::order_book::BookSide;
    use crate::domain::position::{CloseReason, OpenStats, PendingPosition, RiskParams};
    use crate::domain::record::BookSnapshot;
    use rust_decimal_macros::dec;

    fn sample_record() -> ClosedPositionRecord {
        let block = OrderBlock {
            price: dec!(100),
            volume: dec!(50),
            side: BookSide::Bid,
            created_at: chrono::Utc::now(),
            is_signal: true,
        };
        let pending = PendingPosition::new(block, dec!(0.5));
        let stats = OpenStats {
            threshold: dec!(30),
            median: dec!(20),
            std_dev: dec!(10),
        };
        let risk = RiskParams {
            max_loss: dec!(5),
            capital: dec!(10000),
            commission_pct: dec!(0.05),
            profit_ratio: dec!(20),
        };
        let position = pending.into_open(stats, &risk, BookSnapshot::default());
        ClosedPositionRecord::from_close(
            "BTCUSDT",
            &position,
            CloseReason::StopLoss,
            dec!(99),
            dec!(99.5),
            &risk,
            BookSnapshot::default(),
        )
    }

    #[tokio::test]
    async fn test_writes_header_and_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("closed_positions.csv");
        let sink = CsvPositionSink::open(&path).expect("open sink");

        sink.log(sample_record());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let contents = std::fs::read_to_string(&path).expect("read back");
        let mut lines = contents.lines();
        let header = lines.next().expect("header line");
        assert!(header.starts_with("symbol,close_time,close_reason"));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("BTCUSDT,"));
        assert!(row.contains("stop_loss") || row.contains("StopLoss") || row.contains("stop loss"));
    }

    #[tokio::test]
    async fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("closed_positions.csv");
        {
            let sink = CsvPositionSink::open(&path).expect("open sink");
            sink.log(sample_record());
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        let sink = CsvPositionSink::open(&path).expect("reopen sink");
        sink.log(sample_record());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let contents = std::fs::read_to_string(&path).expect("read back");
        let headers = contents
            .lines()
            .filter(|line| line.starts_with("symbol,"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 3);
    }
}
