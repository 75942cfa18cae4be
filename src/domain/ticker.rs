//! Ticker aggregate and per-symbol event loop
//!
//! One Ticker owns the order book, the order-block registry, the rolling
//! volume window and the position slots for a single symbol. All inbound
//! market data arrives as events on one unbounded queue; exactly one
//! consuming loop per ticker drains it, so every mutation of the ticker's
//! state is serialized without per-field coordination.
//!
//! Dwell promotions ride the same loop: the select waits on the registry's
//! earliest eligible-at deadline next to the queue, so a promotion behaves
//! like a reevaluation event delivered in order.

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::ports::{ClosedPositionSink, MarketDataError, MarketDataPort, PriceVolumePairs};

use super::order_block::OrderBlockRegistry;
use super::order_book::{BookSide, OrderBook};
use super::position::{CloseReason, OpenPosition, OpenStats, PendingPosition};
use super::record::{BookSnapshot, ClosedPositionRecord};
use super::volatility::VolumeWindow;

/// Levels per side captured in audit snapshots.
const SNAPSHOT_LEVELS: usize = 100;

/// Inbound event kinds, dispatched by a single match in the loop.
#[derive(Debug, Clone)]
pub enum TickerEvent {
    PriceUpdate {
        bid: Decimal,
        ask: Decimal,
    },
    BookDelta {
        ask_updates: PriceVolumePairs,
        bid_updates: PriceVolumePairs,
    },
    VolumeSample {
        volume: Decimal,
    },
    ReevaluateSignals,
}

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("{symbol} not ready: {reason}")]
    NotReady { symbol: String, reason: String },
    #[error("market data: {0}")]
    MarketData(#[from] MarketDataError),
}

/// Mutable per-symbol state behind one lock. Only the event loop writes it
/// once the loop has started; bringup seeds it beforehand.
struct TickerState {
    pip_size: Decimal,
    bid: Decimal,
    ask: Decimal,
    registry: OrderBlockRegistry,
    pending_long: Option<PendingPosition>,
    pending_short: Option<PendingPosition>,
    open: Option<OpenPosition>,
}

/// Per-symbol aggregate root.
pub struct Ticker {
    pub symbol: String,
    cfg: EngineConfig,
    market_data: Arc<dyn MarketDataPort>,
    sink: Arc<dyn ClosedPositionSink>,
    tx: mpsc::UnboundedSender<TickerEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TickerEvent>>>,
    book: OrderBook,
    /// Own lock: written by the seeding path during bringup and by the event
    /// loop afterwards.
    volumes: Mutex<VolumeWindow>,
    state: Mutex<TickerState>,
}

impl Ticker {
    pub fn new(
        symbol: impl Into<String>,
        cfg: EngineConfig,
        market_data: Arc<dyn MarketDataPort>,
        sink: Arc<dyn ClosedPositionSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dwell = cfg.dwell;
        let volume_window = cfg.volume_window;
        Self {
            symbol: symbol.into(),
            cfg,
            market_data,
            sink,
            tx,
            rx: Mutex::new(Some(rx)),
            book: OrderBook::new(),
            volumes: Mutex::new(VolumeWindow::new(volume_window)),
            state: Mutex::new(TickerState {
                pip_size: Decimal::ZERO,
                bid: Decimal::ZERO,
                ask: Decimal::ZERO,
                registry: OrderBlockRegistry::new(dwell),
                pending_long: None,
                pending_short: None,
                open: None,
            }),
        }
    }

    /// Queue an event for the loop. Returns false when the loop is gone.
    pub fn enqueue(&self, event: TickerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Fetch pip size, an initial book snapshot and seed volume history.
    /// Fails with `NotReady` if the pip size is non-positive, the book comes
    /// back empty, or the threshold is non-positive after seeding.
    pub async fn initialize(&self) -> Result<(), TickerError> {
        let pip_size = self.market_data.tick_size(&self.symbol).await?;
        let (asks, bids) = self
            .market_data
            .initial_snapshot(&self.symbol, self.cfg.snapshot_depth)
            .await?;
        let seed_volumes = self.market_data.recent_volumes(&self.symbol).await?;

        self.book.load_snapshot(asks, bids);

        let threshold = {
            let mut volumes = self.volumes.lock().unwrap();
            *volumes = VolumeWindow::new(self.cfg.volume_window);
            volumes.seed(seed_volumes);
            volumes.threshold()
        };

        {
            let mut state = self.state.lock().unwrap();
            state.pip_size = pip_size;
            state.registry.clear();
            state.pending_long = None;
            state.pending_short = None;
            state.open = None;
        }

        if pip_size <= Decimal::ZERO {
            return Err(self.not_ready(format!("pip size {pip_size}")));
        }
        if self.book.is_empty() {
            return Err(self.not_ready("empty order book snapshot".to_string()));
        }
        if threshold <= Decimal::ZERO {
            return Err(self.not_ready(format!("threshold {threshold} after seeding")));
        }

        info!(symbol = %self.symbol, %threshold, %pip_size, "ticker initialized");
        Ok(())
    }

    fn not_ready(&self, reason: String) -> TickerError {
        TickerError::NotReady {
            symbol: self.symbol.clone(),
            reason,
        }
    }

    /// Consume the event queue until shutdown or queue closure. Sole writer
    /// of this ticker's state from here on.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rx = match self.rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                warn!(symbol = %self.symbol, "event loop already started");
                return;
            }
        };
        info!(symbol = %self.symbol, "event loop started");

        loop {
            let next_promotion = self.state.lock().unwrap().registry.next_promotion();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                _ = sleep_until_opt(next_promotion) => {
                    let promoted = self
                        .state
                        .lock()
                        .unwrap()
                        .registry
                        .promote_due(Instant::now());
                    if promoted > 0 {
                        debug!(symbol = %self.symbol, promoted, "order blocks promoted to signal");
                        self.reevaluate();
                    }
                }
            }
        }

        info!(symbol = %self.symbol, "event loop stopped");
    }

    /// Single dispatch point for the finite event kinds.
    pub fn handle_event(&self, event: TickerEvent) {
        match event {
            TickerEvent::PriceUpdate { bid, ask } => self.on_price_update(bid, ask),
            TickerEvent::BookDelta { ask_updates, bid_updates } => {
                self.book.apply_incremental(ask_updates, bid_updates);
                self.cascade();
            }
            TickerEvent::VolumeSample { volume } => {
                self.volumes.lock().unwrap().push(volume);
                self.cascade();
            }
            TickerEvent::ReevaluateSignals => self.reevaluate(),
        }
    }

    fn on_price_update(&self, bid: Decimal, ask: Decimal) {
        {
            let mut state = self.state.lock().unwrap();
            if state.bid == bid && state.ask == ask {
                return;
            }
            state.bid = bid;
            state.ask = ask;
        }
        self.book.prune_by_price(ask, bid);
        self.cascade();
    }

    /// Book-change cascade: drop stale blocks, track new candidates, then
    /// reevaluate positions. Runs atomically with respect to other events on
    /// this ticker because the loop is the only caller.
    fn cascade(&self) {
        let threshold = self.volumes.lock().unwrap().threshold();
        {
            let mut state = self.state.lock().unwrap();

            for price in state.registry.prices() {
                let block_side = match state.registry.get(price) {
                    Some(block) => block.side,
                    None => continue,
                };
                let backing_valid = match self.book.try_get(price) {
                    Some(level) => level.volume >= threshold && level.side == block_side,
                    None => false,
                };
                if !backing_valid {
                    state.registry.remove_candidate(price);
                    debug!(symbol = %self.symbol, %price, "order block removed");
                }
            }

            for level in self.book.all_levels() {
                if level.volume >= threshold && !state.registry.contains(level.price) {
                    state.registry.add_candidate(&level);
                    debug!(
                        symbol = %self.symbol,
                        price = %level.price,
                        volume = %level.volume,
                        side = %level.side,
                        "order block candidate added"
                    );
                }
            }
        }
        self.reevaluate();
    }

    /// Pending/open position logic: refresh pending slots against the best
    /// signal blocks, open on a qualifying retracement, close on stop-loss
    /// or take-profit. Stop-loss wins when both trigger in the same event.
    fn reevaluate(&self) {
        let stats = {
            let volumes = self.volumes.lock().unwrap();
            OpenStats {
                threshold: volumes.threshold(),
                median: volumes.median(),
                std_dev: volumes.std_dev(),
            }
        };
        let mut state = self.state.lock().unwrap();

        if state.open.is_none() {
            let best_long = state.registry.best_signal(BookSide::Bid).cloned();
            let best_short = state.registry.best_signal(BookSide::Ask).cloned();

            if differs(&state.pending_long, &best_long) {
                let pip_size = state.pip_size;
                state.pending_long = best_long.map(|block| {
                    debug!(symbol = %self.symbol, block = %block, "pending long replaced");
                    PendingPosition::new(block, pip_size)
                });
            }
            if differs(&state.pending_short, &best_short) {
                let pip_size = state.pip_size;
                state.pending_short = best_short.map(|block| {
                    debug!(symbol = %self.symbol, block = %block, "pending short replaced");
                    PendingPosition::new(block, pip_size)
                });
            }

            self.try_open(&mut state, BookSide::Bid, stats);
            self.try_open(&mut state, BookSide::Ask, stats);
        }

        let (bid, ask) = (state.bid, state.ask);
        let reason = match state.open.as_mut() {
            Some(open) => {
                if open.is_stop_loss_hit(bid, ask) {
                    Some(CloseReason::StopLoss)
                } else if open.is_take_profit_hit(bid, ask) {
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some(reason) = reason {
            let open = state.open.take().expect("close reason implies open position");
            let record = ClosedPositionRecord::from_close(
                &self.symbol,
                &open,
                reason,
                bid,
                ask,
                &self.cfg.risk,
                self.book_snapshot(),
            );
            info!(
                symbol = %self.symbol,
                reason = %reason,
                close_price = %record.close_price,
                pnl = %record.pnl,
                "position closed"
            );
            self.sink.log(record);
        }
    }

    /// Open the pending position of `side` if the current touch retraced
    /// into its entry band. Opening clears both pending slots.
    fn try_open(&self, state: &mut TickerState, side: BookSide, stats: OpenStats) {
        if state.open.is_some() {
            return;
        }
        let slot = match side {
            BookSide::Bid => &state.pending_long,
            BookSide::Ask => &state.pending_short,
        };
        let should = slot
            .as_ref()
            .map(|pending| pending.should_open(state.bid, state.ask))
            .unwrap_or(false);
        if !should {
            return;
        }

        let pending = match side {
            BookSide::Bid => state.pending_long.take(),
            BookSide::Ask => state.pending_short.take(),
        }
        .expect("qualifying pending position");
        state.pending_long = None;
        state.pending_short = None;

        let position = pending.into_open(stats, &self.cfg.risk, self.book_snapshot());
        info!(
            symbol = %self.symbol,
            side = %side,
            open_price = %position.open_price,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            size = %position.size,
            "position opened"
        );
        state.open = Some(position);
    }

    fn book_snapshot(&self) -> BookSnapshot {
        let (asks, bids) = self.book.top_of_book(SNAPSHOT_LEVELS);
        BookSnapshot::capture(&asks, &bids)
    }

    // Read-only projections, mainly for tests and status reporting.

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn pip_size(&self) -> Decimal {
        self.state.lock().unwrap().pip_size
    }

    pub fn threshold(&self) -> Decimal {
        self.volumes.lock().unwrap().threshold()
    }

    pub fn touch(&self) -> (Decimal, Decimal) {
        let state = self.state.lock().unwrap();
        (state.bid, state.ask)
    }

    pub fn block_count(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }

    pub fn pending_long(&self) -> Option<PendingPosition> {
        self.state.lock().unwrap().pending_long.clone()
    }

    pub fn pending_short(&self) -> Option<PendingPosition> {
        self.state.lock().unwrap().pending_short.clone()
    }

    pub fn open_position(&self) -> Option<OpenPosition> {
        self.state.lock().unwrap().open.clone()
    }
}

/// Pending slot differs from the best signal block. Identity is the price.
fn differs(pending: &Option<PendingPosition>, best: &Option<super::order_block::OrderBlock>) -> bool {
    match (pending, best) {
        (Some(pending), Some(best)) => pending.block.price != best.price,
        (None, None) => false,
        _ => true,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
