//! Rolling volume statistics
//!
//! Fixed-capacity FIFO of recent kline volumes. Every pushed sample
//! recomputes the median, the population standard deviation and the derived
//! threshold (median + 1 stddev) that gates order-block creation and removal.

use std::collections::VecDeque;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Default number of retained samples (5 days of 5-minute klines).
pub const DEFAULT_WINDOW: usize = 1440;

/// Bounded window of volume samples with derived statistics.
#[derive(Debug, Clone)]
pub struct VolumeWindow {
    samples: VecDeque<Decimal>,
    capacity: usize,
    median: Decimal,
    std_dev: Decimal,
    threshold: Decimal,
}

impl VolumeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            median: Decimal::ZERO,
            std_dev: Decimal::ZERO,
            threshold: Decimal::ZERO,
        }
    }

    /// Push one sample, evicting the oldest when full, and recompute stats.
    pub fn push(&mut self, volume: Decimal) {
        self.samples.push_back(volume);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.recompute();
    }

    /// Seed with historical samples, oldest first.
    pub fn seed(&mut self, volumes: impl IntoIterator<Item = Decimal>) {
        for volume in volumes {
            self.samples.push_back(volume);
            if self.samples.len() > self.capacity {
                self.samples.pop_front();
            }
        }
        self.recompute();
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn median(&self) -> Decimal {
        self.median
    }

    pub fn std_dev(&self) -> Decimal {
        self.std_dev
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn recompute(&mut self) {
        if self.samples.is_empty() {
            self.median = Decimal::ZERO;
            self.std_dev = Decimal::ZERO;
            self.threshold = Decimal::ZERO;
            return;
        }
        self.median = median(self.samples.iter().copied().collect());
        self.std_dev = std_dev(&self.samples);
        self.threshold = self.median + self.std_dev;
    }
}

/// Median: average of the two middle values for an even count, the middle
/// value otherwise.
fn median(mut values: Vec<Decimal>) -> Decimal {
    values.sort();
    let count = values.len();
    if count % 2 == 0 {
        (values[count / 2 - 1] + values[count / 2]) / Decimal::TWO
    } else {
        values[count / 2]
    }
}

/// Population standard deviation: sqrt(mean squared deviation).
fn std_dev(values: &VecDeque<Decimal>) -> Decimal {
    let count = Decimal::from(values.len());
    let mean = values.iter().copied().sum::<Decimal>() / count;
    let sum_sq = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>();
    let variance = sum_sq / count;
    // sqrt has no exact decimal form; round-trip through f64.
    let root = variance.to_f64().unwrap_or(0.0).sqrt();
    Decimal::from_f64(root).unwrap_or(Decimal::ZERO)
}
