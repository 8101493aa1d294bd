//! Technical indicators - stateful computations over price series.
//!
//! Each indicator is updated incrementally, one bar at a time, and reports
//! `None` until its window has filled.

use std::collections::VecDeque;

use crate::market::Bar;

// =============================================================================
// Rolling Statistics
// =============================================================================

/// Simple moving average with fixed window
#[derive(Debug, Clone)]
pub struct Sma {
    window: VecDeque<f64>,
    period: usize,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period: period.max(1),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.sum += value;
        self.window.push_back(value);
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.get()
    }

    pub fn get(&self) -> Option<f64> {
        if self.is_ready() {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.period
    }
}

/// Rolling population standard deviation (ddof = 0)
#[derive(Debug, Clone)]
pub struct RollingStd {
    window: VecDeque<f64>,
    period: usize,
}

impl RollingStd {
    pub fn new(period: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period: period.max(1),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push_back(value);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.get()
    }

    pub fn get(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        // Recompute from the window; sums drift over long sessions.
        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let var = self.window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some(var.sqrt())
    }
}

// =============================================================================
// Oscillators
// =============================================================================

/// Relative Strength Index with Wilder smoothing
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: f64,
    avg_loss: f64,
    prev_price: Option<f64>,
    count: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            avg_gain: 0.0,
            avg_loss: 0.0,
            prev_price: None,
            count: 0,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            self.count += 1;

            if self.count <= self.period {
                // Seed with the simple mean of the first `period` changes
                let n = self.count as f64;
                self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
                self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
            } else {
                let p = self.period as f64;
                self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
                self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
            }
        }
        self.prev_price = Some(price);
        self.get()
    }

    pub fn get(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 {
                Some(50.0)
            } else {
                Some(100.0)
            }
        } else {
            let rs = self.avg_gain / self.avg_loss;
            Some(100.0 - (100.0 / (1.0 + rs)))
        }
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }
}

// =============================================================================
// Volatility Envelopes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands: SMA ± k population std devs
#[derive(Debug, Clone)]
pub struct BollingerBands {
    sma: Sma,
    std: RollingStd,
    multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            sma: Sma::new(period),
            std: RollingStd::new(period),
            multiplier,
        }
    }

    pub fn default_20_2() -> Self {
        Self::new(20, 2.0)
    }

    pub fn update(&mut self, close: f64) -> Option<Band> {
        let middle = self.sma.update(close);
        let std = self.std.update(close);
        let (middle, std) = (middle?, std?);
        let width = std * self.multiplier;
        Some(Band { upper: middle + width, middle, lower: middle - width })
    }
}

/// Keltner Channels: SMA of close ± k × SMA of true range
#[derive(Debug, Clone)]
pub struct KeltnerChannel {
    basis: Sma,
    range: Sma,
    prev_close: Option<f64>,
    multiplier: f64,
}

impl KeltnerChannel {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            basis: Sma::new(period),
            range: Sma::new(period),
            prev_close: None,
            multiplier,
        }
    }

    pub fn default_20_1_5() -> Self {
        Self::new(20, 1.5)
    }

    pub fn update(&mut self, bar: &Bar) -> Option<Band> {
        let tr = bar.true_range(self.prev_close);
        self.prev_close = Some(bar.close);
        let middle = self.basis.update(bar.close);
        let range = self.range.update(tr);
        let (middle, range) = (middle?, range?);
        let width = range * self.multiplier;
        Some(Band { upper: middle + width, middle, lower: middle - width })
    }
}

/// TTM squeeze: Bollinger Bands fully inside the Keltner Channel.
#[derive(Debug, Clone)]
pub struct Squeeze {
    bb: BollingerBands,
    kc: KeltnerChannel,
}

impl Squeeze {
    pub fn new(bb_period: usize, bb_mult: f64, kc_period: usize, kc_mult: f64) -> Self {
        Self {
            bb: BollingerBands::new(bb_period, bb_mult),
            kc: KeltnerChannel::new(kc_period, kc_mult),
        }
    }

    /// `false` until both envelopes are warm.
    pub fn update(&mut self, bar: &Bar) -> bool {
        let bb = self.bb.update(bar.close);
        let kc = self.kc.update(bar);
        match (bb, kc) {
            (Some(bb), Some(kc)) => bb.lower > kc.lower && bb.upper < kc.upper,
            _ => false,
        }
    }
}

impl Default for Squeeze {
    fn default() -> Self {
        Self::new(20, 2.0, 20, 1.5)
    }
}

// =============================================================================
// Tests
// =============================================================================
