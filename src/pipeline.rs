//! Indicator pipeline: bar window in, parallel snapshot sequence out.

use serde::Serialize;

use crate::error::PipelineError;
use crate::indicators::{Rsi, Sma, Squeeze};
use crate::market::Bar;

/// Derived indicator state for one bar. Indicators that have not warmed up
/// yet are `None`, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub bar: Bar,
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub squeeze_on: bool,
}

impl IndicatorSnapshot {
    /// `close > sma_fast`, false while the fast average is unavailable.
    pub fn above_fast(&self) -> bool {
        self.sma_fast.map(|f| self.bar.close > f).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_mult: f64,
    pub kc_period: usize,
    pub kc_mult: f64,
    pub min_bars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 100,
            rsi_period: 14,
            bb_period: 20,
            bb_mult: 2.0,
            kc_period: 20,
            kc_mult: 1.5,
            min_bars: 50,
        }
    }
}

/// Run every indicator across the window.
pub fn compute(bars: &[Bar], cfg: &PipelineConfig) -> Result<Vec<IndicatorSnapshot>, PipelineError> {
    if bars.len() < cfg.min_bars {
        return Err(PipelineError::InsufficientData { have: bars.len(), need: cfg.min_bars });
    }
    validate(bars)?;

    let mut fast = Sma::new(cfg.fast_period);
    let mut slow = Sma::new(cfg.slow_period);
    let mut rsi = Rsi::new(cfg.rsi_period);
    let mut squeeze = Squeeze::new(cfg.bb_period, cfg.bb_mult, cfg.kc_period, cfg.kc_mult);

    let out = bars
        .iter()
        .map(|bar| IndicatorSnapshot {
            bar: *bar,
            sma_fast: fast.update(bar.close),
            sma_slow: slow.update(bar.close),
            rsi: rsi.update(bar.close),
            squeeze_on: squeeze.update(bar),
        })
        .collect();
    Ok(out)
}

fn validate(bars: &[Bar]) -> Result<(), PipelineError> {
    let mut prev_ts = None;
    for (index, b) in bars.iter().enumerate() {
        let prices = [b.open, b.high, b.low, b.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(PipelineError::MalformedBars { index, reason: "non-finite price" });
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return Err(PipelineError::MalformedBars { index, reason: "non-positive price" });
        }
        if b.high < b.low {
            return Err(PipelineError::MalformedBars { index, reason: "high below low" });
        }
        if let Some(prev) = prev_ts {
            if b.ts <= prev {
                return Err(PipelineError::MalformedBars { index, reason: "timestamps not ascending" });
            }
        }
        prev_ts = Some(b.ts);
    }
    Ok(())
}
