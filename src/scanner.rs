//! One scan cycle: regime context from the reference asset, then every
//! symbol in universe order through pipeline, engine and firewall.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::engine::{EventEngine, Outcome};
use crate::events::Event;
use crate::exchange::retry::{retry_async, RetryConfig};
use crate::exchange::MarketSource;
use crate::firewall;
use crate::logging::{
    log_bars, log_cycle_summary, log_event, log_fetch_failed, log_outcome, log_regime, log_skip, ProfileScope,
};
use crate::market::{Bar, Timeframe};
use crate::pipeline::{self, IndicatorSnapshot};
use crate::regime::{self, RegimeContext, RegimeStatus, TimeframeSlot};
use crate::universe;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: &'static str,
    pub detail: String,
}

/// Everything a sink needs to present one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub exchange: &'static str,
    pub timeframe: Timeframe,
    pub context: RegimeContext,
    pub universe: usize,
    pub evaluated: usize,
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedSymbol>,
    pub elapsed_ms: f64,
}

impl CycleReport {
    pub fn is_quiet(&self) -> bool {
        self.events.is_empty()
    }
}

/// Last `limit` bars whose interval has closed at `now`.
pub fn closed_window(mut bars: Vec<Bar>, timeframe: Timeframe, now: u64, limit: usize) -> Vec<Bar> {
    while bars.last().is_some_and(|b| !b.closed_by(timeframe, now)) {
        bars.pop();
    }
    let start = bars.len().saturating_sub(limit);
    bars.split_off(start)
}

pub struct Scanner {
    cfg: Config,
    engine: EventEngine,
    retry: RetryConfig,
    cycle: u64,
}

impl Scanner {
    pub fn new(cfg: Config) -> Self {
        let engine = EventEngine::new(cfg.detector.clone());
        Self { cfg, engine, retry: RetryConfig::default(), cycle: 0 }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn engine(&self) -> &EventEngine {
        &self.engine
    }

    async fn snapshots(
        &self,
        source: &dyn MarketSource,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<IndicatorSnapshot>, SkippedSymbol> {
        let skip = |reason: &'static str, detail: String| SkippedSymbol { symbol: symbol.to_string(), reason, detail };
        // One extra bar covers the forming one dropped below.
        let limit = self.cfg.bar_limit + 1;
        let fetched = retry_async(&self.retry, "fetch_bars", || source.fetch_bars(symbol, timeframe, limit))
            .await
            .map_err(|e| {
                log_fetch_failed(symbol, "bars", &e);
                skip(e.reason(), e.to_string())
            })?;
        let bars = closed_window(fetched, timeframe, source.now(), self.cfg.bar_limit);
        log_bars(symbol, timeframe.as_str(), bars.len(), bars.last().map(|b| b.ts));
        pipeline::compute(&bars, &self.cfg.pipeline).map_err(|e| skip(e.reason(), e.to_string()))
    }

    /// Classify the reference asset on each slot. A slot that cannot be read
    /// is reported unavailable; the cycle carries on.
    pub async fn regime_context(&self, source: &dyn MarketSource) -> RegimeContext {
        let reference = self.cfg.reference_symbol.as_str();
        let mut windows: HashMap<Timeframe, Result<Vec<IndicatorSnapshot>, String>> = HashMap::new();
        let mut ctx = RegimeContext::new();
        for slot in TimeframeSlot::ALL {
            let tf = self.cfg.regime_timeframe(slot);
            if !windows.contains_key(&tf) {
                let fetched = self
                    .snapshots(source, reference, tf)
                    .await
                    .map_err(|s| format!("{}: {}", s.reason, s.detail));
                windows.insert(tf, fetched);
            }
            let status = match windows.get(&tf) {
                Some(Ok(snaps)) => regime::classify(snaps, &self.cfg.regime, slot),
                Some(Err(reason)) => RegimeStatus::Unavailable(reason.clone()),
                None => RegimeStatus::Unavailable("not fetched".to_string()),
            };
            log_regime(reference, slot, tf.as_str(), &status);
            ctx.set(slot, status);
        }
        ctx
    }

    async fn evaluate_symbol(
        &mut self,
        source: &dyn MarketSource,
        symbol: &str,
        ctx: &RegimeContext,
    ) -> Result<Option<Event>, SkippedSymbol> {
        let snaps = self.snapshots(source, symbol, self.cfg.scan_timeframe).await?;
        let last = match snaps.last() {
            Some(s) => s,
            None => {
                return Err(SkippedSymbol {
                    symbol: symbol.to_string(),
                    reason: "empty",
                    detail: "no snapshots".to_string(),
                })
            }
        };
        let bar_index = last.bar.grid_index(self.cfg.scan_timeframe);
        let outcome = self.engine.step(symbol, &snaps, bar_index, ctx);
        log_outcome(symbol, bar_index, &outcome, self.engine.state(symbol));

        let detection = match outcome {
            Outcome::Emitted(d) => d,
            _ => return Ok(None),
        };
        // Book is only needed once something fired.
        let book = match retry_async(&self.retry, "fetch_order_book", || {
            source.fetch_order_book(symbol, self.cfg.book_depth)
        })
        .await
        {
            Ok(book) => Some(book),
            Err(e) => {
                log_fetch_failed(symbol, "order_book", &e);
                None
            }
        };
        let event = firewall::annotate(symbol, &detection, ctx, book.as_ref(), &self.cfg.firewall);
        log_event(&event);
        Ok(Some(event))
    }

    /// Run one cycle over `symbols` in order. No symbol can abort the cycle.
    pub async fn run_cycle(&mut self, source: &dyn MarketSource, symbols: &[String]) -> CycleReport {
        let context = self.regime_context(source).await;
        self.run_cycle_with(source, symbols, context).await
    }

    /// Same as `run_cycle` with a context supplied by the caller.
    pub async fn run_cycle_with(
        &mut self,
        source: &dyn MarketSource,
        symbols: &[String],
        context: RegimeContext,
    ) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;
        let scope = ProfileScope::with_context("cycle", &[("cycle", json!(cycle))]);

        let mut events = Vec::new();
        let mut skipped = Vec::new();
        let mut evaluated = 0;
        for symbol in symbols {
            match self.evaluate_symbol(source, symbol, &context).await {
                Ok(event) => {
                    evaluated += 1;
                    events.extend(event);
                }
                Err(skip) => {
                    log_skip(&skip.symbol, skip.reason, &skip.detail);
                    skipped.push(skip);
                }
            }
        }

        let elapsed_ms = scope.elapsed_ms();
        log_cycle_summary(cycle, symbols.len(), evaluated, events.len(), skipped.len(), elapsed_ms);
        CycleReport {
            cycle,
            exchange: source.name(),
            timeframe: self.cfg.scan_timeframe,
            context,
            universe: symbols.len(),
            evaluated,
            events,
            skipped,
            elapsed_ms,
        }
    }

    /// Resolve the universe, then run a cycle over it.
    pub async fn scan(&mut self, source: &dyn MarketSource) -> CycleReport {
        let symbols = universe::resolve(source, &self.cfg.universe, &self.cfg.reference_symbol, &self.retry).await;
        self.run_cycle(source, &symbols).await
    }
}
