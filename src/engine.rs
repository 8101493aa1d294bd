//! Per-symbol event detection state machine.
//!
//! Each symbol owns a [`SymbolMemory`] that survives across cycles for the
//! session. One evaluation consumes the latest snapshot window and yields
//! exactly one [`Outcome`]; at most one of those carries an event.
//!
//! Step order per cycle:
//! 1. reversion firewall (hard gate, memory untouched)
//! 2. expansion: squeeze release or average cross, confirmed by a large body,
//!    aligned with the short reference slot
//! 3. pullback: freshness check, then a single claimed touch of the fast
//!    average that holds above (below) the slow one

use std::collections::HashMap;

use serde::Serialize;

use crate::events::{Detection, Direction, EventKind, Trigger};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::pipeline::IndicatorSnapshot;
use crate::regime::{RegimeContext, RegimeLabel, TimeframeSlot};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// θ_rev: max |close - sma_fast| / sma_fast before detection is suppressed
    pub reversion_threshold: f64,
    /// Latest body must exceed the mean preceding body by this factor
    pub body_multiplier: f64,
    pub body_lookback: usize,
    /// W: max bars between an anchor and its pullback
    pub freshness_bars: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            reversion_threshold: 0.035,
            body_multiplier: 2.0,
            body_lookback: 10,
            freshness_bars: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryState {
    Idle,
    Anchored,
    Claimed,
}

/// Session memory for one symbol. `direction` and `pullback_claimed` only
/// mean something while `anchor_index` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolMemory {
    pub anchor_index: Option<u64>,
    pub direction: Option<Direction>,
    pub pullback_claimed: bool,
}

impl SymbolMemory {
    pub fn anchored(anchor_index: u64, direction: Direction) -> Self {
        Self { anchor_index: Some(anchor_index), direction: Some(direction), pullback_claimed: false }
    }

    pub fn state(&self) -> MemoryState {
        match (self.anchor_index, self.pullback_claimed) {
            (None, _) => MemoryState::Idle,
            (Some(_), false) => MemoryState::Anchored,
            (Some(_), true) => MemoryState::Claimed,
        }
    }

    fn anchor(&mut self, index: u64, direction: Direction) {
        self.anchor_index = Some(index);
        self.direction = Some(direction);
        self.pullback_claimed = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// First broken invariant, if any.
    pub fn violation(&self, current_index: u64) -> Option<&'static str> {
        match (self.anchor_index, self.direction) {
            (None, Some(_)) => Some("direction without anchor"),
            (None, None) if self.pullback_claimed => Some("claimed pullback without anchor"),
            (Some(_), None) => Some("anchor without direction"),
            (Some(a), Some(_)) if a > current_index => Some("anchor ahead of current bar"),
            _ => None,
        }
    }

    /// Clear the record when it is inconsistent. Returns what was wrong.
    pub fn normalize(&mut self, current_index: u64) -> Option<&'static str> {
        let violation = self.violation(current_index);
        if violation.is_some() {
            self.clear();
        }
        violation
    }
}

/// What one evaluation did. Only `Emitted` carries an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NotEvaluable { reason: &'static str },
    Suppressed { distance: f64, limit: f64 },
    Misaligned { direction: Direction, short_regime: Option<RegimeLabel> },
    Emitted(Detection),
    Expired { anchor_index: u64, age: u64 },
    AlreadyClaimed { anchor_index: u64 },
    Watching { anchor_index: u64, age: u64 },
    Idle,
}

impl Outcome {
    pub fn detection(&self) -> Option<&Detection> {
        match self {
            Outcome::Emitted(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NotEvaluable { .. } => "not_evaluable",
            Outcome::Suppressed { .. } => "suppressed",
            Outcome::Misaligned { .. } => "misaligned",
            Outcome::Emitted(d) => d.kind.as_str(),
            Outcome::Expired { .. } => "expired",
            Outcome::AlreadyClaimed { .. } => "already_claimed",
            Outcome::Watching { .. } => "watching",
            Outcome::Idle => "idle",
        }
    }
}

/// Evaluate one symbol in isolation. Repairs an inconsistent memory first.
pub fn evaluate(
    snaps: &[IndicatorSnapshot],
    current_index: u64,
    ctx: &RegimeContext,
    memory: &mut SymbolMemory,
    cfg: &DetectorConfig,
) -> Outcome {
    memory.normalize(current_index);
    detect(snaps, current_index, ctx, memory, cfg)
}

fn detect(
    snaps: &[IndicatorSnapshot],
    current_index: u64,
    ctx: &RegimeContext,
    memory: &mut SymbolMemory,
    cfg: &DetectorConfig,
) -> Outcome {
    let n = snaps.len();
    if n < 3 {
        return Outcome::NotEvaluable { reason: "fewer than 3 snapshots" };
    }
    let (prev2, prev, last) = (&snaps[n - 3], &snaps[n - 2], &snaps[n - 1]);
    let fast = match last.sma_fast {
        Some(f) => f,
        None => return Outcome::NotEvaluable { reason: "fast average unavailable" },
    };

    let distance = (last.bar.close - fast).abs();
    let limit = fast * cfg.reversion_threshold;
    if distance > limit {
        return Outcome::Suppressed { distance, limit };
    }

    let trigger = Trigger::from_flags(squeeze_released(prev2, last), averages_crossed(prev, last));
    if let Some(trigger) = trigger {
        if body_confirmed(snaps, cfg) {
            let direction = if last.bar.close > fast { Direction::Long } else { Direction::Short };
            let short_regime = ctx.label(TimeframeSlot::Short);
            if !aligned(direction, short_regime) {
                return Outcome::Misaligned { direction, short_regime };
            }
            memory.anchor(current_index, direction);
            return Outcome::Emitted(Detection {
                kind: EventKind::Expansion,
                trigger: Some(trigger),
                direction,
                bar_index: current_index,
                price: last.bar.close,
                rsi: last.rsi,
            });
        }
    }

    let (anchor_index, direction) = match (memory.anchor_index, memory.direction) {
        (Some(a), Some(d)) => (a, d),
        _ => return Outcome::Idle,
    };
    let age = current_index.saturating_sub(anchor_index);
    if age > cfg.freshness_bars {
        memory.clear();
        return Outcome::Expired { anchor_index, age };
    }
    if !touches_fast(last, direction) {
        return Outcome::Watching { anchor_index, age };
    }
    if memory.pullback_claimed {
        return Outcome::AlreadyClaimed { anchor_index };
    }
    memory.pullback_claimed = true;
    Outcome::Emitted(Detection {
        kind: EventKind::Pullback,
        trigger: None,
        direction,
        bar_index: current_index,
        price: last.bar.close,
        rsi: last.rsi,
    })
}

/// Squeeze on two bars ago, off now. Older releases are stale.
pub fn squeeze_released(prev2: &IndicatorSnapshot, last: &IndicatorSnapshot) -> bool {
    prev2.squeeze_on && !last.squeeze_on
}

/// Fast/slow cross between the previous and latest bar, either way.
pub fn averages_crossed(prev: &IndicatorSnapshot, last: &IndicatorSnapshot) -> bool {
    match (prev.sma_fast, prev.sma_slow, last.sma_fast, last.sma_slow) {
        (Some(pf), Some(ps), Some(lf), Some(ls)) => (pf <= ps && lf > ls) || (pf >= ps && lf < ls),
        _ => false,
    }
}

/// Latest body beats the mean of the preceding `body_lookback` bodies.
pub fn body_confirmed(snaps: &[IndicatorSnapshot], cfg: &DetectorConfig) -> bool {
    let Some((last, before)) = snaps.split_last() else {
        return false;
    };
    let start = before.len().saturating_sub(cfg.body_lookback);
    let window = &before[start..];
    if window.is_empty() {
        return false;
    }
    let mean = window.iter().map(|s| s.bar.body()).sum::<f64>() / window.len() as f64;
    last.bar.body() > mean * cfg.body_multiplier
}

fn aligned(direction: Direction, short_regime: Option<RegimeLabel>) -> bool {
    matches!(
        (direction, short_regime),
        (Direction::Long, Some(RegimeLabel::TrendingUp)) | (Direction::Short, Some(RegimeLabel::TrendingDown))
    )
}

/// Touch the fast average without breaching the slow one.
pub fn touches_fast(last: &IndicatorSnapshot, direction: Direction) -> bool {
    let (fast, slow) = match (last.sma_fast, last.sma_slow) {
        (Some(f), Some(s)) => (f, s),
        _ => return false,
    };
    match direction {
        Direction::Long => last.bar.low <= fast && last.bar.low > slow,
        Direction::Short => last.bar.high >= fast && last.bar.high < slow,
    }
}

/// Owns the session memory table. Nothing else mutates it.
#[derive(Debug, Clone, Default)]
pub struct EventEngine {
    cfg: DetectorConfig,
    table: HashMap<String, SymbolMemory>,
}

impl EventEngine {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg, table: HashMap::new() }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn memory(&self, symbol: &str) -> Option<&SymbolMemory> {
        self.table.get(symbol)
    }

    pub fn tracked(&self) -> usize {
        self.table.len()
    }

    /// Idle for symbols never seen.
    pub fn state(&self, symbol: &str) -> MemoryState {
        self.table.get(symbol).map(SymbolMemory::state).unwrap_or(MemoryState::Idle)
    }

    /// Evaluate `symbol`, creating its memory on first sight.
    pub fn step(
        &mut self,
        symbol: &str,
        snaps: &[IndicatorSnapshot],
        current_index: u64,
        ctx: &RegimeContext,
    ) -> Outcome {
        let memory = self.table.entry(symbol.to_string()).or_default();
        if let Some(violation) = memory.normalize(current_index) {
            log(
                Level::Warn,
                Domain::Detect,
                "memory_repaired",
                obj(&[
                    ("symbol", v_str(symbol)),
                    ("violation", v_str(violation)),
                    ("bar_index", v_num(current_index as f64)),
                ]),
            );
        }
        detect(snaps, current_index, ctx, memory, &self.cfg)
    }
}
