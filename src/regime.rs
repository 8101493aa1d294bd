//! Trend regime classification of the reference asset.
//!
//! Pure function of a snapshot window; recomputed every cycle, never
//! persisted.

use std::fmt;

use serde::Serialize;

use crate::pipeline::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeLabel {
    TrendingUp,
    TrendingDown,
    Ranging,
}

impl RegimeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeLabel::TrendingUp => "TRENDING UP",
            RegimeLabel::TrendingDown => "TRENDING DOWN",
            RegimeLabel::Ranging => "RANGING",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three reference timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeSlot {
    Short,
    Medium,
    Long,
}

impl TimeframeSlot {
    pub const ALL: [TimeframeSlot; 3] = [TimeframeSlot::Short, TimeframeSlot::Medium, TimeframeSlot::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeframeSlot::Short => "short",
            TimeframeSlot::Medium => "medium",
            TimeframeSlot::Long => "long",
        }
    }

    fn position(&self) -> usize {
        match self {
            TimeframeSlot::Short => 0,
            TimeframeSlot::Medium => 1,
            TimeframeSlot::Long => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RegimeStatus {
    Label(RegimeLabel),
    Unavailable(String),
}

impl RegimeStatus {
    pub fn label(&self) -> Option<RegimeLabel> {
        match self {
            RegimeStatus::Label(l) => Some(*l),
            RegimeStatus::Unavailable(_) => None,
        }
    }

    /// Display form; unavailable slots render as "N/A".
    pub fn display(&self) -> &str {
        match self {
            RegimeStatus::Label(l) => l.as_str(),
            RegimeStatus::Unavailable(_) => "N/A",
        }
    }
}

/// Reference-asset context map consumed by detection and the firewall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeContext {
    slots: [RegimeStatus; 3],
}

impl RegimeContext {
    /// Every slot unavailable until classified.
    pub fn new() -> Self {
        let pending = || RegimeStatus::Unavailable("not classified".to_string());
        Self { slots: [pending(), pending(), pending()] }
    }

    /// Same label on all three slots. Handy for replays and tests.
    pub fn uniform(label: RegimeLabel) -> Self {
        Self {
            slots: [
                RegimeStatus::Label(label),
                RegimeStatus::Label(label),
                RegimeStatus::Label(label),
            ],
        }
    }

    pub fn with(mut self, slot: TimeframeSlot, status: RegimeStatus) -> Self {
        self.set(slot, status);
        self
    }

    pub fn set(&mut self, slot: TimeframeSlot, status: RegimeStatus) {
        self.slots[slot.position()] = status;
    }

    pub fn get(&self, slot: TimeframeSlot) -> &RegimeStatus {
        &self.slots[slot.position()]
    }

    pub fn label(&self, slot: TimeframeSlot) -> Option<RegimeLabel> {
        self.get(slot).label()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeframeSlot, &RegimeStatus)> {
        TimeframeSlot::ALL.iter().map(move |slot| (*slot, self.get(*slot)))
    }
}

impl Default for RegimeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    /// Trailing window for the whipsaw count
    pub lookback: usize,
    pub whipsaw_crosses: usize,
    /// |fast - slow| below close × ratio counts as converged
    pub convergence_ratio: f64,
    /// Whether the convergence override applies on the long slot
    pub convergence_override_long: bool,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            lookback: 10,
            whipsaw_crosses: 3,
            convergence_ratio: 0.0005,
            convergence_override_long: true,
        }
    }
}

impl RegimeConfig {
    pub fn convergence_applies(&self, slot: TimeframeSlot) -> bool {
        slot != TimeframeSlot::Long || self.convergence_override_long
    }
}

/// Count value changes of `close > sma_fast` across the trailing window.
pub fn count_crosses(snaps: &[IndicatorSnapshot], lookback: usize) -> usize {
    let start = snaps.len().saturating_sub(lookback);
    snaps[start..]
        .windows(2)
        .filter(|w| w[0].above_fast() != w[1].above_fast())
        .count()
}

/// Classify one timeframe. Unavailable when the last snapshot has no
/// averages to compare.
pub fn classify(snaps: &[IndicatorSnapshot], cfg: &RegimeConfig, slot: TimeframeSlot) -> RegimeStatus {
    let last = match snaps.last() {
        Some(s) => s,
        None => return RegimeStatus::Unavailable("no snapshots".to_string()),
    };
    let (fast, slow) = match (last.sma_fast, last.sma_slow) {
        (Some(f), Some(s)) => (f, s),
        _ => return RegimeStatus::Unavailable("moving averages not warm".to_string()),
    };
    let close = last.bar.close;

    let crosses = count_crosses(snaps, cfg.lookback);
    let converged = cfg.convergence_applies(slot) && (fast - slow).abs() < close * cfg.convergence_ratio;
    if crosses >= cfg.whipsaw_crosses || converged {
        return RegimeStatus::Label(RegimeLabel::Ranging);
    }

    let up = close > slow && fast > slow;
    let down = close < slow && fast < slow;
    let label = if up {
        RegimeLabel::TrendingUp
    } else if down {
        RegimeLabel::TrendingDown
    } else {
        RegimeLabel::Ranging
    };
    RegimeStatus::Label(label)
}
