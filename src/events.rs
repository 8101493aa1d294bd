use std::fmt;

use serde::Serialize;

use crate::firewall::{FirewallVerdict, LiquidityVerdict, OscillatorZone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Expansion,
    Pullback,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Expansion => "expansion",
            EventKind::Pullback => "pullback",
        }
    }

    /// Human label used by the console sink.
    pub fn title(&self) -> &'static str {
        match self {
            EventKind::Expansion => "Fresh Expansion",
            EventKind::Pullback => "TC20 Pullback",
        }
    }
}

/// What started an expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    SqueezeRelease,
    AverageCross,
    Both,
}

impl Trigger {
    pub fn from_flags(squeeze_release: bool, average_cross: bool) -> Option<Trigger> {
        match (squeeze_release, average_cross) {
            (true, true) => Some(Trigger::Both),
            (true, false) => Some(Trigger::SqueezeRelease),
            (false, true) => Some(Trigger::AverageCross),
            (false, false) => None,
        }
    }
}

/// Raw detector output, before the firewall annotates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub kind: EventKind,
    /// Set for expansions only
    pub trigger: Option<Trigger>,
    pub direction: Direction,
    pub bar_index: u64,
    pub price: f64,
    pub rsi: Option<f64>,
}

/// Reported event: a detection plus its advisory verdicts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub symbol: String,
    pub kind: EventKind,
    pub direction: Direction,
    pub bar_index: u64,
    pub price: f64,
    pub firewall: FirewallVerdict,
    pub liquidity: LiquidityVerdict,
    pub oscillator: OscillatorZone,
}
