//! Advisory annotations attached to an emitted event. Nothing here can veto
//! an event; every input that is missing degrades to a neutral verdict.

use serde::Serialize;

use crate::events::{Detection, Direction, Event};
use crate::market::OrderBook;
use crate::regime::{RegimeContext, RegimeLabel, TimeframeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FirewallVerdict {
    For,
    Against,
    Neutral,
}

impl FirewallVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallVerdict::For => "FOR",
            FirewallVerdict::Against => "AGAINST",
            FirewallVerdict::Neutral => "NEUTRAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquidityVerdict {
    For,
    Against,
    None,
}

impl LiquidityVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityVerdict::For => "FOR",
            LiquidityVerdict::Against => "AGAINST",
            LiquidityVerdict::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OscillatorZone {
    Overbought,
    Oversold,
    Mid,
    Unknown,
}

impl OscillatorZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            OscillatorZone::Overbought => "Overbought",
            OscillatorZone::Oversold => "Oversold",
            OscillatorZone::Mid => "Mid zone",
            OscillatorZone::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirewallConfig {
    /// bid/ask ratio above which bids dominate
    pub liq_for_ratio: f64,
    /// bid/ask ratio below which asks dominate
    pub liq_against_ratio: f64,
    /// Half-width of the price band around the event price (0.01 = ±1%)
    pub liq_band: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            liq_for_ratio: 1.3,
            liq_against_ratio: 0.7,
            liq_band: 0.01,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
        }
    }
}

/// Compare the event direction with the long reference slot.
pub fn long_timeframe_verdict(ctx: &RegimeContext, direction: Direction) -> FirewallVerdict {
    match (ctx.label(TimeframeSlot::Long), direction) {
        (Some(RegimeLabel::TrendingUp), Direction::Long) | (Some(RegimeLabel::TrendingDown), Direction::Short) => {
            FirewallVerdict::For
        }
        (Some(RegimeLabel::TrendingUp), Direction::Short) | (Some(RegimeLabel::TrendingDown), Direction::Long) => {
            FirewallVerdict::Against
        }
        (Some(RegimeLabel::Ranging), _) | (None, _) => FirewallVerdict::Neutral,
    }
}

/// Bid/ask volume ratio inside the band around `price`, or `None` when a
/// side is empty.
pub fn liquidity_ratio(book: &OrderBook, price: f64, band: f64) -> Option<f64> {
    let bid_vol = book.bid_volume_above(price * (1.0 - band));
    let ask_vol = book.ask_volume_below(price * (1.0 + band));
    if bid_vol <= 0.0 || ask_vol <= 0.0 {
        return None;
    }
    Some(bid_vol / ask_vol)
}

pub fn liquidity_verdict(
    book: &OrderBook,
    price: f64,
    direction: Direction,
    cfg: &FirewallConfig,
) -> LiquidityVerdict {
    let ratio = match liquidity_ratio(book, price, cfg.liq_band) {
        Some(r) => r,
        None => return LiquidityVerdict::None,
    };
    let bids_heavy = ratio > cfg.liq_for_ratio;
    let asks_heavy = ratio < cfg.liq_against_ratio;
    match direction {
        Direction::Long if bids_heavy => LiquidityVerdict::For,
        Direction::Long if asks_heavy => LiquidityVerdict::Against,
        Direction::Short if asks_heavy => LiquidityVerdict::For,
        Direction::Short if bids_heavy => LiquidityVerdict::Against,
        _ => LiquidityVerdict::None,
    }
}

pub fn oscillator_zone(rsi: Option<f64>, cfg: &FirewallConfig) -> OscillatorZone {
    match rsi {
        Some(v) if v > cfg.rsi_overbought => OscillatorZone::Overbought,
        Some(v) if v < cfg.rsi_oversold => OscillatorZone::Oversold,
        Some(_) => OscillatorZone::Mid,
        None => OscillatorZone::Unknown,
    }
}

/// Attach all verdicts. A missing book yields `LiquidityVerdict::None`.
pub fn annotate(
    symbol: &str,
    detection: &Detection,
    ctx: &RegimeContext,
    book: Option<&OrderBook>,
    cfg: &FirewallConfig,
) -> Event {
    let liquidity = book
        .map(|b| liquidity_verdict(b, detection.price, detection.direction, cfg))
        .unwrap_or(LiquidityVerdict::None);
    Event {
        symbol: symbol.to_string(),
        kind: detection.kind,
        direction: detection.direction,
        bar_index: detection.bar_index,
        price: detection.price,
        firewall: long_timeframe_verdict(ctx, detection.direction),
        liquidity,
        oscillator: oscillator_zone(detection.rsi, cfg),
    }
}
