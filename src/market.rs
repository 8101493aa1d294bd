//! Market data shapes shared by the collaborators and the core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One OHLCV bar. `ts` is the bar open time in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => {
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                self.range().max(hc).max(lc)
            }
            None => self.range(),
        }
    }

    /// True once the bar's interval has fully elapsed at `now`.
    pub fn closed_by(&self, timeframe: Timeframe, now: u64) -> bool {
        self.ts.saturating_add(timeframe.secs()) <= now
    }

    /// Absolute position of this bar on its timeframe grid.
    pub fn grid_index(&self, timeframe: Timeframe) -> u64 {
        self.ts / timeframe.secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Bid volume priced at or above `floor`.
    pub fn bid_volume_above(&self, floor: f64) -> f64 {
        self.bids.iter().filter(|l| l.price >= floor).map(|l| l.volume).sum()
    }

    /// Ask volume priced at or below `ceiling`.
    pub fn ask_volume_below(&self, ceiling: f64) -> f64 {
        self.asks.iter().filter(|l| l.price <= ceiling).map(|l| l.volume).sum()
    }
}

/// 24h summary used by the dynamic universe query.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub quote_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn secs(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn minutes(&self) -> u64 {
        self.secs() / 60
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" | "240m" => Ok(Timeframe::H4),
            "1d" | "24h" => Ok(Timeframe::D1),
            other => Err(ConfigError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Split "ETH/USDT" into ("ETH", "USDT"). Symbols without a slash are
/// returned whole as the base.
pub fn split_pair(symbol: &str) -> (&str, &str) {
    match symbol.split_once('/') {
        Some((base, quote)) => (base, quote),
        None => (symbol, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parse_and_display() {
        for tf in ["1m", "5m", "15m", "30m", "1h", "4h", "1d"] {
            let parsed: Timeframe = tf.parse().unwrap();
            assert_eq!(parsed.as_str(), tf);
        }
        assert_eq!("60m".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert!(matches!(
            "2h".parse::<Timeframe>(),
            Err(ConfigError::UnknownTimeframe(_))
        ));
    }

    #[test]
    fn grid_index_is_monotone_across_windows() {
        let a = Bar { ts: 900 * 10, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 0.0 };
        let b = Bar { ts: 900 * 11, ..a };
        assert_eq!(b.grid_index(Timeframe::M15) - a.grid_index(Timeframe::M15), 1);
    }

    #[test]
    fn bar_closes_at_end_of_interval() {
        let bar = Bar { ts: 14_400, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 0.0 };
        assert!(!bar.closed_by(Timeframe::H4, 14_400 + 900));
        assert!(!bar.closed_by(Timeframe::H4, 28_799));
        assert!(bar.closed_by(Timeframe::H4, 28_800));
        assert!(bar.closed_by(Timeframe::M15, 15_300));
    }

    #[test]
    fn true_range_uses_prev_close_gap() {
        let bar = Bar { ts: 0, open: 10.0, high: 11.0, low: 9.5, close: 10.5, volume: 1.0 };
        assert_eq!(bar.true_range(None), 1.5);
        assert_eq!(bar.true_range(Some(8.0)), 3.0);
    }

    #[test]
    fn book_band_volumes() {
        let book = OrderBook {
            bids: vec![BookLevel { price: 99.5, volume: 2.0 }, BookLevel { price: 97.0, volume: 9.0 }],
            asks: vec![BookLevel { price: 100.5, volume: 1.0 }, BookLevel { price: 103.0, volume: 9.0 }],
        };
        assert_eq!(book.bid_volume_above(99.0), 2.0);
        assert_eq!(book.ask_volume_below(101.0), 1.0);
    }

    #[test]
    fn split_pair_handles_plain_symbols() {
        assert_eq!(split_pair("ETH/USDT"), ("ETH", "USDT"));
        assert_eq!(split_pair("ETHUSDT"), ("ETHUSDT", ""));
    }
}
