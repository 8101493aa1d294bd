use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::config::Config;
use crate::error::{ConfigError, FetchError};
use crate::market::{Bar, BookLevel, OrderBook, Ticker, Timeframe};

mod binance;
pub mod csv;
mod kraken;
pub mod retry;

pub use binance::Binance;
pub use csv::CsvReplay;
pub use kraken::Kraken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeKind {
    Binance,
    Kraken,
    Csv,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Binance => "binance",
            ExchangeKind::Kraken => "kraken",
            ExchangeKind::Csv => "csv",
        }
    }

    pub fn build(self, cfg: &Config) -> Result<Box<dyn MarketSource>, ConfigError> {
        match self {
            ExchangeKind::Binance => Ok(Box::new(Binance::new(cfg.binance_base.clone()))),
            ExchangeKind::Kraken => Ok(Box::new(Kraken::new(cfg.kraken_base.clone()))),
            ExchangeKind::Csv => {
                let dir = cfg.csv_dir.clone().ok_or(ConfigError::MissingCsvDir("EXCHANGE=csv"))?;
                Ok(Box::new(CsvReplay::new(dir)))
            }
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(ExchangeKind::Binance),
            "kraken" => Ok(ExchangeKind::Kraken),
            "csv" | "replay" => Ok(ExchangeKind::Csv),
            other => Err(ConfigError::UnknownExchange(other.to_string())),
        }
    }
}

/// Read-only market data collaborator. Symbols use the "BASE/QUOTE" form;
/// each venue maps it to its own pair naming.
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Epoch seconds the source considers current. Venues return the forming
    /// bar last; callers compare against this to drop it.
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }

    /// Most recent `limit` bars, ascending by time.
    async fn fetch_bars(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, FetchError>;

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError>;

    /// 24h volume summaries for pairs quoted in `quote`.
    async fn fetch_tickers(&self, _quote: &str) -> Result<Vec<Ticker>, FetchError> {
        Err(FetchError::Unsupported(self.name()))
    }
}

/// Number carried either as a JSON string or a JSON number.
pub(crate) fn json_f64(v: &Value) -> Result<f64, FetchError> {
    match v {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("not a number: {:?}", s))),
        Value::Number(n) => n.as_f64().ok_or_else(|| FetchError::Malformed(format!("not a float: {}", n))),
        other => Err(FetchError::Malformed(format!("expected number, got {}", other))),
    }
}

/// `[[price, volume, ...], ...]` into book levels.
pub(crate) fn parse_levels(v: Option<&Value>) -> Result<Vec<BookLevel>, FetchError> {
    let rows = match v {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(FetchError::Malformed("book side is not an array".into())),
        None => return Ok(Vec::new()),
    };
    rows.iter()
        .map(|row| {
            let price = row.get(0).ok_or_else(|| FetchError::Malformed("level without price".into()))?;
            let volume = row.get(1).ok_or_else(|| FetchError::Malformed("level without volume".into()))?;
            Ok(BookLevel { price: json_f64(price)?, volume: json_f64(volume)? })
        })
        .collect()
}
