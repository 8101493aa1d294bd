use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::exchange::{json_f64, parse_levels, MarketSource};
use crate::market::{split_pair, Bar, OrderBook, Timeframe};

pub struct Kraken {
    client: Client,
    base: String,
}

#[derive(Deserialize, Debug)]
struct KrakenResp {
    #[serde(default)]
    error: Vec<String>,
    result: Option<Value>,
}

impl Kraken {
    pub fn new(base: String) -> Self {
        Self { client: Client::new(), base }
    }

    /// "BTC/USD" -> "XBTUSD"
    fn to_kraken_pair(symbol: &str) -> String {
        let (base, quote) = split_pair(symbol);
        let base = base.to_uppercase();
        let base = if base == "BTC" { "XBT".to_string() } else { base };
        format!("{}{}", base, quote.to_uppercase())
    }

    async fn get_result(&self, url: &str, symbol: &str) -> Result<Value, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body: KrakenResp = resp.json().await?;
        unwrap_result(body, symbol)
    }
}

fn unwrap_result(body: KrakenResp, symbol: &str) -> Result<Value, FetchError> {
    if let Some(first) = body.error.first() {
        if body.error.iter().any(|e| e.contains("Unknown asset pair")) {
            return Err(FetchError::UnknownSymbol(symbol.to_string()));
        }
        return Err(FetchError::Transport(format!("kraken: {}", first)));
    }
    body.result.ok_or_else(|| FetchError::Malformed("missing result".into()))
}

/// The result object carries one series keyed by Kraken's own pair name,
/// plus a `last` cursor.
fn series(result: &Value) -> Result<&Value, FetchError> {
    let map = result.as_object().ok_or_else(|| FetchError::Malformed("invalid kraken response".into()))?;
    map.iter()
        .find(|(k, _)| k.as_str() != "last")
        .map(|(_, v)| v)
        .ok_or_else(|| FetchError::Malformed("missing series".into()))
}

fn parse_ohlc(result: &Value, limit: usize) -> Result<Vec<Bar>, FetchError> {
    let rows = series(result)?
        .as_array()
        .ok_or_else(|| FetchError::Malformed("bad series".into()))?;
    let skip = rows.len().saturating_sub(limit);
    rows[skip..]
        .iter()
        .map(|row| {
            let field = |i: usize| row.get(i).ok_or_else(|| FetchError::Malformed(format!("ohlc missing field {}", i)));
            let ts = field(0)?
                .as_u64()
                .ok_or_else(|| FetchError::Malformed("ohlc time".into()))?;
            // [time, open, high, low, close, vwap, volume, count]
            Ok(Bar {
                ts,
                open: json_f64(field(1)?)?,
                high: json_f64(field(2)?)?,
                low: json_f64(field(3)?)?,
                close: json_f64(field(4)?)?,
                volume: json_f64(field(6)?)?,
            })
        })
        .collect()
}

#[async_trait]
impl MarketSource for Kraken {
    fn name(&self) -> &'static str {
        "kraken"
    }

    async fn fetch_bars(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, FetchError> {
        let url = format!(
            "{}/0/public/OHLC?pair={}&interval={}",
            self.base,
            Self::to_kraken_pair(symbol),
            timeframe.minutes()
        );
        let result = self.get_result(&url, symbol).await?;
        let bars = parse_ohlc(&result, limit)?;
        if bars.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(bars)
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let url = format!(
            "{}/0/public/Depth?pair={}&count={}",
            self.base,
            Self::to_kraken_pair(symbol),
            depth.clamp(1, 500)
        );
        let result = self.get_result(&url, symbol).await?;
        let side = series(&result)?;
        let book = OrderBook { bids: parse_levels(side.get("bids"))?, asks: parse_levels(side.get("asks"))? };
        if book.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(book)
    }
}
