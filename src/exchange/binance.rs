use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::exchange::{json_f64, parse_levels, MarketSource};
use crate::market::{Bar, OrderBook, Ticker, Timeframe};

/// Binance spot public market data.
pub struct Binance {
    client: Client,
    base: String,
}

#[derive(Deserialize, Debug)]
struct BinanceError {
    code: i64,
    #[allow(dead_code)]
    msg: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    symbol: String,
    quote_volume: String,
}

const INVALID_SYMBOL: i64 = -1121;
const DEPTH_LIMITS: [usize; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];

impl Binance {
    pub fn new(base: String) -> Self {
        Self { client: Client::new(), base }
    }

    fn pair(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    /// Smallest accepted depth that covers `depth`.
    fn depth_limit(depth: usize) -> usize {
        DEPTH_LIMITS.iter().copied().find(|l| *l >= depth).unwrap_or(5000)
    }

    async fn get_json(&self, url: &str, symbol: &str) -> Result<Value, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceError>(&body) {
                if err.code == INVALID_SYMBOL {
                    return Err(FetchError::UnknownSymbol(symbol.to_string()));
                }
            }
            return Err(FetchError::Status(status.as_u16()));
        }
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

pub(crate) fn parse_klines(data: &Value) -> Result<Vec<Bar>, FetchError> {
    let rows = data.as_array().ok_or_else(|| FetchError::Malformed("klines not an array".into()))?;
    rows.iter()
        .map(|row| {
            let field = |i: usize| row.get(i).ok_or_else(|| FetchError::Malformed(format!("kline missing field {}", i)));
            let open_ms = field(0)?
                .as_u64()
                .ok_or_else(|| FetchError::Malformed("kline open time".into()))?;
            Ok(Bar {
                ts: open_ms / 1000,
                open: json_f64(field(1)?)?,
                high: json_f64(field(2)?)?,
                low: json_f64(field(3)?)?,
                close: json_f64(field(4)?)?,
                volume: json_f64(field(5)?)?,
            })
        })
        .collect()
}

#[async_trait]
impl MarketSource for Binance {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_bars(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, FetchError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base,
            Self::pair(symbol),
            timeframe.as_str(),
            limit.clamp(1, 1000)
        );
        let data = self.get_json(&url, symbol).await?;
        let bars = parse_klines(&data)?;
        if bars.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(bars)
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base,
            Self::pair(symbol),
            Self::depth_limit(depth)
        );
        let data = self.get_json(&url, symbol).await?;
        let book = OrderBook { bids: parse_levels(data.get("bids"))?, asks: parse_levels(data.get("asks"))? };
        if book.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(book)
    }

    async fn fetch_tickers(&self, quote: &str) -> Result<Vec<Ticker>, FetchError> {
        let url = format!("{}/api/v3/ticker/24hr", self.base);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let raw: Vec<BinanceTicker> = resp.json().await?;
        Ok(tickers_for_quote(raw, quote))
    }
}

fn tickers_for_quote(raw: Vec<BinanceTicker>, quote: &str) -> Vec<Ticker> {
    let quote = quote.to_uppercase();
    raw.into_iter()
        .filter(|t| t.symbol.len() > quote.len() && t.symbol.ends_with(&quote))
        .filter_map(|t| {
            let base = &t.symbol[..t.symbol.len() - quote.len()];
            let quote_volume = t.quote_volume.parse::<f64>().ok()?;
            Some(Ticker { symbol: format!("{}/{}", base, quote), quote_volume })
        })
        .collect()
}
