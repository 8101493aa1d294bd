//! File-backed market source. Bars live in `<BASE>_<QUOTE>_<tf>.csv` with a
//! `ts,open,high,low,close,volume` header; an optional `<BASE>_<QUOTE>_book.csv`
//! holds `side,price,volume` rows (`bid` or `ask`).
//!
//! A cursor (epoch seconds) acts as the source clock: only bars whose
//! interval has closed by then are visible, on every timeframe, so a replay
//! can walk the history forward as if it were live.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::FetchError;
use crate::exchange::MarketSource;
use crate::market::{Bar, BookLevel, OrderBook, Timeframe};

const NO_CURSOR: u64 = u64::MAX;

pub struct CsvReplay {
    dir: PathBuf,
    cursor: AtomicU64,
    cache: Mutex<HashMap<PathBuf, Arc<Vec<Bar>>>>,
}

impl CsvReplay {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cursor: AtomicU64::new(NO_CURSOR), cache: Mutex::new(HashMap::new()) }
    }

    /// Only bars with `ts + timeframe <= cursor` are visible.
    pub fn set_cursor(&self, ts: u64) {
        self.cursor.store(ts, Ordering::SeqCst);
    }

    pub fn clear_cursor(&self) {
        self.cursor.store(NO_CURSOR, Ordering::SeqCst);
    }

    pub fn file_stem(symbol: &str) -> String {
        symbol.replace('/', "_").to_uppercase()
    }

    pub fn bars_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", Self::file_stem(symbol), timeframe.as_str()))
    }

    pub fn book_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}_book.csv", Self::file_stem(symbol)))
    }

    /// Full history for one file, cached after the first read.
    pub fn history(&self, symbol: &str, timeframe: Timeframe) -> Result<Arc<Vec<Bar>>, FetchError> {
        let path = self.bars_path(symbol, timeframe);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bars) = cache.get(&path) {
            return Ok(Arc::clone(bars));
        }
        if !path.exists() {
            return Err(FetchError::UnknownSymbol(symbol.to_string()));
        }
        let bars = Arc::new(load_bars(&path)?);
        cache.insert(path, Arc::clone(&bars));
        Ok(bars)
    }
}

/// Parse one data row. Returns `None` for blank lines and the header.
pub fn parse_bar_line(line: &str) -> Result<Option<Bar>, FetchError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("ts") || line.starts_with('#') {
        return Ok(None);
    }
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    if cols.len() < 6 {
        return Err(FetchError::Malformed(format!("expected 6 columns: {}", line)));
    }
    let num = |i: usize| {
        cols[i]
            .parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("column {} not numeric: {}", i, line)))
    };
    // Accept millisecond timestamps as exported by most venues.
    let raw_ts = cols[0]
        .parse::<u64>()
        .map_err(|_| FetchError::Malformed(format!("bad timestamp: {}", line)))?;
    let ts = if raw_ts > 10_000_000_000 { raw_ts / 1000 } else { raw_ts };
    Ok(Some(Bar { ts, open: num(1)?, high: num(2)?, low: num(3)?, close: num(4)?, volume: num(5)? }))
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>, FetchError> {
    let text = fs::read_to_string(path).map_err(|e| FetchError::Transport(format!("{}: {}", path.display(), e)))?;
    let mut bars = Vec::new();
    for line in text.lines() {
        if let Some(bar) = parse_bar_line(line)? {
            bars.push(bar);
        }
    }
    Ok(bars)
}

pub fn load_book(path: &Path) -> Result<OrderBook, FetchError> {
    let text = fs::read_to_string(path).map_err(|e| FetchError::Transport(format!("{}: {}", path.display(), e)))?;
    let mut book = OrderBook::default();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("side") || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() < 3 {
            return Err(FetchError::Malformed(format!("book row: {}", line)));
        }
        let price = cols[1].parse::<f64>().map_err(|_| FetchError::Malformed(format!("book price: {}", line)))?;
        let volume = cols[2].parse::<f64>().map_err(|_| FetchError::Malformed(format!("book volume: {}", line)))?;
        let level = BookLevel { price, volume };
        match cols[0] {
            "bid" => book.bids.push(level),
            "ask" => book.asks.push(level),
            other => return Err(FetchError::Malformed(format!("book side {:?}", other))),
        }
    }
    Ok(book)
}

#[async_trait]
impl MarketSource for CsvReplay {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn now(&self) -> u64 {
        match self.cursor.load(Ordering::SeqCst) {
            NO_CURSOR => Utc::now().timestamp().max(0) as u64,
            cursor => cursor,
        }
    }

    async fn fetch_bars(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, FetchError> {
        let history = self.history(symbol, timeframe)?;
        let cursor = self.cursor.load(Ordering::SeqCst);
        let visible = history.partition_point(|b| b.closed_by(timeframe, cursor));
        if visible == 0 {
            return Err(FetchError::Empty);
        }
        let start = visible.saturating_sub(limit);
        Ok(history[start..visible].to_vec())
    }

    async fn fetch_order_book(&self, symbol: &str, _depth: usize) -> Result<OrderBook, FetchError> {
        let path = self.book_path(symbol);
        if !path.exists() {
            return Err(FetchError::Empty);
        }
        let book = load_book(&path)?;
        if book.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(book)
    }
}
