use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use scanfx::config::Config;
use scanfx::error::FetchError;
use scanfx::exchange::retry::RetryConfig;
use scanfx::exchange::{CsvReplay, ExchangeKind, MarketSource};
use scanfx::market::{Bar, OrderBook, Timeframe};
use scanfx::regime::{RegimeContext, RegimeLabel, RegimeStatus, TimeframeSlot};
use scanfx::replay::{replay_symbol, ReplayContext};
use scanfx::scanner::Scanner;

const BASE_TS: u64 = 1_700_006_400; // multiple of 4h

fn quiet_logs() {
    std::env::set_var("LOG_DIR", "off");
    std::env::set_var("LOG_LEVEL", "error");
}

fn write_bars(dir: &Path, symbol: &str, tf: Timeframe, closes: &[f64]) {
    let mut body = String::from("ts,open,high,low,close,volume\n");
    let mut prev = closes[0];
    for (i, close) in closes.iter().enumerate() {
        let ts = BASE_TS + i as u64 * tf.secs();
        let hi = prev.max(*close) + 0.2;
        let lo = prev.min(*close) - 0.2;
        let _ = writeln!(body, "{},{},{},{},{},10", ts, prev, hi, lo, close);
        prev = *close;
    }
    fs::write(CsvReplay::new(dir).bars_path(symbol, tf), body).unwrap();
}

fn uptrend(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
}

fn wavy(n: usize) -> Vec<f64> {
    (0..n).map(|i| 50.0 + (i as f64 * 0.4).sin() * 1.5 + i as f64 * 0.02).collect()
}

fn config(dir: &Path) -> Config {
    Config {
        exchange: ExchangeKind::Csv,
        csv_dir: Some(dir.to_path_buf()),
        bar_limit: 120,
        ..Config::default()
    }
}

#[tokio::test]
async fn cycle_over_csv_reports_context_and_skips() {
    quiet_logs();
    let dir = tempfile::tempdir().unwrap();
    for tf in [Timeframe::M15, Timeframe::H1, Timeframe::H4] {
        write_bars(dir.path(), "BTC/USDT", tf, &uptrend(150));
    }
    write_bars(dir.path(), "ETH/USDT", Timeframe::M15, &wavy(150));
    write_bars(dir.path(), "SHORT/USDT", Timeframe::M15, &wavy(20));

    let cfg = config(dir.path());
    cfg.validate().unwrap();
    let source = cfg.exchange.build(&cfg).unwrap();
    let mut scanner = Scanner::new(cfg).with_retry(RetryConfig::none());
    let symbols: Vec<String> = ["ETH/USDT", "NOPE/USDT", "SHORT/USDT"].iter().map(|s| s.to_string()).collect();

    let report = scanner.run_cycle(source.as_ref(), &symbols).await;

    assert_eq!(report.cycle, 1);
    assert_eq!(report.exchange, "csv");
    for slot in TimeframeSlot::ALL {
        assert_eq!(report.context.get(slot), &RegimeStatus::Label(RegimeLabel::TrendingUp));
    }
    assert_eq!(report.evaluated, 1);
    let reasons: Vec<(&str, &str)> = report.skipped.iter().map(|s| (s.symbol.as_str(), s.reason)).collect();
    assert_eq!(reasons, vec![("NOPE/USDT", "unknown_symbol"), ("SHORT/USDT", "insufficient_data")]);
    assert!(report.events.len() <= 1);
    assert!(scanner.engine().memory("ETH/USDT").is_some());
    assert!(scanner.engine().memory("NOPE/USDT").is_none());
}

#[tokio::test]
async fn missing_reference_leaves_slots_unavailable() {
    quiet_logs();
    let dir = tempfile::tempdir().unwrap();
    write_bars(dir.path(), "BTC/USDT", Timeframe::M15, &uptrend(150));
    write_bars(dir.path(), "ETH/USDT", Timeframe::M15, &wavy(150));

    let cfg = config(dir.path());
    let source = CsvReplay::new(dir.path());
    let scanner = Scanner::new(cfg).with_retry(RetryConfig::none());
    let ctx = scanner.regime_context(&source).await;

    assert_eq!(ctx.label(TimeframeSlot::Short), Some(RegimeLabel::TrendingUp));
    assert!(matches!(ctx.get(TimeframeSlot::Medium), RegimeStatus::Unavailable(_)));
    assert!(matches!(ctx.get(TimeframeSlot::Long), RegimeStatus::Unavailable(_)));
}

#[tokio::test]
async fn replay_clock_hides_unclosed_reference_bar() {
    quiet_logs();
    let dir = tempfile::tempdir().unwrap();
    // steady climb, then a 4h bar that closes far below the trend
    let mut closes = uptrend(150);
    closes.push(50.0);
    write_bars(dir.path(), "BTC/USDT", Timeframe::H4, &closes);

    let cfg = config(dir.path());
    let source = CsvReplay::new(dir.path());
    let scanner = Scanner::new(cfg).with_retry(RetryConfig::none());
    let last_open = BASE_TS + 150 * Timeframe::H4.secs();

    // one 15m bar into the crash bar: its close is still in the future
    source.set_cursor(last_open + Timeframe::M15.secs());
    let ctx = scanner.regime_context(&source).await;
    assert_eq!(ctx.label(TimeframeSlot::Long), Some(RegimeLabel::TrendingUp));

    source.set_cursor(last_open + Timeframe::H4.secs());
    let ctx = scanner.regime_context(&source).await;
    assert_eq!(ctx.label(TimeframeSlot::Long), Some(RegimeLabel::Ranging));
}

/// Venue-like source: returns the forming bar last, like live klines do.
struct FormingBarSource {
    bars: Vec<Bar>,
    now: u64,
}

#[async_trait]
impl MarketSource for FormingBarSource {
    fn name(&self) -> &'static str {
        "forming"
    }

    fn now(&self) -> u64 {
        self.now
    }

    async fn fetch_bars(&self, _symbol: &str, _timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, FetchError> {
        let start = self.bars.len().saturating_sub(limit);
        Ok(self.bars[start..].to_vec())
    }

    async fn fetch_order_book(&self, _symbol: &str, _depth: usize) -> Result<OrderBook, FetchError> {
        Err(FetchError::Empty)
    }
}

#[tokio::test]
async fn forming_bar_is_not_evaluated() {
    quiet_logs();
    let mut bars: Vec<Bar> = wavy(150)
        .iter()
        .enumerate()
        .map(|(i, c)| Bar { ts: BASE_TS + i as u64 * 900, open: *c, high: c + 0.3, low: c - 0.3, close: *c, volume: 5.0 })
        .collect();
    // seconds-old bar with a zero price: evaluating it would fail validation
    let forming_ts = BASE_TS + 150 * 900;
    bars.push(Bar { ts: forming_ts, open: 0.0, high: 0.0, low: 0.0, close: 0.0, volume: 0.0 });
    let source = FormingBarSource { bars, now: forming_ts + 5 };

    let dir = tempfile::tempdir().unwrap();
    let mut scanner = Scanner::new(config(dir.path())).with_retry(RetryConfig::none());
    let symbols = vec!["ETH/USDT".to_string()];
    let report = scanner
        .run_cycle_with(&source, &symbols, RegimeContext::uniform(RegimeLabel::TrendingUp))
        .await;

    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.evaluated, 1);
}

#[tokio::test]
async fn replay_walks_every_bar_after_warmup() {
    quiet_logs();
    let dir = tempfile::tempdir().unwrap();
    write_bars(dir.path(), "ETH/USDT", Timeframe::M15, &wavy(200));
    let cfg = config(dir.path());
    let source = CsvReplay::new(dir.path());
    let context = ReplayContext::Fixed(RegimeContext::uniform(RegimeLabel::TrendingUp));

    let tape = replay_symbol(&source, &cfg, "ETH/USDT", &context).await.unwrap();

    assert_eq!(tape.steps, 200 - (cfg.pipeline.min_bars - 1));
    assert_eq!(tape.skipped, 0);
    // at most one event per bar, in bar order
    for pair in tape.events.windows(2) {
        assert!(pair[0].bar_index < pair[1].bar_index);
    }
    // a fixed uptrend context never lets a short expansion through
    assert!(tape
        .events
        .iter()
        .all(|e| e.kind != scanfx::events::EventKind::Expansion || e.direction == scanfx::events::Direction::Long));
}

#[test]
fn replay_context_parse() {
    assert_eq!("reference".parse::<ReplayContext>(), Ok(ReplayContext::Reference));
    assert!("sideways".parse::<ReplayContext>().is_err());
}
