use std::path::PathBuf;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::engine::DetectorConfig;
use crate::error::ConfigError;
use crate::exchange::ExchangeKind;
use crate::firewall::FirewallConfig;
use crate::market::Timeframe;
use crate::pipeline::PipelineConfig;
use crate::regime::{RegimeConfig, TimeframeSlot};
use crate::universe::{UniverseConfig, UniverseMode};

pub const DEFAULT_SYMBOLS: &str = "ETH/USDT,SOL/USDT,AVAX/USDT,NEAR/USDT,XRP/USDT,LINK/USDT";

#[derive(Debug, Clone)]
pub struct Config {
    pub exchange: ExchangeKind,
    pub scan_timeframe: Timeframe,
    /// Short, medium, long reference slots
    pub regime_timeframes: [Timeframe; 3],
    pub reference_symbol: String,
    pub universe: UniverseConfig,
    pub bar_limit: usize,
    pub book_depth: usize,
    pub pipeline: PipelineConfig,
    pub regime: RegimeConfig,
    pub detector: DetectorConfig,
    pub firewall: FirewallConfig,
    pub binance_base: String,
    pub kraken_base: String,
    pub csv_dir: Option<PathBuf>,
    pub scan_once: bool,
    /// Publish through the structured logger instead of the console block
    pub jsonl_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeKind::Binance,
            scan_timeframe: Timeframe::M15,
            regime_timeframes: [Timeframe::M15, Timeframe::H1, Timeframe::H4],
            reference_symbol: "BTC/USDT".to_string(),
            universe: UniverseConfig {
                symbols: parse_symbols(DEFAULT_SYMBOLS),
                mode: UniverseMode::Static,
            },
            bar_limit: 200,
            book_depth: 50,
            pipeline: PipelineConfig::default(),
            regime: RegimeConfig::default(),
            detector: DetectorConfig::default(),
            firewall: FirewallConfig::default(),
            binance_base: "https://api.binance.com".to_string(),
            kraken_base: "https://api.kraken.com".to_string(),
            csv_dir: None,
            scan_once: false,
            jsonl_output: false,
        }
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Typed reads over a key lookup. A present but unparseable value is an
/// error, never a silent default.
struct Reader<F: Fn(&str) -> Option<String>> {
    get: F,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
    fn string(&self, key: &str, default: &str) -> String {
        (self.get)(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.get)(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Unparseable { key, value: raw }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.get)(key).map(|v| parse_flag(&v)).unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key source, then validate.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, ConfigError> {
        let r = Reader { get };
        let d = Config::default();

        let regime_raw = r.string("REGIME_TIMEFRAMES", "15m,1h,4h");
        let parsed: Vec<Timeframe> = regime_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Timeframe>())
            .collect::<Result<Vec<_>, _>>()?;
        let regime_timeframes = <[Timeframe; 3]>::try_from(parsed.as_slice())
            .map_err(|_| ConfigError::RegimeTimeframeCount(parsed.len()))?;

        let quote = r.string("UNIVERSE_QUOTE", "USDT").to_uppercase();
        let mode = match r.string("UNIVERSE_MODE", "static").trim().to_lowercase().as_str() {
            "static" => UniverseMode::Static,
            "dynamic" => UniverseMode::Dynamic {
                quote,
                min_quote_volume: r.parsed("UNIVERSE_MIN_QUOTE_VOL", 10_000_000.0)?,
                max_symbols: r.parsed("UNIVERSE_MAX", 20)?,
            },
            other => return Err(ConfigError::UnknownUniverseMode(other.to_string())),
        };

        let cfg = Self {
            exchange: r.string("EXCHANGE", d.exchange.as_str()).parse()?,
            scan_timeframe: r.string("SCAN_TIMEFRAME", d.scan_timeframe.as_str()).parse()?,
            regime_timeframes,
            reference_symbol: r.string("REFERENCE_SYMBOL", &d.reference_symbol).trim().to_uppercase(),
            universe: UniverseConfig { symbols: parse_symbols(&r.string("SYMBOLS", DEFAULT_SYMBOLS)), mode },
            bar_limit: r.parsed("BAR_LIMIT", d.bar_limit)?,
            book_depth: r.parsed("BOOK_DEPTH", d.book_depth)?,
            pipeline: PipelineConfig { min_bars: r.parsed("MIN_BARS", d.pipeline.min_bars)?, ..d.pipeline },
            regime: RegimeConfig {
                lookback: r.parsed("REGIME_LOOKBACK", d.regime.lookback)?,
                whipsaw_crosses: r.parsed("WHIPSAW_CROSSES", d.regime.whipsaw_crosses)?,
                convergence_ratio: r.parsed("CONVERGENCE_RATIO", d.regime.convergence_ratio)?,
                convergence_override_long: r.flag("LONG_CONVERGENCE_OVERRIDE", d.regime.convergence_override_long),
            },
            detector: DetectorConfig {
                reversion_threshold: r.parsed("REVERSION_TH", d.detector.reversion_threshold)?,
                body_multiplier: r.parsed("BODY_MULT", d.detector.body_multiplier)?,
                body_lookback: r.parsed("BODY_LOOKBACK", d.detector.body_lookback)?,
                freshness_bars: r.parsed("FRESHNESS_BARS", d.detector.freshness_bars)?,
            },
            firewall: FirewallConfig {
                liq_for_ratio: r.parsed("LIQ_FOR_RATIO", d.firewall.liq_for_ratio)?,
                liq_against_ratio: r.parsed("LIQ_AGAINST_RATIO", d.firewall.liq_against_ratio)?,
                liq_band: r.parsed("LIQ_BAND", d.firewall.liq_band)?,
                rsi_overbought: r.parsed("RSI_OVERBOUGHT", d.firewall.rsi_overbought)?,
                rsi_oversold: r.parsed("RSI_OVERSOLD", d.firewall.rsi_oversold)?,
            },
            binance_base: r.string("BINANCE_BASE", &d.binance_base),
            kraken_base: r.string("KRAKEN_BASE", &d.kraken_base),
            csv_dir: (r.get)("CSV_DIR").map(PathBuf::from),
            scan_once: r.flag("SCAN_ONCE", false),
            jsonl_output: r.string("OUTPUT", "console").trim().eq_ignore_ascii_case("jsonl"),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let det = &self.detector;
        if !(det.reversion_threshold > 0.0 && det.reversion_threshold < 1.0) {
            return Err(ConfigError::OutOfRange {
                key: "REVERSION_TH",
                value: det.reversion_threshold,
                expected: "(0, 1)",
            });
        }
        positive("BODY_MULT", det.body_multiplier)?;
        positive("BODY_LOOKBACK", det.body_lookback as f64)?;
        positive("FRESHNESS_BARS", det.freshness_bars as f64)?;

        let fw = &self.firewall;
        positive("LIQ_FOR_RATIO", fw.liq_for_ratio)?;
        positive("LIQ_AGAINST_RATIO", fw.liq_against_ratio)?;
        if fw.liq_against_ratio >= fw.liq_for_ratio {
            return Err(ConfigError::Inverted { low_key: "LIQ_AGAINST_RATIO", high_key: "LIQ_FOR_RATIO" });
        }
        if !(fw.liq_band > 0.0 && fw.liq_band < 1.0) {
            return Err(ConfigError::OutOfRange { key: "LIQ_BAND", value: fw.liq_band, expected: "(0, 1)" });
        }
        for (key, value) in [("RSI_OVERSOLD", fw.rsi_oversold), ("RSI_OVERBOUGHT", fw.rsi_overbought)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange { key, value, expected: "[0, 100]" });
            }
        }
        if fw.rsi_oversold >= fw.rsi_overbought {
            return Err(ConfigError::Inverted { low_key: "RSI_OVERSOLD", high_key: "RSI_OVERBOUGHT" });
        }

        positive("CONVERGENCE_RATIO", self.regime.convergence_ratio)?;
        if self.regime.lookback < 2 {
            return Err(ConfigError::OutOfRange {
                key: "REGIME_LOOKBACK",
                value: self.regime.lookback as f64,
                expected: ">= 2",
            });
        }
        positive("WHIPSAW_CROSSES", self.regime.whipsaw_crosses as f64)?;

        positive("BAR_LIMIT", self.bar_limit as f64)?;
        // An average cross needs the slow average on the previous bar too.
        if self.bar_limit <= self.pipeline.slow_period {
            return Err(ConfigError::OutOfRange {
                key: "BAR_LIMIT",
                value: self.bar_limit as f64,
                expected: "> slow average period",
            });
        }
        positive("BOOK_DEPTH", self.book_depth as f64)?;
        if self.pipeline.min_bars < 3 || self.pipeline.min_bars > self.bar_limit {
            return Err(ConfigError::OutOfRange {
                key: "MIN_BARS",
                value: self.pipeline.min_bars as f64,
                expected: "3 ..= BAR_LIMIT",
            });
        }

        if self.universe.symbols.is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        if let UniverseMode::Dynamic { min_quote_volume, max_symbols, .. } = &self.universe.mode {
            if *min_quote_volume < 0.0 {
                return Err(ConfigError::OutOfRange {
                    key: "UNIVERSE_MIN_QUOTE_VOL",
                    value: *min_quote_volume,
                    expected: ">= 0",
                });
            }
            positive("UNIVERSE_MAX", *max_symbols as f64)?;
        }
        if self.exchange == ExchangeKind::Csv && self.csv_dir.is_none() {
            return Err(ConfigError::MissingCsvDir("EXCHANGE=csv"));
        }
        Ok(())
    }

    pub fn regime_timeframe(&self, slot: TimeframeSlot) -> Timeframe {
        match slot {
            TimeframeSlot::Short => self.regime_timeframes[0],
            TimeframeSlot::Medium => self.regime_timeframes[1],
            TimeframeSlot::Long => self.regime_timeframes[2],
        }
    }

    /// Seconds until the next scan-timeframe bar opens.
    pub fn sleep_until_next_bar(&self, now_ts: u64) -> u64 {
        let tf = self.scan_timeframe.secs();
        let next = ((now_ts / tf) + 1) * tf;
        next.saturating_sub(now_ts)
    }

    /// Thresholds that shape detection, as written to the run manifest.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "exchange": self.exchange.as_str(),
            "scan_timeframe": self.scan_timeframe.as_str(),
            "regime_timeframes": self.regime_timeframes.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "reference_symbol": self.reference_symbol,
            "symbols": self.universe.symbols,
            "universe_mode": self.universe.mode.as_str(),
            "bar_limit": self.bar_limit,
            "min_bars": self.pipeline.min_bars,
            "reversion_threshold": self.detector.reversion_threshold,
            "body_multiplier": self.detector.body_multiplier,
            "body_lookback": self.detector.body_lookback,
            "freshness_bars": self.detector.freshness_bars,
            "liq_for_ratio": self.firewall.liq_for_ratio,
            "liq_against_ratio": self.firewall.liq_against_ratio,
            "liq_band": self.firewall.liq_band,
            "rsi_overbought": self.firewall.rsi_overbought,
            "rsi_oversold": self.firewall.rsi_oversold,
            "convergence_ratio": self.regime.convergence_ratio,
            "whipsaw_crosses": self.regime.whipsaw_crosses,
            "regime_lookback": self.regime.lookback,
            "long_convergence_override": self.regime.convergence_override_long,
        })
    }

    /// Short stable hash of the detection-relevant settings.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.summary().to_string().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { key, value, expected: "> 0" })
    }
}
