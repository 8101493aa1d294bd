//! Which symbols a cycle scans.

use crate::exchange::retry::{retry_async, RetryConfig};
use crate::exchange::MarketSource;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::market::Ticker;

#[derive(Debug, Clone, PartialEq)]
pub enum UniverseMode {
    /// Scan `UniverseConfig::symbols` as given.
    Static,
    /// Top pairs by 24h quote volume, falling back to the static list.
    Dynamic {
        quote: String,
        min_quote_volume: f64,
        max_symbols: usize,
    },
}

impl UniverseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniverseMode::Static => "static",
            UniverseMode::Dynamic { .. } => "dynamic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    pub mode: UniverseMode,
}

/// Highest quote volume first; ties broken by symbol so the order is stable.
pub fn rank_tickers(mut tickers: Vec<Ticker>, min_quote_volume: f64, max_symbols: usize, exclude: &str) -> Vec<String> {
    tickers.retain(|t| t.quote_volume.is_finite() && t.quote_volume >= min_quote_volume && t.symbol != exclude);
    tickers.sort_by(|a, b| {
        b.quote_volume
            .partial_cmp(&a.quote_volume)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    tickers.into_iter().take(max_symbols).map(|t| t.symbol).collect()
}

/// Resolve the scan list for this cycle. `reference` is left out of dynamic
/// results since it already feeds the regime context.
pub async fn resolve(
    source: &dyn MarketSource,
    cfg: &UniverseConfig,
    reference: &str,
    retry: &RetryConfig,
) -> Vec<String> {
    let (quote, min_quote_volume, max_symbols) = match &cfg.mode {
        UniverseMode::Static => return cfg.symbols.clone(),
        UniverseMode::Dynamic { quote, min_quote_volume, max_symbols } => (quote, *min_quote_volume, *max_symbols),
    };

    let fetched = retry_async(retry, "fetch_tickers", || source.fetch_tickers(quote)).await;
    let ranked = match fetched {
        Ok(tickers) => rank_tickers(tickers, min_quote_volume, max_symbols, reference),
        Err(e) => {
            log(
                Level::Warn,
                Domain::Scan,
                "universe_fallback",
                obj(&[
                    ("exchange", v_str(source.name())),
                    ("reason", v_str(e.reason())),
                    ("error", v_str(&e.to_string())),
                ]),
            );
            return cfg.symbols.clone();
        }
    };

    if ranked.is_empty() {
        log(
            Level::Warn,
            Domain::Scan,
            "universe_fallback",
            obj(&[("exchange", v_str(source.name())), ("reason", v_str("no_pairs_above_floor"))]),
        );
        return cfg.symbols.clone();
    }
    log(
        Level::Info,
        Domain::Scan,
        "universe_resolved",
        obj(&[("quote", v_str(quote)), ("count", v_num(ranked.len() as f64))]),
    );
    ranked
}
