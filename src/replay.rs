//! Walk a CSV history forward bar by bar and collect the event tape.

use std::str::FromStr;

use crate::config::Config;
use crate::error::FetchError;
use crate::events::Event;
use crate::exchange::retry::RetryConfig;
use crate::exchange::CsvReplay;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::regime::{RegimeContext, RegimeLabel};
use crate::scanner::Scanner;

/// Where the replay takes its regime context from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayContext {
    /// Same context every step.
    Fixed(RegimeContext),
    /// Classified each step from the reference symbol's CSV files.
    Reference,
}

impl FromStr for ReplayContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(ReplayContext::Fixed(RegimeContext::uniform(RegimeLabel::TrendingUp))),
            "down" => Ok(ReplayContext::Fixed(RegimeContext::uniform(RegimeLabel::TrendingDown))),
            "ranging" => Ok(ReplayContext::Fixed(RegimeContext::uniform(RegimeLabel::Ranging))),
            "reference" | "ref" => Ok(ReplayContext::Reference),
            other => Err(format!("unknown replay context {:?} (up|down|ranging|reference)", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayTape {
    pub steps: usize,
    pub skipped: usize,
    pub events: Vec<Event>,
}

/// Replay `symbol` on `cfg.scan_timeframe`. The first evaluated bar is the
/// one where `cfg.pipeline.min_bars` bars are visible.
pub async fn replay_symbol(
    source: &CsvReplay,
    cfg: &Config,
    symbol: &str,
    context: &ReplayContext,
) -> Result<ReplayTape, FetchError> {
    let history = source.history(symbol, cfg.scan_timeframe)?;
    let mut scanner = Scanner::new(cfg.clone()).with_retry(RetryConfig::none());
    let symbols = vec![symbol.to_string()];
    let mut tape = ReplayTape::default();

    let warmup = cfg.pipeline.min_bars.saturating_sub(1);
    let step = cfg.scan_timeframe.secs();
    for bar in history.iter().skip(warmup) {
        // Evaluate as of the moment this bar closes.
        source.set_cursor(bar.ts + step);
        let report = match context {
            ReplayContext::Fixed(ctx) => scanner.run_cycle_with(source, &symbols, ctx.clone()).await,
            ReplayContext::Reference => scanner.run_cycle(source, &symbols).await,
        };
        tape.steps += 1;
        tape.skipped += report.skipped.len();
        tape.events.extend(report.events);
    }
    source.clear_cursor();

    log(
        Level::Info,
        Domain::Scan,
        "replay_done",
        obj(&[
            ("symbol", v_str(symbol)),
            ("steps", v_num(tape.steps as f64)),
            ("events", v_num(tape.events.len() as f64)),
            ("skipped", v_num(tape.skipped as f64)),
        ]),
    );
    Ok(tape)
}
