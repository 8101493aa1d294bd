//! Structured logging for the scanner.
//!
//! Every record is one JSON line carrying `ts`, `run_id`, `seq`, `lvl`,
//! `component`, `event`, `msg`, an optional top-level `symbol`, and a `data`
//! object. Records go to stderr and to `LOG_DIR/<run_id>/`:
//! - `events.jsonl` for info and above
//! - `trace.jsonl` for trace/debug
//! - `manifest.json` describing the run
//!
//! Filtering: `LOG_LEVEL` (trace..fatal), `LOG_DOMAINS` (comma list or "all").

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::engine::{MemoryState, Outcome};
use crate::error::FetchError;
use crate::events::Event;
use crate::regime::{RegimeStatus, TimeframeSlot};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market,   // Bar windows, order books, fetch failures
    Regime,   // Reference-asset classification
    Detect,   // State machine outcomes
    Firewall, // Event annotations
    Scan,     // Cycle orchestration, skips, summaries
    System,   // Startup, config, shutdown
    Profile,  // Timings
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Market => "market",
            Domain::Regime => "regime",
            Domain::Detect => "detect",
            Domain::Firewall => "firewall",
            Domain::Scan => "scan",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] cannot create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("scan-{}-{}", ts_epoch_ms(), process::id()));
        if std::env::var("LOG_DIR").as_deref() == Ok("off") {
            return RunContext { run_id, events: None, trace: None };
        }
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
            return RunContext { run_id, events: None, trace: None };
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["symbol", "cycle", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_bars(symbol: &str, timeframe: &str, count: usize, last_ts: Option<u64>) {
    log(
        Level::Trace,
        Domain::Market,
        "bars",
        obj(&[
            ("symbol", v_str(symbol)),
            ("timeframe", v_str(timeframe)),
            ("count", json!(count)),
            ("last_ts", last_ts.map(|t| json!(t)).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_fetch_failed(symbol: &str, what: &str, err: &FetchError) {
    log(
        Level::Warn,
        Domain::Market,
        "fetch_failed",
        obj(&[
            ("symbol", v_str(symbol)),
            ("what", v_str(what)),
            ("reason", v_str(err.reason())),
            ("error", v_str(&err.to_string())),
        ]),
    );
}

pub fn log_regime(reference: &str, slot: TimeframeSlot, timeframe: &str, status: &RegimeStatus) {
    let (level, detail) = match status {
        RegimeStatus::Label(l) => (Level::Info, v_str(l.as_str())),
        RegimeStatus::Unavailable(reason) => (Level::Warn, v_str(reason)),
    };
    log(
        level,
        Domain::Regime,
        "regime",
        obj(&[
            ("symbol", v_str(reference)),
            ("slot", v_str(slot.as_str())),
            ("timeframe", v_str(timeframe)),
            ("available", Value::Bool(status.label().is_some())),
            ("label", detail),
        ]),
    );
}

pub fn log_outcome(symbol: &str, bar_index: u64, outcome: &Outcome, memory: MemoryState) {
    let mut fields = match serde_json::to_value(outcome) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    fields.insert("msg".to_string(), v_str(outcome.as_str()));
    fields.insert("symbol".to_string(), v_str(symbol));
    fields.insert("bar_index".to_string(), json!(bar_index));
    fields.insert("memory".to_string(), json!(memory));
    log(Level::Debug, Domain::Detect, "outcome", fields);
}

pub fn log_event(event: &Event) {
    let mut fields = match serde_json::to_value(event) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    fields.insert("msg".to_string(), v_str(event.kind.title()));
    log(Level::Info, Domain::Firewall, "event", fields);
}

pub fn log_skip(symbol: &str, reason: &str, detail: &str) {
    log(
        Level::Info,
        Domain::Scan,
        "symbol_skipped",
        obj(&[("symbol", v_str(symbol)), ("reason", v_str(reason)), ("detail", v_str(detail))]),
    );
}

pub fn log_cycle_summary(cycle: u64, universe: usize, evaluated: usize, events: usize, skipped: usize, elapsed_ms: f64) {
    let msg = if events == 0 { "no qualifying events" } else { "events emitted" };
    log(
        Level::Info,
        Domain::Scan,
        "cycle_summary",
        obj(&[
            ("cycle", json!(cycle)),
            ("msg", v_str(msg)),
            ("universe", json!(universe)),
            ("evaluated", json!(evaluated)),
            ("events", json!(events)),
            ("skipped", json!(skipped)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

pub fn log_config(fingerprint: &str, summary: Value) {
    log(
        Level::Info,
        Domain::System,
        "config",
        obj(&[("fingerprint", v_str(fingerprint)), ("settings", summary)]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits a structured timing record on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.elapsed_ms()));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
