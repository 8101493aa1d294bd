//! Presentation of cycle reports.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::events::Event;
use crate::logging::{log, log_event, obj, v_num, v_str, Domain, Level};
use crate::regime::TimeframeSlot;
use crate::scanner::CycleReport;

pub trait ReportSink {
    fn publish(&mut self, report: &CycleReport) -> io::Result<()>;
}

/// Plain-text block per event on stdout.
pub struct ConsoleSink<W: Write> {
    out: W,
    slot_labels: [String; 3],
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(slot_labels: [String; 3]) -> Self {
        Self::new(io::stdout(), slot_labels)
    }
}

impl<W: Write> ConsoleSink<W> {
    /// `slot_labels` names each regime slot in the header, e.g. its timeframe.
    pub fn new(out: W, slot_labels: [String; 3]) -> Self {
        Self { out, slot_labels }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn render_event(event: &Event, exchange: &str) -> String {
    format!(
        "COIN: {}\nExchange: {}\nEvent: {}\nDirection: {}\nFirewall: {}\nLiquidity: {}\nRSI: {}\n",
        event.symbol,
        exchange,
        event.kind.title(),
        event.direction.as_str(),
        event.firewall.as_str(),
        event.liquidity.as_str(),
        event.oscillator.as_str(),
    )
}

pub fn render(report: &CycleReport, slot_labels: &[String; 3]) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "=== cycle {} | {} {} ===", report.cycle, report.exchange, report.timeframe);
    let header: Vec<String> = TimeframeSlot::ALL
        .iter()
        .zip(slot_labels.iter())
        .map(|(slot, name)| format!("{}: {}", name, report.context.get(*slot).display()))
        .collect();
    let _ = writeln!(s, "{}", header.join(" | "));
    let _ = writeln!(s);

    if report.events.is_empty() {
        let _ = writeln!(s, "no qualifying events ({} evaluated, {} skipped)", report.evaluated, report.skipped.len());
    } else {
        for event in &report.events {
            s.push_str(&render_event(event, report.exchange));
            s.push('\n');
        }
    }
    for skip in &report.skipped {
        let _ = writeln!(s, "skipped {}: {}", skip.symbol, skip.reason);
    }
    s
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn publish(&mut self, report: &CycleReport) -> io::Result<()> {
        let text = render(report, &self.slot_labels);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

/// Events through the structured logger only.
#[derive(Default)]
pub struct JsonlSink;

impl ReportSink for JsonlSink {
    fn publish(&mut self, report: &CycleReport) -> io::Result<()> {
        for event in &report.events {
            log_event(event);
        }
        let context: serde_json::Map<String, serde_json::Value> = report
            .context
            .iter()
            .map(|(slot, status)| (slot.as_str().to_string(), v_str(status.display())))
            .collect();
        log(
            Level::Info,
            Domain::Scan,
            "report",
            obj(&[
                ("cycle", v_num(report.cycle as f64)),
                ("msg", v_str(if report.is_quiet() { "no qualifying events" } else { "events emitted" })),
                ("events", v_num(report.events.len() as f64)),
                ("context", serde_json::Value::Object(context)),
            ]),
        );
        Ok(())
    }
}
