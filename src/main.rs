use anyhow::Result;
use chrono::Utc;
use scanfx::config::Config;
use scanfx::logging::{log, log_config, obj, v_num, v_str, Domain, Level};
use scanfx::regime::TimeframeSlot;
use scanfx::scanner::Scanner;
use scanfx::sink::{ConsoleSink, JsonlSink, ReportSink};
use tokio::time::{sleep, Duration};

fn now_ts() -> u64 {
    Utc::now().timestamp() as u64
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    log_config(&cfg.fingerprint(), cfg.summary());
    let source = cfg.exchange.build(&cfg)?;

    let mut sink: Box<dyn ReportSink> = if cfg.jsonl_output {
        Box::new(JsonlSink)
    } else {
        let labels = TimeframeSlot::ALL.map(|slot| cfg.regime_timeframe(slot).as_str().to_string());
        Box::new(ConsoleSink::stdout(labels))
    };

    let scan_once = cfg.scan_once;
    let mut scanner = Scanner::new(cfg);
    loop {
        let start = now_ts();
        let report = scanner.scan(source.as_ref()).await;
        sink.publish(&report)?;

        if scan_once {
            break;
        }
        let sleep_for = scanner.config().sleep_until_next_bar(now_ts());
        log(
            Level::Debug,
            Domain::System,
            "sleep",
            obj(&[
                ("cycle", v_num(report.cycle as f64)),
                ("started", v_num(start as f64)),
                ("sleep_secs", v_num(sleep_for as f64)),
            ]),
        );
        sleep(Duration::from_secs(sleep_for)).await;
    }

    log(Level::Info, Domain::System, "shutdown", obj(&[("msg", v_str("scan complete"))]));
    Ok(())
}
