//! Replay one symbol from CSV files and print the event tape.
//!
//! usage: replay <csv_dir> <symbol> [up|down|ranging|reference]

use anyhow::{anyhow, Result};
use scanfx::config::Config;
use scanfx::exchange::CsvReplay;
use scanfx::replay::{replay_symbol, ReplayContext};
use scanfx::sink::render_event;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        return Err(anyhow!("usage: {} <csv_dir> <symbol> [up|down|ranging|reference]", args[0]));
    }
    let context: ReplayContext = args
        .get(3)
        .map(|s| s.as_str())
        .unwrap_or("reference")
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let mut cfg = Config::from_env()?;
    cfg.csv_dir = Some(args[1].clone().into());
    cfg.validate()?;
    let symbol = args[2].to_uppercase();
    let source = CsvReplay::new(&args[1]);

    let tape = replay_symbol(&source, &cfg, &symbol, &context).await?;
    for event in &tape.events {
        println!("bar {} @ {:.6}", event.bar_index, event.price);
        println!("{}", render_event(event, "csv"));
    }
    println!(
        "{} steps, {} events, {} skipped",
        tape.steps,
        tape.events.len(),
        tape.skipped
    );
    Ok(())
}
