//! Multi-symbol market event scanner: regime context from a reference asset,
//! expansion and pullback detection per symbol, advisory firewall verdicts.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exchange;
pub mod firewall;
pub mod indicators;
pub mod logging;
pub mod market;
pub mod pipeline;
pub mod regime;
pub mod replay;
pub mod scanner;
pub mod sink;
pub mod universe;
