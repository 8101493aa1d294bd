use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use scanfx::engine::{evaluate, DetectorConfig, EventEngine, Outcome, SymbolMemory};
use scanfx::events::{Direction, EventKind, Trigger};
use scanfx::firewall::{liquidity_verdict, FirewallConfig, LiquidityVerdict};
use scanfx::market::{Bar, BookLevel, OrderBook};
use scanfx::pipeline::IndicatorSnapshot;
use scanfx::regime::{classify, count_crosses, RegimeConfig, RegimeContext, RegimeLabel, RegimeStatus, TimeframeSlot};

fn snap(open: f64, close: f64, fast: f64, slow: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        bar: Bar {
            ts: 0,
            open,
            high: open.max(close) + 0.1,
            low: open.min(close) - 0.1,
            close,
            volume: 1.0,
        },
        sma_fast: Some(fast),
        sma_slow: Some(slow),
        rsi: Some(50.0),
        squeeze_on: false,
    }
}

/// Twelve calm bars: bodies of 0.2, fast above slow, no squeeze.
fn calm() -> Vec<IndicatorSnapshot> {
    (0..12).map(|_| snap(100.0, 100.2, 100.0, 98.0)).collect()
}

#[test]
fn scenario_a_squeeze_release_emits_long_expansion() {
    let mut snaps = calm();
    snaps[9].squeeze_on = true; // two bars before last
    snaps[11] = snap(100.0, 100.6, 100.0, 98.0); // body 3x the mean
    let ctx = RegimeContext::uniform(RegimeLabel::TrendingUp);
    let mut memory = SymbolMemory::default();

    let out = evaluate(&snaps, 500, &ctx, &mut memory, &DetectorConfig::default());

    let d = out.detection().copied().expect("expansion");
    assert_eq!(d.kind, EventKind::Expansion);
    assert_eq!(d.direction, Direction::Long);
    assert_eq!(d.trigger, Some(Trigger::SqueezeRelease));
    assert_eq!(memory.anchor_index, Some(500));
    assert_eq!(memory.direction, Some(Direction::Long));
    assert!(!memory.pullback_claimed);
}

#[test]
fn scenario_b_misaligned_short_slot_leaves_memory_alone() {
    let mut snaps = calm();
    snaps[9].squeeze_on = true;
    snaps[11] = snap(100.0, 100.6, 100.0, 98.0);
    let ctx = RegimeContext::uniform(RegimeLabel::TrendingDown);

    let mut memory = SymbolMemory::default();
    let out = evaluate(&snaps, 500, &ctx, &mut memory, &DetectorConfig::default());
    assert!(out.detection().is_none());
    assert_eq!(memory, SymbolMemory::default());

    let mut anchored = SymbolMemory::anchored(495, Direction::Short);
    let before = anchored.clone();
    let out = evaluate(&snaps, 500, &ctx, &mut anchored, &DetectorConfig::default());
    assert!(out.detection().is_none());
    assert_eq!(anchored, before);
}

#[test]
fn unavailable_short_slot_counts_as_misaligned() {
    let mut snaps = calm();
    snaps[9].squeeze_on = true;
    snaps[11] = snap(100.0, 100.6, 100.0, 98.0);
    let ctx = RegimeContext::uniform(RegimeLabel::TrendingUp)
        .with(TimeframeSlot::Short, RegimeStatus::Unavailable("fetch failed".into()));
    let mut memory = SymbolMemory::default();
    let out = evaluate(&snaps, 500, &ctx, &mut memory, &DetectorConfig::default());
    assert!(matches!(out, Outcome::Misaligned { short_regime: None, .. }));
}

#[test]
fn scenario_c_pullback_inside_window_is_claimed() {
    let mut snaps = calm();
    let mut last = snap(100.0, 100.2, 99.9, 98.0);
    last.bar.low = 99.9; // low == sma_fast, above sma_slow
    snaps[11] = last;
    let cfg = DetectorConfig { freshness_bars: 12, ..DetectorConfig::default() };
    let ctx = RegimeContext::uniform(RegimeLabel::TrendingUp);
    let mut memory = SymbolMemory::anchored(90, Direction::Long);

    let out = evaluate(&snaps, 100, &ctx, &mut memory, &cfg);

    let d = out.detection().copied().expect("pullback");
    assert_eq!(d.kind, EventKind::Pullback);
    assert_eq!(d.direction, Direction::Long);
    assert!(memory.pullback_claimed);
    assert_eq!(memory.anchor_index, Some(90));

    // second touch on the same anchor stays quiet
    let again = evaluate(&snaps, 101, &ctx, &mut memory, &cfg);
    assert_eq!(again, Outcome::AlreadyClaimed { anchor_index: 90 });
}

#[test]
fn scenario_d_stale_anchor_is_cleared() {
    let mut snaps = calm();
    let mut last = snap(100.0, 100.2, 99.9, 98.0);
    last.bar.low = 99.9;
    snaps[11] = last;
    let cfg = DetectorConfig { freshness_bars: 12, ..DetectorConfig::default() };
    let mut memory = SymbolMemory::anchored(80, Direction::Long);

    let out = evaluate(&snaps, 100, &RegimeContext::uniform(RegimeLabel::TrendingUp), &mut memory, &cfg);

    assert_eq!(out, Outcome::Expired { anchor_index: 80, age: 20 });
    assert_eq!(memory, SymbolMemory::default());
}

#[test]
fn window_boundary_is_inclusive() {
    let mut snaps = calm();
    let mut last = snap(100.0, 100.2, 99.9, 98.0);
    last.bar.low = 99.9;
    snaps[11] = last;
    let cfg = DetectorConfig { freshness_bars: 12, ..DetectorConfig::default() };
    let mut memory = SymbolMemory::anchored(88, Direction::Long);
    let out = evaluate(&snaps, 100, &RegimeContext::uniform(RegimeLabel::TrendingUp), &mut memory, &cfg);
    assert_eq!(out.detection().map(|d| d.kind), Some(EventKind::Pullback));
}

#[test]
fn scenario_e_empty_bid_side_gives_no_liquidity_signal() {
    let book = OrderBook {
        bids: vec![BookLevel { price: 99.9, volume: 0.0 }],
        asks: vec![BookLevel { price: 100.1, volume: 5.0 }],
    };
    let cfg = FirewallConfig::default();
    assert_eq!(liquidity_verdict(&book, 100.0, Direction::Long, &cfg), LiquidityVerdict::None);
    assert_eq!(liquidity_verdict(&book, 100.0, Direction::Short, &cfg), LiquidityVerdict::None);
}

#[test]
fn reversion_gate_blocks_everything() {
    let mut snaps = calm();
    snaps[9].squeeze_on = true;
    // big body but 5% away from the fast average
    snaps[11] = snap(100.0, 105.0, 100.0, 98.0);
    let ctx = RegimeContext::uniform(RegimeLabel::TrendingUp);
    let mut memory = SymbolMemory::anchored(495, Direction::Long);
    let before = memory.clone();
    let out = evaluate(&snaps, 500, &ctx, &mut memory, &DetectorConfig::default());
    assert!(matches!(out, Outcome::Suppressed { .. }));
    assert_eq!(memory, before);
}

// --- randomized properties -------------------------------------------------

fn random_snap(rng: &mut StdRng) -> IndicatorSnapshot {
    let fast = 100.0 + rng.gen_range(-2.0..2.0);
    let slow = 100.0 + rng.gen_range(-3.0..3.0);
    let close = fast * (1.0 + rng.gen_range(-0.05..0.05));
    let open = close + rng.gen_range(-1.5..1.5);
    let mut s = IndicatorSnapshot {
        bar: Bar {
            ts: 0,
            open,
            high: open.max(close) + rng.gen_range(0.0..1.0),
            low: open.min(close) - rng.gen_range(0.0..1.0),
            close,
            volume: 1.0,
        },
        sma_fast: Some(fast),
        sma_slow: Some(slow),
        rsi: Some(rng.gen_range(0.0..100.0)),
        squeeze_on: rng.gen_bool(0.3),
    };
    if rng.gen_bool(0.03) {
        s.sma_slow = None;
    }
    if rng.gen_bool(0.02) {
        s.sma_fast = None;
    }
    s
}

fn random_context(rng: &mut StdRng) -> RegimeContext {
    let labels = [RegimeLabel::TrendingUp, RegimeLabel::TrendingDown, RegimeLabel::Ranging];
    let mut ctx = RegimeContext::new();
    for slot in TimeframeSlot::ALL {
        if rng.gen_bool(0.9) {
            ctx.set(slot, RegimeStatus::Label(labels[rng.gen_range(0..3)]));
        }
    }
    ctx
}

#[test]
fn engine_invariants_hold_on_random_walks() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..40 {
        let cfg = DetectorConfig {
            reversion_threshold: rng.gen_range(0.005..0.2),
            body_multiplier: rng.gen_range(1.0..3.0),
            body_lookback: 10,
            freshness_bars: rng.gen_range(3..20),
        };
        let mut engine = EventEngine::new(cfg.clone());
        let mut window: Vec<IndicatorSnapshot> = (0..12).map(|_| random_snap(&mut rng)).collect();
        let mut index = 1_000u64;
        let mut pullbacks_per_anchor = std::collections::HashMap::new();

        for _ in 0..300 {
            window.remove(0);
            window.push(random_snap(&mut rng));
            index += if rng.gen_bool(0.1) { rng.gen_range(2..6) } else { 1 };
            let ctx = random_context(&mut rng);
            let before = engine.memory("SYM").cloned().unwrap_or_default();

            let out = engine.step("SYM", &window, index, &ctx);
            let after = engine.memory("SYM").cloned().unwrap_or_default();
            let last = window[window.len() - 1];

            if let Some(fast) = last.sma_fast {
                if (last.bar.close - fast).abs() > fast * cfg.reversion_threshold {
                    assert!(matches!(out, Outcome::Suppressed { .. }), "round {}: {:?}", round, out);
                    assert_eq!(before, after);
                }
            }

            match out {
                Outcome::Emitted(d) if d.kind == EventKind::Pullback => {
                    let anchor = before.anchor_index.expect("pullback needs an anchor");
                    assert!(index - anchor <= cfg.freshness_bars);
                    assert!(!before.pullback_claimed);
                    assert!(after.pullback_claimed);
                    assert_eq!(Some(d.direction), before.direction);
                    let n = pullbacks_per_anchor.entry(anchor).or_insert(0);
                    *n += 1;
                    assert_eq!(*n, 1, "second pullback on anchor {}", anchor);
                }
                Outcome::Emitted(d) => {
                    assert_eq!(after.anchor_index, Some(index));
                    assert!(!after.pullback_claimed);
                    let short = ctx.label(TimeframeSlot::Short);
                    let expected = if d.direction == Direction::Long { RegimeLabel::TrendingUp } else { RegimeLabel::TrendingDown };
                    assert_eq!(short, Some(expected));
                    pullbacks_per_anchor.remove(&index);
                }
                Outcome::Expired { .. } => assert_eq!(after, SymbolMemory::default()),
                _ => {}
            }

            // memory is always internally consistent after a step
            if after.anchor_index.is_none() {
                assert!(after.direction.is_none());
                assert!(!after.pullback_claimed);
            } else {
                assert!(after.direction.is_some());
            }
        }
    }
}

#[test]
fn liquidity_verdict_is_symmetric_under_flip() {
    let mut rng = StdRng::seed_from_u64(7);
    let cfg = FirewallConfig::default();
    for _ in 0..500 {
        let price = rng.gen_range(1.0..1000.0);
        let level = |rng: &mut StdRng, lo: f64, hi: f64| BookLevel {
            price: price * rng.gen_range(lo..hi),
            volume: if rng.gen_bool(0.1) { 0.0 } else { rng.gen_range(0.0..10.0) },
        };
        let book = OrderBook {
            bids: (0..rng.gen_range(0..6)).map(|_| level(&mut rng, 0.98, 1.0)).collect(),
            asks: (0..rng.gen_range(0..6)).map(|_| level(&mut rng, 1.0, 1.02)).collect(),
        };
        let long = liquidity_verdict(&book, price, Direction::Long, &cfg);
        let short = liquidity_verdict(&book, price, Direction::Short, &cfg);
        let flipped = match long {
            LiquidityVerdict::For => LiquidityVerdict::Against,
            LiquidityVerdict::Against => LiquidityVerdict::For,
            LiquidityVerdict::None => LiquidityVerdict::None,
        };
        assert_eq!(short, flipped);
    }
}

#[test]
fn regime_is_deterministic_and_whipsaw_wins() {
    let mut rng = StdRng::seed_from_u64(42);
    let cfg = RegimeConfig::default();
    for _ in 0..300 {
        let snaps: Vec<IndicatorSnapshot> = (0..30).map(|_| random_snap(&mut rng)).collect();
        for slot in TimeframeSlot::ALL {
            let a = classify(&snaps, &cfg, slot);
            let b = classify(&snaps, &cfg, slot);
            assert_eq!(a, b);
            let last = snaps[snaps.len() - 1];
            match (last.sma_fast, last.sma_slow) {
                (Some(_), Some(_)) => {
                    if count_crosses(&snaps, cfg.lookback) >= cfg.whipsaw_crosses {
                        assert_eq!(a, RegimeStatus::Label(RegimeLabel::Ranging));
                    }
                }
                _ => assert!(matches!(a, RegimeStatus::Unavailable(_))),
            }
        }
    }
}
