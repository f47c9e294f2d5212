//! Criterion benchmarks for the decision path.
//!
//! Benchmarks:
//! 1. Tick ingestion through the orchestrator (aggregation, exits, candle cycles)
//! 2. Candle aggregation alone
//! 3. Indicator recompute vs incremental fold over the standard set

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tradeloop_core::aggregator::CandleAggregator;
use tradeloop_core::config::{EngineConfig, StrategyConfig};
use tradeloop_core::domain::{Candle, Tick, Timeframe};
use tradeloop_core::engine::{NullSink, Orchestrator};
use tradeloop_core::indicators::IndicatorEngine;

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// Ten ticks a minute on a slow sine with a one-pip spread.
fn make_ticks(n: usize) -> Vec<Tick> {
    (0..n)
        .map(|i| {
            let mid = 1.10 + (i as f64 * 0.01).sin() * 0.005;
            Tick::new(
                "EURUSD",
                start() + Duration::seconds(i as i64 * 6),
                mid - 0.00005,
                mid + 0.00005,
            )
        })
        .collect()
}

fn make_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 1.10 + (i as f64 * 0.1).sin() * 0.005;
            Candle {
                open_time: start() + Duration::minutes(i as i64),
                open: close - 0.0003,
                high: close + 0.0008,
                low: close - 0.0008,
                close,
                tick_count: 10,
            }
        })
        .collect()
}

fn bench_config() -> EngineConfig {
    let mut config = EngineConfig::new("EURUSD", Timeframe::M1);
    config.strategies = ["ma_crossover", "engulfing", "body_dominance"]
        .iter()
        .map(|t| StrategyConfig {
            component_type: t.to_string(),
            ..StrategyConfig::default()
        })
        .collect();
    config
}

// ── 1. Tick ingestion ────────────────────────────────────────────────

fn bench_on_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestrator_on_tick");
    let config = bench_config();

    for &tick_count in &[1_000, 10_000] {
        let ticks = make_ticks(tick_count);
        group.bench_with_input(
            BenchmarkId::new("three_strategies", tick_count),
            &tick_count,
            |b, _| {
                b.iter(|| {
                    let mut engine = Orchestrator::new(&config, NullSink).unwrap();
                    let mut commands = 0;
                    for tick in &ticks {
                        commands += engine.on_tick(black_box(tick)).len();
                    }
                    commands
                });
            },
        );
    }

    group.finish();
}

// ── 2. Aggregation ───────────────────────────────────────────────────

fn bench_aggregator(c: &mut Criterion) {
    let ticks = make_ticks(10_000);
    c.bench_function("aggregate_10000_ticks", |b| {
        b.iter(|| {
            let mut agg = CandleAggregator::new("EURUSD", Timeframe::M1);
            ticks
                .iter()
                .filter_map(|t| agg.push(black_box(t)).ok().flatten())
                .count()
        });
    });
}

// ── 3. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators_standard");

    for &candle_count in &[500, 5_000] {
        let candles = make_candles(candle_count);
        group.bench_with_input(
            BenchmarkId::new("recompute", candle_count),
            &candle_count,
            |b, _| {
                let mut engine = IndicatorEngine::standard();
                b.iter(|| engine.recompute(black_box(&candles)));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("incremental", candle_count),
            &candle_count,
            |b, _| {
                b.iter(|| {
                    let mut engine = IndicatorEngine::standard();
                    for candle in &candles {
                        engine.on_candle(black_box(candle));
                    }
                    engine.len()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_on_tick, bench_aggregator, bench_indicators);
criterion_main!(benches);
