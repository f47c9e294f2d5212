//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Aggregation: one candle per interval, bounding every tick, closing on the last
//! 2. Indicator warmup: undefined below lookback; recompute is idempotent and
//!    matches the incremental fold
//! 3. Confirmation: deterministic, and fewer than the quorum always rejects
//! 4. Admission: never exceeds slots, never two per category per cycle
//! 5. Sizing: volume non-decreasing in equity and within venue bounds
//! 6. Round trip: same-price open/close costs exactly the commission
//! 7. Ratchet: stops only tighten

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tradeloop_core::admission::AdmissionController;
use tradeloop_core::aggregator::CandleAggregator;
use tradeloop_core::config::{ConfirmationConfig, InstrumentConfig, RiskConfig, SlotConfig};
use tradeloop_core::confirm::SignalConfirmer;
use tradeloop_core::domain::{
    Candle, Category, Direction, PositionState, Position, RequestId, StrategyContext, Tick,
    Ticket, Timeframe,
};
use tradeloop_core::indicators::{IndicatorEngine, IndicatorSpec};
use tradeloop_core::lifecycle::{RatchetState, TradeLifecycleManager};
use tradeloop_core::risk::RiskManager;

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn candles_from(closes: &[f64]) -> Vec<Candle> {
    let mut prev = closes.first().copied().unwrap_or(1.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Candle {
                open_time: t0() + Duration::minutes(i as i64),
                open,
                high: open.max(close) + 0.0005,
                low: open.min(close) - 0.0005,
                close,
                tick_count: 1,
            }
        })
        .collect()
}

fn same(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.05..1.15_f64, min..max)
}

fn arb_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Forex),
        Just(Category::Candle),
        Just(Category::Custom),
    ]
}

#[derive(Debug, Clone)]
enum AdmissionOp {
    NewCycle,
    Admit(Category),
    Fill,
    Fail,
    CloseOne(Category),
}

fn arb_admission_op() -> impl Strategy<Value = AdmissionOp> {
    prop_oneof![
        1 => Just(AdmissionOp::NewCycle),
        4 => arb_category().prop_map(AdmissionOp::Admit),
        2 => Just(AdmissionOp::Fill),
        1 => Just(AdmissionOp::Fail),
        1 => arb_category().prop_map(AdmissionOp::CloseOne),
    ]
}

// ── 1. Aggregation ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn one_candle_bounds_all_ticks(
        prices in prop::collection::vec(1.0..1.2_f64, 1..50),
    ) {
        let mut agg = CandleAggregator::new("EURUSD", Timeframe::M1);
        let n = prices.len();
        for (i, &p) in prices.iter().enumerate() {
            // Spread the ticks over the first 59 seconds of the minute.
            let at = t0() + Duration::milliseconds((i * 59_000 / n) as i64);
            let sealed = agg.push(&Tick::new("EURUSD", at, p, p)).unwrap();
            prop_assert!(sealed.is_none());
        }
        let next = Tick::new("EURUSD", t0() + Duration::minutes(1), 1.1, 1.1);
        let candle = agg.push(&next).unwrap().expect("interval ended");
        prop_assert!(prices.iter().all(|&p| candle.low <= p && p <= candle.high));
        prop_assert_eq!(candle.close, *prices.last().unwrap());
        prop_assert_eq!(candle.open, prices[0]);
        prop_assert_eq!(candle.tick_count as usize, n);
    }
}

// ── 2. Indicator warmup and idempotence ──────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn undefined_below_lookback(closes in arb_closes(1, 120)) {
        let candles = candles_from(&closes);
        for spec in IndicatorSpec::standard() {
            let mut indicator = spec.build();
            let lookback = indicator.lookback();
            let columns = indicator.compute(&candles);
            for column in &columns {
                for value in column.iter().take(lookback) {
                    prop_assert!(value.is_nan(), "{:?} defined before {}", spec, lookback);
                }
            }
        }
    }

    #[test]
    fn recompute_is_idempotent_and_matches_fold(closes in arb_closes(30, 150)) {
        let candles = candles_from(&closes);
        let mut batch = IndicatorEngine::standard();
        batch.recompute(&candles);
        let first = batch.values().clone();
        batch.recompute(&candles);

        let mut incremental = IndicatorEngine::standard();
        for c in &candles {
            incremental.on_candle(c);
        }

        for name in first.names() {
            let a = first.get_series(name).unwrap();
            let b = batch.values().get_series(name).unwrap();
            let c = incremental.values().get_series(name).unwrap();
            prop_assert_eq!(a.len(), candles.len());
            for i in 0..a.len() {
                prop_assert!(same(a[i], b[i]), "{} differs at {}", name, i);
                prop_assert!(same(a[i], c[i]), "{} fold differs at {}", name, i);
            }
        }
    }
}

// ── 3. Confirmation ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn quorum_is_deterministic(
        closes in arb_closes(1, 90),
        long in any::<bool>(),
    ) {
        let candles = candles_from(&closes);
        let mut engine = IndicatorEngine::standard();
        engine.recompute(&candles);
        let confirmer = SignalConfirmer::new(&ConfirmationConfig::default());
        let direction = if long { Direction::Long } else { Direction::Short };

        let a = confirmer.confirm(direction, &candles, engine.values());
        let b = confirmer.confirm(direction, &candles, engine.values());
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.passed, a.votes >= 3);
        if a.votes < 3 {
            prop_assert!(!a.passed);
        }
    }
}

// ── 4. Admission ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn admission_never_oversubscribes(
        forex in 0usize..3,
        candle in 0usize..3,
        custom in 0usize..3,
        ops in prop::collection::vec(arb_admission_op(), 1..80),
    ) {
        let slots = SlotConfig { forex, candle, custom };
        let mut ctl = AdmissionController::new(slots.clone());
        let mut open = [0usize; 3];
        let idx = |c: Category| match c {
            Category::Forex => 0,
            Category::Candle => 1,
            Category::Custom => 2,
        };
        let mut pending: Vec<RequestId> = Vec::new();
        let mut admitted_this_cycle = [0usize; 3];
        ctl.begin_cycle();

        for op in ops {
            match op {
                AdmissionOp::NewCycle => {
                    ctl.begin_cycle();
                    admitted_this_cycle = [0; 3];
                }
                AdmissionOp::Admit(cat) => {
                    if let Ok(id) = ctl.try_admit(cat, open[idx(cat)]) {
                        pending.push(id);
                        admitted_this_cycle[idx(cat)] += 1;
                    }
                }
                AdmissionOp::Fill => {
                    if let Some(id) = pending.pop() {
                        let cat = ctl.confirm(id).expect("pending request");
                        open[idx(cat)] += 1;
                    }
                }
                AdmissionOp::Fail => {
                    if let Some(id) = pending.pop() {
                        prop_assert!(ctl.rollback(id).is_some());
                    }
                }
                AdmissionOp::CloseOne(cat) => {
                    open[idx(cat)] = open[idx(cat)].saturating_sub(1);
                }
            }
            for cat in [Category::Forex, Category::Candle, Category::Custom] {
                let occupied = open[idx(cat)] + ctl.pending_count(cat);
                prop_assert!(occupied <= slots.max(cat));
                prop_assert!(admitted_this_cycle[idx(cat)] <= 1);
            }
        }
    }
}

// ── 5. Sizing ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn volume_monotonic_and_bounded(
        e1 in 100.0..1_000_000.0_f64,
        e2 in 100.0..1_000_000.0_f64,
        sl_pips in 1.0..500.0_f64,
        ratio in 0.1..5.0_f64,
    ) {
        let risk = RiskManager::new(InstrumentConfig::default(), RiskConfig::default());
        let (lo, hi) = if e1 <= e2 { (e1, e2) } else { (e2, e1) };
        let v_lo = risk.volume_for(lo, ratio, sl_pips);
        let v_hi = risk.volume_for(hi, ratio, sl_pips);
        prop_assert!(v_lo <= v_hi);
        let i = risk.instrument();
        for v in [v_lo, v_hi] {
            prop_assert!(v >= i.min_volume && v <= i.max_volume);
        }
    }
}

// ── 6. Round trip ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn same_price_round_trip_costs_commission(
        price in 0.5..2.0_f64,
        volume in 0.01..10.0_f64,
        commission in 0.0..10.0_f64,
        long in any::<bool>(),
    ) {
        let instrument = InstrumentConfig {
            commission_per_lot: commission,
            ..InstrumentConfig::default()
        };
        let mut lifecycle = TradeLifecycleManager::new(instrument);
        let direction = if long { Direction::Long } else { Direction::Short };
        lifecycle.open(Position {
            ticket: Ticket(1),
            symbol: "EURUSD".into(),
            category: Category::Forex,
            direction,
            volume,
            entry_price: price,
            stop_loss: price - direction.sign() * 0.01,
            take_profit: price + direction.sign() * 0.02,
            trailing_enabled: false,
            opened_at_candle: 0,
            opened_at: t0(),
            strategy: StrategyContext {
                source_id: "p".into(),
                use_signal_change: false,
                use_pattern_reversal: false,
                atr_trailing_multiplier: 1.5,
            },
            floating_pnl: 0.0,
            state: PositionState::Open,
            stop_adjustments: 0,
        });
        lifecycle.mark(&Tick::new("EURUSD", t0(), price, price));
        let trade = lifecycle.settle(Ticket(1), Some(price), None, t0()).unwrap();
        prop_assert_eq!(trade.gross_pnl, 0.0);
        prop_assert!((trade.realized_pnl + commission * volume).abs() < 1e-9);
    }
}

// ── 7. Ratchet ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn ratchet_only_tightens(
        initial in 1.0..1.2_f64,
        proposals in prop::collection::vec(0.9..1.3_f64, 1..40),
        long in any::<bool>(),
    ) {
        let direction = if long { Direction::Long } else { Direction::Short };
        let mut ratchet = RatchetState::anchored(direction, initial);
        let mut level = initial;
        for p in proposals {
            ratchet.propose(p);
            let now = ratchet.level().unwrap();
            if long {
                prop_assert!(now >= level);
            } else {
                prop_assert!(now <= level);
            }
            level = now;
        }
    }
}
