//! Position sizing, stop distances and capital-protection breakers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{InstrumentConfig, RiskConfig};
use crate::domain::{AccountState, Direction};

/// Per-strategy risk settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyRisk {
    /// Multiplier on the account risk budget (percent ratio × strategy multiplier).
    pub risk_ratio: f64,
    pub stop_loss_pips: f64,
    /// Fixed take-profit; when absent the reward:risk ratio applies.
    pub take_profit_pips: Option<f64>,
    pub reward_risk_ratio: f64,
    /// Derive SL/TP from ATR when it is defined.
    pub use_atr: bool,
    pub atr_sl_multiplier: f64,
    pub atr_tp_multiplier: f64,
    pub use_trailing_stop: bool,
    pub atr_trailing_multiplier: f64,
    /// Close when the confirmer backs the opposite direction.
    pub use_signal_change: bool,
    /// Close when the opening strategy flips to the opposite direction.
    pub use_pattern_reversal: bool,
}

impl Default for StrategyRisk {
    fn default() -> Self {
        Self {
            risk_ratio: 1.0,
            stop_loss_pips: 20.0,
            take_profit_pips: None,
            reward_risk_ratio: 2.0,
            use_atr: false,
            atr_sl_multiplier: 1.5,
            atr_tp_multiplier: 2.0,
            use_trailing_stop: false,
            atr_trailing_multiplier: 1.5,
            use_signal_change: false,
            use_pattern_reversal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("stop distance must be positive, got {0}")]
    NonPositiveStop(f64),
    #[error("equity is not a usable number: {0}")]
    BadEquity(f64),
}

/// Sizing outcome for one candidate trade. Distances are in price units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub volume: f64,
    pub stop_loss_distance: f64,
    pub take_profit_distance: f64,
    /// Account currency lost if the stop is hit at the sized volume.
    pub risk_amount: f64,
    pub atr_based: bool,
}

impl RiskDecision {
    /// Absolute SL/TP levels around `entry`.
    pub fn levels(&self, direction: Direction, entry: f64) -> (f64, f64) {
        let s = direction.sign();
        (
            entry - s * self.stop_loss_distance,
            entry + s * self.take_profit_distance,
        )
    }
}

/// Breaker state as of one candle cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BreakerStatus {
    pub daily_limit_hit: bool,
    /// True only on the cycle the daily limit first tripped for the day.
    pub daily_newly_tripped: bool,
    pub equity_floor_hit: bool,
    /// True only on the cycle equity first fell below the floor.
    pub floor_newly_breached: bool,
}

impl BreakerStatus {
    pub fn blocks_admission(&self) -> bool {
        self.daily_limit_hit || self.equity_floor_hit
    }
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    instrument: InstrumentConfig,
    limits: RiskConfig,
    tripped_on: Option<NaiveDate>,
    below_floor: bool,
}

impl RiskManager {
    pub fn new(instrument: InstrumentConfig, limits: RiskConfig) -> Self {
        Self {
            instrument,
            limits,
            tripped_on: None,
            below_floor: false,
        }
    }

    pub fn instrument(&self) -> &InstrumentConfig {
        &self.instrument
    }

    pub fn limits(&self) -> &RiskConfig {
        &self.limits
    }

    /// Size a trade and derive its stop distances.
    pub fn decide(
        &self,
        equity: f64,
        risk: &StrategyRisk,
        atr: Option<f64>,
    ) -> Result<RiskDecision, RiskError> {
        if !equity.is_finite() || equity <= 0.0 {
            return Err(RiskError::BadEquity(equity));
        }
        let pip = self.instrument.pip_size;
        let atr = atr.filter(|a| risk.use_atr && a.is_finite() && *a > 0.0);

        let (sl, tp) = match atr {
            Some(atr) => (atr * risk.atr_sl_multiplier, atr * risk.atr_tp_multiplier),
            None => {
                let sl = risk.stop_loss_pips * pip;
                let tp = match risk.take_profit_pips {
                    Some(tp_pips) => tp_pips * pip,
                    None => sl * risk.reward_risk_ratio,
                };
                (sl, tp)
            }
        };
        if !(sl.is_finite() && sl > 0.0) {
            return Err(RiskError::NonPositiveStop(sl));
        }

        let sl_pips = sl / pip;
        let volume = self.volume_for(equity, risk.risk_ratio, sl_pips);
        let decision = RiskDecision {
            volume,
            stop_loss_distance: sl,
            take_profit_distance: tp.max(0.0),
            risk_amount: volume * sl_pips * self.instrument.pip_value_per_lot,
            atr_based: atr.is_some(),
        };
        debug!(?decision, equity, "risk decision");
        Ok(decision)
    }

    /// volume = equity × risk% / 100 × ratio ÷ (sl_pips × pip_value_per_lot),
    /// clamped to the venue bounds and rounded down to the volume step.
    ///
    /// Non-decreasing in `equity`; always within `[min_volume, max_volume]`.
    pub fn volume_for(&self, equity: f64, risk_ratio: f64, sl_pips: f64) -> f64 {
        let i = &self.instrument;
        let budget = equity * self.limits.risk_per_trade_percent / 100.0 * risk_ratio;
        let raw = budget / (sl_pips * i.pip_value_per_lot);
        let raw = if raw.is_nan() { i.min_volume } else { raw };
        let clamped = raw.clamp(i.min_volume, i.max_volume);
        // epsilon keeps 0.5 / 0.01 from flooring to 49
        let steps = (clamped / i.volume_step + 1e-9).floor();
        let stepped = (steps * i.volume_step * 1e8).round() / 1e8;
        stepped.clamp(i.min_volume, i.max_volume)
    }

    /// Evaluate the daily profit limit and the equity floor.
    ///
    /// The daily limit latches for the rest of the calendar day once realized
    /// daily profit reaches it. A non-positive limit means no limit. The floor
    /// is re-checked every cycle.
    pub fn evaluate_breakers(&mut self, account: &AccountState) -> BreakerStatus {
        let mut status = BreakerStatus::default();

        if let Some(limit) = self.limits.daily_profit_limit.filter(|l| *l > 0.0) {
            let today = account.current_date;
            let latched = today.is_some() && self.tripped_on == today;
            if latched {
                status.daily_limit_hit = true;
            } else if account.daily_profit() >= limit {
                self.tripped_on = today;
                status.daily_limit_hit = true;
                status.daily_newly_tripped = true;
            }
        }

        if let Some(floor) = self.limits.equity_floor {
            let below = account.equity < floor;
            status.equity_floor_hit = below;
            status.floor_newly_breached = below && !self.below_floor;
            self.below_floor = below;
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limits: RiskConfig) -> RiskManager {
        RiskManager::new(InstrumentConfig::default(), limits)
    }

    #[test]
    fn half_lot_scenario() {
        // 10_000 × 1% / (20 pips × 10) = 0.5 lots
        let rm = manager(RiskConfig::default());
        let d = rm.decide(10_000.0, &StrategyRisk::default(), None).unwrap();
        assert!((d.volume - 0.5).abs() < 1e-12);
        assert!((d.stop_loss_distance - 0.0020).abs() < 1e-12);
        assert!((d.take_profit_distance - 0.0040).abs() < 1e-12);
        assert!((d.risk_amount - 100.0).abs() < 1e-9);
        assert!(!d.atr_based);
    }

    #[test]
    fn volume_is_clamped_and_stepped() {
        let rm = manager(RiskConfig::default());
        assert_eq!(rm.volume_for(1.0, 1.0, 20.0), 0.01);
        assert_eq!(rm.volume_for(1e12, 1.0, 20.0), 100.0);
        // 0.4567 → 0.45
        assert_eq!(rm.volume_for(9_134.0, 1.0, 20.0), 0.45);
    }

    #[test]
    fn atr_mode_only_when_atr_defined() {
        let rm = manager(RiskConfig::default());
        let risk = StrategyRisk {
            use_atr: true,
            ..StrategyRisk::default()
        };
        let d = rm.decide(10_000.0, &risk, Some(0.0010)).unwrap();
        assert!(d.atr_based);
        assert!((d.stop_loss_distance - 0.0015).abs() < 1e-12);
        assert!((d.take_profit_distance - 0.0020).abs() < 1e-12);
        let d = rm.decide(10_000.0, &risk, None).unwrap();
        assert!(!d.atr_based);
        assert!((d.stop_loss_distance - 0.0020).abs() < 1e-12);
    }

    #[test]
    fn fixed_take_profit_overrides_ratio() {
        let rm = manager(RiskConfig::default());
        let risk = StrategyRisk {
            take_profit_pips: Some(60.0),
            stop_loss_pips: 30.0,
            ..StrategyRisk::default()
        };
        let d = rm.decide(10_000.0, &risk, None).unwrap();
        assert!((d.take_profit_distance - 0.0060).abs() < 1e-12);
    }

    #[test]
    fn zero_stop_is_rejected() {
        let rm = manager(RiskConfig::default());
        let risk = StrategyRisk {
            stop_loss_pips: 0.0,
            ..StrategyRisk::default()
        };
        assert!(matches!(
            rm.decide(10_000.0, &risk, None),
            Err(RiskError::NonPositiveStop(_))
        ));
        assert!(matches!(
            rm.decide(f64::NAN, &StrategyRisk::default(), None),
            Err(RiskError::BadEquity(_))
        ));
    }

    #[test]
    fn levels_straddle_entry() {
        let d = RiskDecision {
            volume: 1.0,
            stop_loss_distance: 0.002,
            take_profit_distance: 0.004,
            risk_amount: 0.0,
            atr_based: false,
        };
        let (sl, tp) = d.levels(Direction::Long, 1.1);
        assert!((sl - 1.098).abs() < 1e-12 && (tp - 1.104).abs() < 1e-12);
        let (sl, tp) = d.levels(Direction::Short, 1.1);
        assert!((sl - 1.102).abs() < 1e-12 && (tp - 1.096).abs() < 1e-12);
    }

    #[test]
    fn daily_limit_latches_for_the_day() {
        let mut rm = manager(RiskConfig {
            daily_profit_limit: Some(200.0),
            ..RiskConfig::default()
        });
        let mut acct = AccountState::new(10_000.0);
        acct.roll_day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(!rm.evaluate_breakers(&acct).blocks_admission());

        acct.settle(205.0);
        let s = rm.evaluate_breakers(&acct);
        assert!(s.daily_limit_hit && s.daily_newly_tripped);

        acct.settle(-50.0);
        let s = rm.evaluate_breakers(&acct);
        assert!(s.daily_limit_hit && !s.daily_newly_tripped);

        acct.roll_day(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(!rm.evaluate_breakers(&acct).daily_limit_hit);
    }

    #[test]
    fn non_positive_daily_limit_is_no_limit() {
        for limit in [0.0, -50.0] {
            let mut rm = manager(RiskConfig {
                daily_profit_limit: Some(limit),
                ..RiskConfig::default()
            });
            let mut acct = AccountState::new(10_000.0);
            acct.roll_day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
            let s = rm.evaluate_breakers(&acct);
            assert!(!s.daily_limit_hit && !s.blocks_admission());

            acct.settle(500.0);
            assert!(!rm.evaluate_breakers(&acct).daily_limit_hit);
        }
    }

    #[test]
    fn equity_floor_reports_each_breach_once() {
        let mut rm = manager(RiskConfig {
            equity_floor: Some(9_000.0),
            ..RiskConfig::default()
        });
        let mut acct = AccountState::new(10_000.0);
        acct.mark_to_market(-1_500.0);
        let s = rm.evaluate_breakers(&acct);
        assert!(s.equity_floor_hit && s.floor_newly_breached);
        let s = rm.evaluate_breakers(&acct);
        assert!(s.equity_floor_hit && !s.floor_newly_breached);
        acct.mark_to_market(0.0);
        assert!(!rm.evaluate_breakers(&acct).blocks_admission());
    }
}
