//! Factory: converts `StrategyConfig` entries into boxed strategies.

use crate::config::StrategyConfig;
use crate::domain::Category;

use super::candle::{Engulfing, Hammer, Marubozu, ShootingStar};
use super::custom::BodyDominance;
use super::forex::{BollingerBreakout, MaCrossover, MomentumRsiMacd};
use super::Strategy;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur while building the registry.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown strategy type: {0}")]
    UnknownStrategy(String),
    #[error("Duplicate strategy id: {0}")]
    DuplicateId(String),
    #[error("Invalid parameter {name}={value} for {strategy}")]
    InvalidParam {
        strategy: String,
        name: String,
        value: f64,
    },
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract a named f64 parameter, falling back to `default`.
fn param(config: &StrategyConfig, name: &str, default: f64) -> f64 {
    config.params.get(name).copied().unwrap_or(default)
}

/// Extract a named period parameter (>= 1), falling back to `default`.
fn param_period(config: &StrategyConfig, name: &str, default: usize) -> Result<usize, FactoryError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(FactoryError::InvalidParam {
            strategy: config.component_type.clone(),
            name: name.to_string(),
            value: v,
        }),
    }
}

/// Category a strategy type belongs to when the config does not say.
pub fn default_category(component_type: &str) -> Result<Category, FactoryError> {
    match component_type {
        "ma_crossover" | "momentum_rsi_macd" | "bollinger_breakout" => Ok(Category::Forex),
        "hammer" | "engulfing" | "marubozu" | "shooting_star" => Ok(Category::Candle),
        "body_dominance" => Ok(Category::Custom),
        other => Err(FactoryError::UnknownStrategy(other.to_string())),
    }
}

// ─── Strategy factory ────────────────────────────────────────────────

/// Create a strategy from its config entry.
pub fn create_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, FactoryError> {
    match config.component_type.as_str() {
        "ma_crossover" => {
            let fast = param_period(config, "fast_period", 10)?;
            let slow = param_period(config, "slow_period", 50)?;
            if fast >= slow {
                return Err(FactoryError::InvalidParam {
                    strategy: config.component_type.clone(),
                    name: "fast_period".into(),
                    value: fast as f64,
                });
            }
            Ok(Box::new(MaCrossover::new(fast, slow)))
        }
        "momentum_rsi_macd" => {
            let trend_period = param_period(config, "trend_period", 200)?;
            Ok(Box::new(MomentumRsiMacd::new(trend_period)))
        }
        "bollinger_breakout" => {
            let period = param_period(config, "period", 20)?;
            // the band needs a sample deviation
            if period < 2 {
                return Err(FactoryError::InvalidParam {
                    strategy: config.component_type.clone(),
                    name: "period".into(),
                    value: period as f64,
                });
            }
            let k = param(config, "std_multiplier", 2.0);
            Ok(Box::new(BollingerBreakout::new(period, k)))
        }
        "hammer" => {
            let oversold = param(config, "rsi_oversold", 35.0);
            Ok(Box::new(Hammer::new(oversold)))
        }
        "engulfing" => Ok(Box::new(Engulfing)),
        "marubozu" => {
            let min_body_ratio = param(config, "min_body_ratio", 0.98);
            Ok(Box::new(Marubozu::new(min_body_ratio)))
        }
        "shooting_star" => Ok(Box::new(ShootingStar)),
        "body_dominance" => {
            let threshold = param(config, "threshold", 0.6);
            Ok(Box::new(BodyDominance::new(threshold)))
        }
        other => Err(FactoryError::UnknownStrategy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(component_type: &str, params: &[(&str, f64)]) -> StrategyConfig {
        StrategyConfig {
            component_type: component_type.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn builds_every_known_type() {
        for t in [
            "ma_crossover",
            "momentum_rsi_macd",
            "bollinger_breakout",
            "hammer",
            "engulfing",
            "marubozu",
            "shooting_star",
            "body_dominance",
        ] {
            let s = create_strategy(&config(t, &[])).unwrap();
            assert_eq!(s.name(), t);
            assert!(default_category(t).is_ok());
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(matches!(
            create_strategy(&config("martingale", &[])),
            Err(FactoryError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn params_override_defaults_and_are_validated() {
        let s = create_strategy(&config("ma_crossover", &[("fast_period", 5.0), ("slow_period", 8.0)]))
            .unwrap();
        assert_eq!(s.warmup(), 9);
        assert!(create_strategy(&config("ma_crossover", &[("fast_period", 2.5)])).is_err());
        assert!(create_strategy(&config("ma_crossover", &[("fast_period", 60.0)])).is_err());
    }

    #[test]
    fn bollinger_period_below_two_is_rejected() {
        assert!(matches!(
            create_strategy(&config("bollinger_breakout", &[("period", 1.0)])),
            Err(FactoryError::InvalidParam { ref name, .. }) if name == "period"
        ));
        assert!(create_strategy(&config("bollinger_breakout", &[("period", 2.0)])).is_ok());
    }
}
