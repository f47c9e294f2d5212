//! Pluggable signal strategies and the registry that runs them.
//!
//! A strategy sees only the closed candle series and the indicator values,
//! never positions or account state. Failures (warmup, undefined
//! indicators) are recovered inside the registry as `Direction::Neutral`.

pub mod candle;
pub mod custom;
pub mod factory;
pub mod forex;

pub use factory::{create_strategy, default_category, FactoryError};

use tracing::debug;

use crate::config::StrategyConfig;
use crate::domain::{Candle, Category, Direction, Signal, StrategyContext};
use crate::indicators::{IndicatorSpec, IndicatorValues};
use crate::risk::StrategyRisk;

/// Recoverable evaluation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    #[error("need {needed} candles, have {have}")]
    InsufficientData { needed: usize, have: usize },
    #[error("indicator {0} is undefined")]
    Undefined(String),
}

/// A signal-producing unit.
///
/// `evaluate` looks at the last candle of `candles` and may use only
/// `candles` and `indicators`.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum number of candles before the strategy can say anything.
    fn warmup(&self) -> usize;

    /// Indicators the strategy reads beyond the standard set.
    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        Vec::new()
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError>;
}

/// Index of the last candle, or `InsufficientData`.
pub(crate) fn last_index(candles: &[Candle], needed: usize) -> Result<usize, StrategyError> {
    if candles.len() < needed.max(1) {
        return Err(StrategyError::InsufficientData {
            needed: needed.max(1),
            have: candles.len(),
        });
    }
    Ok(candles.len() - 1)
}

/// A defined indicator value, or `Undefined`.
pub(crate) fn require(
    indicators: &IndicatorValues,
    name: &str,
    index: usize,
) -> Result<f64, StrategyError> {
    indicators
        .get(name, index)
        .ok_or_else(|| StrategyError::Undefined(name.to_string()))
}

/// A strategy plus its registration data.
pub struct RegisteredStrategy {
    pub id: String,
    pub category: Category,
    pub enabled: bool,
    pub risk: StrategyRisk,
    strategy: Box<dyn Strategy>,
}

impl RegisteredStrategy {
    pub fn new(
        id: impl Into<String>,
        category: Category,
        risk: StrategyRisk,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            enabled: true,
            risk,
            strategy,
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Evaluate with failures folded into `Neutral`.
    pub fn evaluate(&self, candles: &[Candle], indicators: &IndicatorValues) -> Direction {
        match self.strategy.evaluate(candles, indicators) {
            Ok(direction) => direction,
            Err(err) => {
                debug!(strategy = %self.id, error = %err, "strategy abstained");
                Direction::Neutral
            }
        }
    }

    /// Settings carried by positions this strategy opens.
    pub fn context(&self) -> StrategyContext {
        StrategyContext {
            source_id: self.id.clone(),
            use_signal_change: self.risk.use_signal_change,
            use_pattern_reversal: self.risk.use_pattern_reversal,
            atr_trailing_multiplier: self.risk.atr_trailing_multiplier,
        }
    }
}

/// Strategies in registration order.
#[derive(Default)]
pub struct StrategyRegistry {
    entries: Vec<RegisteredStrategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured strategy. Disabled entries are kept but skipped.
    pub fn from_config(configs: &[StrategyConfig]) -> Result<Self, FactoryError> {
        let mut registry = Self::new();
        for config in configs {
            let strategy = create_strategy(config)?;
            let id = config
                .id
                .clone()
                .unwrap_or_else(|| config.component_type.clone());
            let category = match config.category {
                Some(category) => category,
                None => default_category(&config.component_type)?,
            };
            let mut entry = RegisteredStrategy::new(id, category, config.risk.clone(), strategy);
            entry.enabled = config.enabled;
            registry.register(entry)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, entry: RegisteredStrategy) -> Result<(), FactoryError> {
        if self.get(&entry.id).is_some() {
            return Err(FactoryError::DuplicateId(entry.id));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredStrategy> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredStrategy> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazily evaluate enabled strategies of `category` in registration
    /// order, yielding only non-neutral signals. Callers stop pulling at the
    /// first signal they act on.
    pub fn signals<'a>(
        &'a self,
        category: Category,
        candles: &'a [Candle],
        indicators: &'a IndicatorValues,
    ) -> impl Iterator<Item = (&'a RegisteredStrategy, Signal)> + 'a {
        let index = candles.len().saturating_sub(1);
        self.entries
            .iter()
            .filter(move |e| e.enabled && e.category == category)
            .filter_map(move |e| {
                let direction = e.evaluate(candles, indicators);
                if direction.is_neutral() {
                    None
                } else {
                    Some((e, Signal::new(direction, e.id.clone(), category, index)))
                }
            })
    }

    /// Re-evaluate one strategy by id. Unknown ids are neutral.
    pub fn evaluate_id(
        &self,
        id: &str,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Direction {
        self.get(id)
            .map(|e| e.evaluate(candles, indicators))
            .unwrap_or(Direction::Neutral)
    }

    /// Extra indicators needed by enabled strategies.
    pub fn required_indicators(&self) -> Vec<IndicatorSpec> {
        let mut specs: Vec<IndicatorSpec> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.enabled) {
            for spec in entry.strategy.required_indicators() {
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
        }
        specs
    }

    /// Longest warmup among enabled strategies.
    pub fn max_warmup(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.strategy.warmup())
            .max()
            .unwrap_or(0)
    }
}
