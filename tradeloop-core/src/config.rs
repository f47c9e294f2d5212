//! Engine configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::{Category, Direction, Timeframe};
use crate::risk::StrategyRisk;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    /// No entries are evaluated before the series holds this many candles.
    #[serde(default = "default_warmup_candles")]
    pub warmup_candles: usize,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub slots: SlotConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

fn default_initial_balance() -> f64 {
    10_000.0
}

fn default_warmup_candles() -> usize {
    50
}

/// Contract specification of the traded instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstrumentConfig {
    pub pip_size: f64,
    /// Account-currency value of one pip for one lot.
    pub pip_value_per_lot: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub volume_step: f64,
    /// Round-trip commission per lot, charged at settlement.
    pub commission_per_lot: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            pip_size: 0.0001,
            pip_value_per_lot: 10.0,
            min_volume: 0.01,
            max_volume: 100.0,
            volume_step: 0.01,
            commission_per_lot: 0.0,
        }
    }
}

impl InstrumentConfig {
    /// P/L in account currency for `volume` lots moved from `entry` to `price`.
    pub fn pnl(&self, direction: Direction, entry: f64, price: f64, volume: f64) -> f64 {
        let pips = direction.sign() * (price - entry) / self.pip_size;
        pips * self.pip_value_per_lot * volume
    }

    pub fn commission(&self, volume: f64) -> f64 {
        self.commission_per_lot * volume
    }
}

/// Account-wide risk budget and circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub risk_per_trade_percent: f64,
    /// Realized daily profit at which admissions stop and winners are banked.
    /// Zero or less disables the limit.
    pub daily_profit_limit: Option<f64>,
    /// Equity below which admissions stop.
    pub equity_floor: Option<f64>,
    /// Floating profit at which candle-pattern positions are closed.
    pub close_candle_limit: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_percent: 1.0,
            daily_profit_limit: None,
            equity_floor: None,
            close_candle_limit: None,
        }
    }
}

/// Maximum concurrent positions per category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlotConfig {
    pub forex: usize,
    pub candle: usize,
    pub custom: usize,
}

impl SlotConfig {
    pub fn max(&self, category: Category) -> usize {
        match category {
            Category::Forex => self.forex,
            Category::Candle => self.candle,
            Category::Custom => self.custom,
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            forex: 1,
            candle: 1,
            custom: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    pub min_votes: u8,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            rsi_lower: 30.0,
            rsi_upper: 70.0,
            min_votes: 3,
        }
    }
}

/// Venue interaction: retries, reconciliation cadence, queue size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// 0 disables periodic reconciliation.
    pub reconcile_interval_secs: u64,
    pub queue_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
            reconcile_interval_secs: 30,
            queue_capacity: 1024,
        }
    }
}

/// One registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub component_type: String,
    /// Defaults to the type name.
    #[serde(default)]
    pub id: Option<String>,
    /// Defaults to the family of the type.
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub risk: StrategyRisk,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            component_type: String::new(),
            id: None,
            category: None,
            enabled: true,
            risk: StrategyRisk::default(),
            params: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Minimal config with defaults everywhere and no strategies.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            initial_balance: default_initial_balance(),
            warmup_candles: default_warmup_candles(),
            instrument: InstrumentConfig::default(),
            risk: RiskConfig::default(),
            slots: SlotConfig::default(),
            confirmation: ConfirmationConfig::default(),
            execution: ExecutionConfig::default(),
            strategies: Vec::new(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot trade with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let i = &self.instrument;
        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".into());
        }
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return invalid(format!("initial_balance must be positive, got {}", self.initial_balance));
        }
        if !(i.pip_size > 0.0 && i.pip_value_per_lot > 0.0) {
            return invalid("pip_size and pip_value_per_lot must be positive".into());
        }
        if !(i.volume_step > 0.0 && i.min_volume > 0.0 && i.min_volume <= i.max_volume) {
            return invalid(format!(
                "volume bounds must satisfy 0 < min <= max and step > 0 (min={}, max={}, step={})",
                i.min_volume, i.max_volume, i.volume_step
            ));
        }
        if i.commission_per_lot < 0.0 {
            return invalid("commission_per_lot must not be negative".into());
        }
        let pct = self.risk.risk_per_trade_percent;
        if !(pct > 0.0 && pct <= 100.0) {
            return invalid(format!("risk_per_trade_percent must be in (0, 100], got {pct}"));
        }
        let c = &self.confirmation;
        if c.rsi_lower >= c.rsi_upper || c.min_votes > 4 {
            return invalid("confirmation needs rsi_lower < rsi_upper and min_votes <= 4".into());
        }
        if self.execution.max_attempts == 0 || self.execution.queue_capacity == 0 {
            return invalid("max_attempts and queue_capacity must be at least 1".into());
        }
        for s in &self.strategies {
            if !(s.risk.stop_loss_pips > 0.0 && s.risk.risk_ratio > 0.0) {
                return invalid(format!(
                    "strategy {} needs positive stop_loss_pips and risk_ratio",
                    s.component_type
                ));
            }
        }
        Ok(())
    }

    /// blake3 digest of the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}
