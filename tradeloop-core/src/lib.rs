//! Tradeloop Core — tick-driven trading decision engine.
//!
//! This crate contains:
//! - Domain types (ticks, candles, signals, positions, account)
//! - Tick → candle aggregation with explicit gap markers
//! - Incremental indicators (EMA, RSI, MACD, ATR, Bollinger, Stochastic RSI, Ichimoku)
//! - Pluggable strategies behind a registry, built from config
//! - Quorum signal confirmation, risk sizing and circuit breakers
//! - Slot admission control and the per-position lifecycle
//! - A sans-IO orchestrator, the venue trait with a paper venue, and the
//!   tokio decision loop that connects them

pub mod admission;
pub mod aggregator;
pub mod audit;
pub mod config;
pub mod confirm;
pub mod domain;
pub mod engine;
pub mod gateway;
pub mod indicators;
pub mod lifecycle;
pub mod risk;
pub mod runtime;
pub mod strategy;

pub use config::EngineConfig;
pub use engine::{EngineCommand, EngineEvent, EventSink, ExecutionReport, Orchestrator};
pub use runtime::{DecisionLoop, LoopHandle, LoopInput};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the decision loop moves across tasks
    /// is Send, and shared read-only state is Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Tick>();
        require_sync::<domain::Tick>();
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::CandleSeries>();
        require_sync::<domain::CandleSeries>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::ClosedTrade>();
        require_sync::<domain::ClosedTrade>();
        require_send::<domain::AccountState>();
        require_sync::<domain::AccountState>();

        // Pipeline stages
        require_send::<indicators::IndicatorEngine>();
        require_sync::<indicators::IndicatorEngine>();
        require_send::<strategy::StrategyRegistry>();
        require_sync::<strategy::StrategyRegistry>();
        require_send::<confirm::SignalConfirmer>();
        require_send::<risk::RiskManager>();
        require_send::<admission::AdmissionController>();
        require_send::<lifecycle::TradeLifecycleManager>();

        // Engine and loop
        require_send::<engine::Orchestrator<engine::VecSink>>();
        require_send::<engine::EngineCommand>();
        require_send::<engine::ExecutionReport>();
        require_send::<runtime::LoopInput>();
        require_send::<runtime::LoopHandle>();
        require_sync::<runtime::LoopHandle>();
        require_send::<runtime::DecisionLoop<gateway::PaperGateway, engine::VecSink>>();

        // Venue
        require_send::<gateway::PaperGateway>();
        require_sync::<gateway::PaperGateway>();
    }

    /// Strategies see candles and indicators only; account state is not
    /// part of the signature.
    #[test]
    fn strategy_trait_has_no_account_parameter() {
        fn _check_trait_object_builds(
            strategy: &dyn strategy::Strategy,
            candles: &[domain::Candle],
            indicators: &indicators::IndicatorValues,
        ) -> Result<domain::Direction, strategy::StrategyError> {
            strategy.evaluate(candles, indicators)
        }
    }
}
