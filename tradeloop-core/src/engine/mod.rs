//! Sans-IO decision engine.
//!
//! [`Orchestrator`] consumes ticks and execution reports strictly in the
//! order they are handed to it and answers with [`EngineCommand`]s for the
//! venue. It never performs I/O itself; the decision loop in
//! [`crate::runtime`] executes the commands and feeds the results back.
//!
//! Per tick: floating P/L and equity, tick exits, then candle aggregation.
//! Per closed candle: indicators, circuit breakers, candle exits, then one
//! entry attempt per category in [`Category::EVALUATION_ORDER`].

pub mod events;

pub use events::{EngineEvent, EventSink, NullSink, RiskLimit, VecSink};

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionController;
use crate::aggregator::CandleAggregator;
use crate::config::{ConfigError, EngineConfig};
use crate::confirm::SignalConfirmer;
use crate::domain::{
    AccountState, Candle, CandleSeries, Category, ClosedTrade, Direction, ExitReason, Position,
    PositionState, RequestId, StrategyContext, Ticket, Tick,
};
use crate::gateway::{CloseFill, ExecutionError, FillRecord, OpenFill, OpenRequest};
use crate::indicators::{names, IndicatorEngine};
use crate::lifecycle::{CandleVerdicts, ExitOrder, TradeLifecycleManager};
use crate::risk::{RiskDecision, RiskManager};
use crate::strategy::{FactoryError, StrategyRegistry};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Strategy(#[from] FactoryError),
}

/// Work for the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineCommand {
    Open {
        request_id: RequestId,
        request: OpenRequest,
    },
    Close {
        ticket: Ticket,
        reason: ExitReason,
    },
    /// Best effort; failures are logged and the engine keeps its own stop.
    ModifyStop {
        ticket: Ticket,
        stop_loss: f64,
    },
}

impl EngineCommand {
    fn close(order: &ExitOrder) -> Self {
        EngineCommand::Close {
            ticket: order.ticket,
            reason: order.reason,
        }
    }
}

/// Outcome of a venue call, delivered back into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionReport {
    Opened {
        request_id: RequestId,
        fill: OpenFill,
        at: DateTime<Utc>,
    },
    OpenFailed {
        request_id: RequestId,
        error: ExecutionError,
    },
    Closed {
        ticket: Ticket,
        fill: CloseFill,
        at: DateTime<Utc>,
    },
    /// Retries exhausted, or the venue rejected the close.
    CloseFailed {
        ticket: Ticket,
        attempts: u32,
        error: ExecutionError,
    },
    StopModifyFailed {
        ticket: Ticket,
        error: ExecutionError,
    },
    /// Periodic comparison against the venue's open set.
    Reconciled {
        /// Tickets the engine tracked as open when the check started.
        checked: Vec<Ticket>,
        /// Tickets the venue still holds.
        venue_open: Vec<Ticket>,
        history: Vec<FillRecord>,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
struct PendingOpen {
    request: OpenRequest,
    category: Category,
    strategy: StrategyContext,
    trailing: bool,
    candle_index: usize,
}

/// The decision engine for one symbol.
pub struct Orchestrator<S: EventSink = VecSink> {
    symbol: String,
    warmup_candles: usize,
    close_candle_limit: Option<f64>,
    aggregator: CandleAggregator,
    series: CandleSeries,
    indicators: IndicatorEngine,
    registry: StrategyRegistry,
    confirmer: SignalConfirmer,
    risk: RiskManager,
    admission: AdmissionController,
    lifecycle: TradeLifecycleManager,
    account: AccountState,
    pending: BTreeMap<RequestId, PendingOpen>,
    last_tick: Option<Tick>,
    sink: S,
}

impl<S: EventSink> Orchestrator<S> {
    /// Build from configuration, creating strategies through the factory.
    pub fn new(config: &EngineConfig, sink: S) -> Result<Self, EngineError> {
        let registry = StrategyRegistry::from_config(&config.strategies)?;
        Self::with_registry(config, registry, sink)
    }

    /// Build with an externally assembled registry.
    pub fn with_registry(
        config: &EngineConfig,
        registry: StrategyRegistry,
        sink: S,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let mut indicators = IndicatorEngine::standard();
        for spec in registry.required_indicators() {
            indicators.add(&spec);
        }
        let strategy_warmup = registry.max_warmup();
        if strategy_warmup > config.warmup_candles {
            warn!(
                strategy_warmup,
                warmup_candles = config.warmup_candles,
                "strategies need more history than warmup_candles; early signals stay flat"
            );
        }
        info!(
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            strategies = registry.len(),
            strategy_warmup,
            "engine ready"
        );
        Ok(Self {
            symbol: config.symbol.clone(),
            warmup_candles: config.warmup_candles,
            close_candle_limit: config.risk.close_candle_limit,
            aggregator: CandleAggregator::new(config.symbol.clone(), config.timeframe),
            series: CandleSeries::new(config.timeframe),
            indicators,
            registry,
            confirmer: SignalConfirmer::new(&config.confirmation),
            risk: RiskManager::new(config.instrument.clone(), config.risk.clone()),
            admission: AdmissionController::new(config.slots.clone()),
            lifecycle: TradeLifecycleManager::new(config.instrument.clone()),
            account: AccountState::new(config.initial_balance),
            pending: BTreeMap::new(),
            last_tick: None,
            sink,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn indicators(&self) -> &IndicatorEngine {
        &self.indicators
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.lifecycle.positions()
    }

    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        self.lifecycle.get(ticket)
    }

    pub fn ledger(&self) -> &[ClosedTrade] {
        self.lifecycle.ledger()
    }

    pub fn pending_opens(&self) -> usize {
        self.pending.len()
    }

    /// Tickets eligible for reconciliation: tracked and not being closed.
    pub fn open_tickets(&self) -> Vec<Ticket> {
        self.lifecycle
            .positions()
            .filter(|p| p.is_open())
            .map(|p| p.ticket)
            .collect()
    }

    pub fn last_tick(&self) -> Option<&Tick> {
        self.last_tick.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn now(&self) -> DateTime<Utc> {
        self.last_tick
            .as_ref()
            .map(|t| t.timestamp)
            .unwrap_or_else(Utc::now)
    }

    fn emit(&mut self, event: EngineEvent) {
        let at = self.now();
        emit_to(&mut self.sink, at, event);
    }

    // ─── Tick clock ─────────────────────────────────────────────────────

    /// Process one tick.
    ///
    /// Invalid, foreign and out-of-order ticks are logged and dropped.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<EngineCommand> {
        let mut commands = Vec::new();
        if tick.symbol != self.symbol {
            warn!(expected = %self.symbol, got = %tick.symbol, "dropping tick for another symbol");
            return commands;
        }
        if !tick.is_valid() {
            warn!(bid = tick.bid, ask = tick.ask, "dropping malformed tick");
            return commands;
        }
        if let Some(last) = &self.last_tick {
            if tick.timestamp < last.timestamp {
                warn!(last = %last.timestamp, got = %tick.timestamp, "dropping out-of-order tick");
                return commands;
            }
        }
        self.last_tick = Some(tick.clone());

        if self.account.roll_day(tick.timestamp.date_naive()) {
            info!(
                date = %tick.timestamp.date_naive(),
                balance = self.account.balance,
                "new trading day"
            );
        }

        let floating = self.lifecycle.mark(tick);
        self.account.mark_to_market(floating);

        let atr = self.indicators.values().latest(names::ATR_14);
        let outcome = self.lifecycle.check_tick_exits(tick, atr);
        for change in outcome.stop_changes {
            commands.push(EngineCommand::ModifyStop {
                ticket: change.ticket,
                stop_loss: change.to,
            });
            self.emit(EngineEvent::StopAdjusted {
                ticket: change.ticket,
                from: change.from,
                to: change.to,
            });
        }
        commands.extend(outcome.exits.iter().map(EngineCommand::close));

        match self.aggregator.push(tick) {
            Ok(Some(candle)) => self.on_candle_closed(candle, &mut commands),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "tick rejected by aggregator"),
        }
        commands
    }

    // ─── Candle clock ───────────────────────────────────────────────────

    fn on_candle_closed(&mut self, candle: Candle, commands: &mut Vec<EngineCommand>) {
        match self.series.push(candle.clone()) {
            Ok(Some(gap)) => {
                debug!(missing = gap.missing, from = %gap.from, "gap in candle series");
                self.emit(EngineEvent::GapDetected { gap });
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "candle rejected by series");
                return;
            }
        }
        self.indicators.on_candle(&candle);
        let index = self.series.len() - 1;
        debug!(index, close = candle.close, "candle closed");
        self.emit(EngineEvent::CandleClosed { index, candle });

        self.admission.begin_cycle();

        let status = self.risk.evaluate_breakers(&self.account);
        if status.daily_newly_tripped {
            let threshold = self.risk.limits().daily_profit_limit.unwrap_or_default();
            error!(
                daily_profit = self.account.daily_profit(),
                threshold, "daily profit limit reached; admissions stopped for the day"
            );
            self.emit(EngineEvent::RiskLimitTriggered {
                limit: RiskLimit::DailyProfit,
                value: self.account.daily_profit(),
                threshold,
            });
        }
        if status.floor_newly_breached {
            let threshold = self.risk.limits().equity_floor.unwrap_or_default();
            error!(
                equity = self.account.equity,
                threshold, "equity below floor; admissions stopped"
            );
            self.emit(EngineEvent::RiskLimitTriggered {
                limit: RiskLimit::EquityFloor,
                value: self.account.equity,
                threshold,
            });
        }
        if status.daily_limit_hit {
            for ticket in self.lifecycle.profitable_open() {
                if let Some(order) = self
                    .lifecycle
                    .request_close(ticket, ExitReason::DailyProfitLimit)
                {
                    commands.push(EngineCommand::close(&order));
                }
            }
        }

        self.candle_exits(commands);

        if status.blocks_admission() {
            debug!("admission blocked by circuit breaker");
            return;
        }
        if self.series.len() < self.warmup_candles {
            return;
        }
        self.evaluate_entries(commands);
    }

    fn candle_exits(&mut self, commands: &mut Vec<EngineCommand>) {
        if !self.lifecycle.positions().any(Position::is_open) {
            return;
        }
        let candles = self.series.as_slice();
        let values = self.indicators.values();
        let mut strategy_directions = HashMap::new();
        for p in self.lifecycle.positions() {
            let id = &p.strategy.source_id;
            if p.strategy.use_pattern_reversal && !strategy_directions.contains_key(id) {
                let direction = self.registry.evaluate_id(id, candles, values);
                strategy_directions.insert(id.clone(), direction);
            }
        }
        let verdicts = CandleVerdicts {
            confirms_long: self
                .confirmer
                .confirm(Direction::Long, candles, values)
                .passed,
            confirms_short: self
                .confirmer
                .confirm(Direction::Short, candles, values)
                .passed,
            strategy_directions,
            close_candle_limit: self.close_candle_limit,
        };
        let exits = self.lifecycle.check_candle_exits(&verdicts);
        commands.extend(exits.iter().map(EngineCommand::close));
    }

    /// One entry attempt per category. Strategies are asked in registration
    /// order and every signal they raise is reported as detected; a signal
    /// the confirmer rejects moves on to the next strategy. The first
    /// confirmed signal ends the category for this candle whatever happens
    /// to it downstream, so a category can report several detections but
    /// at most one confirmation per candle.
    fn evaluate_entries(&mut self, commands: &mut Vec<EngineCommand>) {
        let at = self.now();
        let Some(quote) = self.last_tick.clone() else {
            return;
        };
        let equity = self.account.equity;
        let atr = self.indicators.values().latest(names::ATR_14);
        let candles = self.series.as_slice();
        let values = self.indicators.values();

        for category in Category::EVALUATION_ORDER {
            for (entry, mut signal) in self.registry.signals(category, candles, values) {
                emit_to(
                    &mut self.sink,
                    at,
                    EngineEvent::SignalDetected {
                        signal: signal.clone(),
                    },
                );
                let confirmation = self.confirmer.confirm(signal.direction, candles, values);
                signal
                    .metadata
                    .insert("votes".into(), f64::from(confirmation.votes));
                if !confirmation.passed {
                    debug!(source = %signal.source_id, votes = confirmation.votes, "signal rejected");
                    emit_to(
                        &mut self.sink,
                        at,
                        EngineEvent::SignalRejected {
                            signal,
                            confirmation,
                        },
                    );
                    continue;
                }
                emit_to(
                    &mut self.sink,
                    at,
                    EngineEvent::SignalConfirmed {
                        signal: signal.clone(),
                        confirmation,
                    },
                );

                let decision = match self.risk.decide(equity, &entry.risk, atr) {
                    Ok(decision) => decision,
                    Err(err) => {
                        warn!(source = %entry.id, error = %err, "risk sizing failed");
                        break;
                    }
                };
                let open = self.lifecycle.open_count(category);
                let request_id = match self.admission.try_admit(category, open) {
                    Ok(id) => id,
                    Err(reason) => {
                        debug!(
                            source = %entry.id,
                            cycle = self.admission.cycle(),
                            %reason,
                            "admission rejected"
                        );
                        emit_to(
                            &mut self.sink,
                            at,
                            EngineEvent::AdmissionRejected {
                                source_id: entry.id.clone(),
                                reason,
                            },
                        );
                        break;
                    }
                };

                let request = build_request(&self.symbol, &entry.id, &signal, &decision, &quote);
                info!(
                    %request_id,
                    source = %entry.id,
                    direction = %request.direction,
                    volume = request.volume,
                    "submitting open"
                );
                self.pending.insert(
                    request_id,
                    PendingOpen {
                        request: request.clone(),
                        category,
                        strategy: entry.context(),
                        trailing: entry.risk.use_trailing_stop,
                        candle_index: signal.candle_index,
                    },
                );
                emit_to(
                    &mut self.sink,
                    at,
                    EngineEvent::OrderSubmitted {
                        request_id,
                        request: request.clone(),
                        decision,
                    },
                );
                commands.push(EngineCommand::Open {
                    request_id,
                    request,
                });
                break;
            }
        }
    }

    // ─── Execution reports ──────────────────────────────────────────────

    /// Apply a venue outcome. Unknown request ids and tickets are logged
    /// and ignored.
    pub fn on_execution(&mut self, report: ExecutionReport) {
        match report {
            ExecutionReport::Opened {
                request_id,
                fill,
                at,
            } => self.on_opened(request_id, fill, at),
            ExecutionReport::OpenFailed { request_id, error } => {
                let Some(pending) = self.pending.remove(&request_id) else {
                    warn!(%request_id, "failure for unknown open request");
                    return;
                };
                self.admission.rollback(request_id);
                warn!(%request_id, source = %pending.strategy.source_id, %error, "open failed");
                self.emit(EngineEvent::OrderRejected {
                    request_id,
                    source_id: pending.strategy.source_id,
                    error,
                });
            }
            ExecutionReport::Closed { ticket, fill, at } => {
                match self
                    .lifecycle
                    .settle(ticket, Some(fill.fill_price), fill.realized_pnl, at)
                {
                    Some(trade) => {
                        self.apply_settlement(&trade);
                        self.emit(EngineEvent::TradeClosed { trade });
                    }
                    None => warn!(%ticket, "close fill for untracked ticket"),
                }
            }
            ExecutionReport::CloseFailed {
                ticket,
                attempts,
                error,
            } => {
                if !self.lifecycle.revert_to_open(ticket) {
                    warn!(%ticket, %error, "close failure for ticket not closing");
                    return;
                }
                error!(%ticket, attempts, %error, "could not close position");
                self.emit(EngineEvent::CloseFailed {
                    ticket,
                    attempts,
                    error,
                });
            }
            ExecutionReport::StopModifyFailed { ticket, error } => {
                warn!(%ticket, %error, "venue stop not updated; engine keeps its own stop");
            }
            ExecutionReport::Reconciled {
                checked,
                venue_open,
                history,
                at,
            } => self.reconcile(&checked, &venue_open, &history, at),
        }
    }

    fn on_opened(&mut self, request_id: RequestId, fill: OpenFill, at: DateTime<Utc>) {
        let Some(pending) = self.pending.remove(&request_id) else {
            warn!(%request_id, ticket = %fill.ticket, "fill for unknown open request");
            return;
        };
        self.admission.confirm(request_id);
        let request = pending.request;
        let position = Position {
            ticket: fill.ticket,
            symbol: request.symbol,
            category: pending.category,
            direction: request.direction,
            volume: request.volume,
            entry_price: fill.fill_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            trailing_enabled: pending.trailing,
            opened_at_candle: pending.candle_index,
            opened_at: at,
            strategy: pending.strategy,
            floating_pnl: 0.0,
            state: PositionState::Open,
            stop_adjustments: 0,
        };
        if !self.lifecycle.open(position.clone()) {
            warn!(ticket = %fill.ticket, "venue reused a tracked ticket");
            return;
        }
        self.emit(EngineEvent::TradeOpened { position });
    }

    fn reconcile(
        &mut self,
        checked: &[Ticket],
        venue_open: &[Ticket],
        history: &[FillRecord],
        at: DateTime<Utc>,
    ) {
        let venue: HashSet<Ticket> = venue_open.iter().copied().collect();
        for &ticket in checked {
            let still_open = self.lifecycle.get(ticket).is_some_and(Position::is_open);
            if !still_open || venue.contains(&ticket) {
                continue;
            }
            let record = history.iter().find(|r| r.ticket == ticket);
            let trade = self.lifecycle.settle(
                ticket,
                record.map(|r| r.exit_price),
                record.map(|r| r.realized_pnl),
                record.map_or(at, |r| r.closed_at),
            );
            if let Some(trade) = trade {
                warn!(%ticket, pnl = trade.realized_pnl, reconciled = trade.reconciled, "position closed externally");
                self.apply_settlement(&trade);
                self.emit(EngineEvent::ExternallyClosed { trade });
            }
        }
        let tracked: HashSet<Ticket> = self.lifecycle.tickets().into_iter().collect();
        for ticket in venue.difference(&tracked) {
            warn!(%ticket, "venue holds a position the engine does not track");
        }
    }

    fn apply_settlement(&mut self, trade: &ClosedTrade) {
        self.account.settle(trade.realized_pnl);
        self.account.mark_to_market(self.lifecycle.floating_total());
    }

    /// Roll back every open request still waiting on the venue. Used on
    /// shutdown once no venue call is in flight.
    pub fn abandon_pending(&mut self) -> Vec<RequestId> {
        let ids: Vec<RequestId> = self.pending.keys().copied().collect();
        for id in &ids {
            self.pending.remove(id);
            self.admission.rollback(*id);
            warn!(request_id = %id, "open request rolled back on shutdown");
        }
        ids
    }
}

fn build_request(
    symbol: &str,
    source_id: &str,
    signal: &crate::domain::Signal,
    decision: &RiskDecision,
    quote: &Tick,
) -> OpenRequest {
    let entry = quote.entry_price(signal.direction);
    let (stop_loss, take_profit) = decision.levels(signal.direction, entry);
    OpenRequest {
        symbol: symbol.to_string(),
        direction: signal.direction,
        volume: decision.volume,
        stop_loss,
        take_profit,
        tag: source_id.to_string(),
    }
}

fn emit_to<S: EventSink>(sink: &mut S, at: DateTime<Utc>, event: EngineEvent) {
    if event.is_alert() {
        error!(event = event.kind(), ?event, "alert");
    }
    sink.emit(at, &event);
}
