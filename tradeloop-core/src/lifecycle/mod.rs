//! Per-position lifecycle: monitoring, exit decisions and settlement.
//!
//! A tracked position is `Open` until an exit is decided, then `Closing`
//! until the venue answers. Exit checks only look at `Open` positions so a
//! close is never submitted twice. The slot stays occupied until the trade
//! is settled and moved to the ledger.
//!
//! Tick exits are checked in order: stop-loss, take-profit, then trailing
//! recalculation. Candle exits: signal change, pattern reversal, candle
//! profit limit. The first match wins.

mod ratchet;

pub use ratchet::RatchetState;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::InstrumentConfig;
use crate::domain::{
    Category, ClosedTrade, Direction, ExitReason, Position, PositionState, Ticket, Tick,
};

/// A decided exit waiting to be sent to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitOrder {
    pub ticket: Ticket,
    pub reason: ExitReason,
    /// Exit-side price at decision time.
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopChange {
    pub ticket: Ticket,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub exits: Vec<ExitOrder>,
    pub stop_changes: Vec<StopChange>,
}

/// What the candle cycle learned about the closed candle, as input to the
/// candle-close exit checks.
#[derive(Debug, Clone, Default)]
pub struct CandleVerdicts {
    /// The confirmer would accept a Long on this candle.
    pub confirms_long: bool,
    pub confirms_short: bool,
    /// Fresh evaluation of every registered strategy, by id.
    pub strategy_directions: HashMap<String, Direction>,
    pub close_candle_limit: Option<f64>,
}

impl CandleVerdicts {
    fn confirms(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.confirms_long,
            Direction::Short => self.confirms_short,
            Direction::Neutral => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    position: Position,
    ratchet: RatchetState,
    last_price: f64,
    exit_reason: Option<ExitReason>,
}

impl Tracked {
    fn begin_close(&mut self, reason: ExitReason) -> ExitOrder {
        self.position.state = PositionState::Closing;
        self.exit_reason = Some(reason);
        ExitOrder {
            ticket: self.position.ticket,
            reason,
            price: self.last_price,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradeLifecycleManager {
    instrument: InstrumentConfig,
    tracked: BTreeMap<Ticket, Tracked>,
    ledger: Vec<ClosedTrade>,
}

impl TradeLifecycleManager {
    pub fn new(instrument: InstrumentConfig) -> Self {
        Self {
            instrument,
            tracked: BTreeMap::new(),
            ledger: Vec::new(),
        }
    }

    /// Start tracking a position the venue confirmed. Returns false if the
    /// ticket is already tracked.
    pub fn open(&mut self, position: Position) -> bool {
        if self.tracked.contains_key(&position.ticket) {
            return false;
        }
        let ratchet = if position.trailing_enabled {
            RatchetState::anchored(position.direction, position.stop_loss)
        } else {
            RatchetState::disabled(position.direction)
        };
        info!(
            ticket = %position.ticket,
            category = %position.category,
            direction = %position.direction,
            volume = position.volume,
            entry = position.entry_price,
            sl = position.stop_loss,
            tp = position.take_profit,
            "position opened"
        );
        self.tracked.insert(
            position.ticket,
            Tracked {
                last_price: position.entry_price,
                position,
                ratchet,
                exit_reason: None,
            },
        );
        true
    }

    pub fn get(&self, ticket: Ticket) -> Option<&Position> {
        self.tracked.get(&ticket).map(|t| &t.position)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.tracked.values().map(|t| &t.position)
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.tracked.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Positions holding a slot in `category`, closing ones included.
    pub fn open_count(&self, category: Category) -> usize {
        self.tracked
            .values()
            .filter(|t| t.position.category == category)
            .count()
    }

    pub fn floating_total(&self) -> f64 {
        self.tracked.values().map(|t| t.position.floating_pnl).sum()
    }

    /// Re-price every position at the exit side of `tick`; returns the
    /// total floating P/L.
    pub fn mark(&mut self, tick: &Tick) -> f64 {
        for t in self.tracked.values_mut() {
            let p = &mut t.position;
            let price = tick.exit_price(p.direction);
            t.last_price = price;
            p.floating_pnl = self
                .instrument
                .pnl(p.direction, p.entry_price, price, p.volume);
        }
        self.floating_total()
    }

    /// Stop-loss, take-profit and trailing checks for one tick.
    ///
    /// `atr` is the latest defined ATR; trailing is skipped without it.
    pub fn check_tick_exits(&mut self, tick: &Tick, atr: Option<f64>) -> TickOutcome {
        let mut out = TickOutcome::default();
        for t in self.tracked.values_mut() {
            if !t.position.is_open() {
                continue;
            }
            let dir = t.position.direction;
            let price = tick.exit_price(dir);
            t.last_price = price;

            let sl = t.position.stop_loss;
            let stop_hit = match dir {
                Direction::Long => price <= sl,
                Direction::Short => price >= sl,
                Direction::Neutral => false,
            };
            if stop_hit {
                let reason = if t.position.stop_adjustments > 0 {
                    ExitReason::TrailingStop
                } else {
                    ExitReason::StopLoss
                };
                debug!(ticket = %t.position.ticket, price, sl, "stop hit");
                out.exits.push(t.begin_close(reason));
                continue;
            }

            let tp = t.position.take_profit;
            let target_hit = tp > 0.0
                && match dir {
                    Direction::Long => price >= tp,
                    Direction::Short => price <= tp,
                    Direction::Neutral => false,
                };
            if target_hit {
                debug!(ticket = %t.position.ticket, price, tp, "target hit");
                out.exits.push(t.begin_close(ExitReason::TakeProfit));
                continue;
            }

            let Some(atr) = atr.filter(|a| a.is_finite() && *a > 0.0) else {
                continue;
            };
            let distance = atr * t.position.strategy.atr_trailing_multiplier;
            if let Some(level) = t.ratchet.propose(price - dir.sign() * distance) {
                out.stop_changes.push(StopChange {
                    ticket: t.position.ticket,
                    from: sl,
                    to: level,
                });
                t.position.stop_loss = level;
                t.position.stop_adjustments += 1;
            }
        }
        out
    }

    /// Exit checks that only run when a candle closes.
    pub fn check_candle_exits(&mut self, verdicts: &CandleVerdicts) -> Vec<ExitOrder> {
        let mut exits = Vec::new();
        for t in self.tracked.values_mut() {
            if !t.position.is_open() {
                continue;
            }
            let opposite = t.position.direction.opposite();
            let ctx = &t.position.strategy;

            let reason = if ctx.use_signal_change && verdicts.confirms(opposite) {
                Some(ExitReason::SignalChange)
            } else if ctx.use_pattern_reversal
                && verdicts.strategy_directions.get(&ctx.source_id) == Some(&opposite)
            {
                Some(ExitReason::PatternReversal)
            } else {
                match verdicts.close_candle_limit {
                    Some(limit)
                        if t.position.category == Category::Candle
                            && t.position.floating_pnl >= limit =>
                    {
                        Some(ExitReason::CandleProfitLimit)
                    }
                    _ => None,
                }
            };
            if let Some(reason) = reason {
                exits.push(t.begin_close(reason));
            }
        }
        exits
    }

    /// Open positions currently in profit.
    pub fn profitable_open(&self) -> Vec<Ticket> {
        self.tracked
            .values()
            .filter(|t| t.position.is_open() && t.position.floating_pnl > 0.0)
            .map(|t| t.position.ticket)
            .collect()
    }

    /// Mark an open position as closing for `reason`. `None` when the ticket
    /// is unknown or already closing.
    pub fn request_close(&mut self, ticket: Ticket, reason: ExitReason) -> Option<ExitOrder> {
        let t = self.tracked.get_mut(&ticket)?;
        if !t.position.is_open() {
            return None;
        }
        Some(t.begin_close(reason))
    }

    /// The venue could not close the position; it becomes eligible for exit
    /// checks again.
    pub fn revert_to_open(&mut self, ticket: Ticket) -> bool {
        match self.tracked.get_mut(&ticket) {
            Some(t) if t.position.state == PositionState::Closing => {
                t.position.state = PositionState::Open;
                t.exit_reason = None;
                true
            }
            _ => false,
        }
    }

    /// Move a position to the ledger.
    ///
    /// `venue_pnl` is the venue's gross profit for the trade. Without it the
    /// last floating P/L is used and the trade is flagged unreconciled.
    /// Commission is always deducted here.
    pub fn settle(
        &mut self,
        ticket: Ticket,
        exit_price: Option<f64>,
        venue_pnl: Option<f64>,
        closed_at: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let Tracked {
            mut position,
            last_price,
            exit_reason,
            ..
        } = self.tracked.remove(&ticket)?;

        let exit_price = exit_price.filter(|p| p.is_finite()).unwrap_or(last_price);
        let (gross_pnl, reconciled) = match venue_pnl.filter(|p| p.is_finite()) {
            Some(pnl) => (pnl, true),
            None => (position.floating_pnl, false),
        };
        let commission = self.instrument.commission(position.volume);
        position.floating_pnl = 0.0;

        let trade = ClosedTrade {
            position,
            exit_price,
            exit_reason: exit_reason.unwrap_or(ExitReason::External),
            gross_pnl,
            commission,
            realized_pnl: gross_pnl - commission,
            closed_at,
            reconciled,
        };
        info!(
            ticket = %trade.position.ticket,
            reason = %trade.exit_reason,
            exit = trade.exit_price,
            pnl = trade.realized_pnl,
            reconciled = trade.reconciled,
            "position closed"
        );
        self.ledger.push(trade.clone());
        Some(trade)
    }

    pub fn ledger(&self) -> &[ClosedTrade] {
        &self.ledger
    }
}
