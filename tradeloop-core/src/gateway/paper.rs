//! In-memory paper venue.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    AccountSnapshot, CloseFill, ExecutionError, ExecutionGateway, FillRecord, OpenFill,
    OpenRequest, PositionSnapshot,
};
use crate::config::InstrumentConfig;
use crate::domain::{Ticket, Tick};

#[derive(Debug)]
struct Book {
    quote: Option<Tick>,
    next_ticket: u64,
    open: BTreeMap<Ticket, PositionSnapshot>,
    history: Vec<FillRecord>,
    balance: f64,
    faults: VecDeque<ExecutionError>,
    outage: bool,
    withhold_profit: bool,
}

impl Book {
    fn take_fault(&mut self) -> Result<(), ExecutionError> {
        if self.outage {
            return Err(ExecutionError::Unavailable("venue offline".into()));
        }
        match self.faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn quote(&self) -> Result<&Tick, ExecutionError> {
        self.quote
            .as_ref()
            .ok_or_else(|| ExecutionError::Rejected("no quote".into()))
    }
}

/// Venue simulator fed by [`PaperGateway::update_quote`].
///
/// Longs fill at ask and shorts at bid; closes fill on the opposite side.
/// Reported profit is gross, before commission.
#[derive(Debug)]
pub struct PaperGateway {
    instrument: InstrumentConfig,
    latency: Duration,
    book: Mutex<Book>,
}

impl PaperGateway {
    pub fn new(instrument: InstrumentConfig, balance: f64) -> Self {
        Self {
            instrument,
            latency: Duration::ZERO,
            book: Mutex::new(Book {
                quote: None,
                next_ticket: 1,
                open: BTreeMap::new(),
                history: Vec::new(),
                balance,
                faults: VecDeque::new(),
                outage: false,
                withhold_profit: false,
            }),
        }
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn update_quote(&self, tick: &Tick) {
        self.book().quote = Some(tick.clone());
    }

    /// Fail the next call with `err`. Faults queue up in order.
    pub fn inject_fault(&self, err: ExecutionError) {
        self.book().faults.push_back(err);
    }

    /// While set, every call fails with `Unavailable`.
    pub fn set_outage(&self, outage: bool) {
        self.book().outage = outage;
    }

    /// While set, closes and history report no profit.
    pub fn withhold_profit(&self, withhold: bool) {
        self.book().withhold_profit = withhold;
    }

    /// Close a position on the venue side without the engine asking, as a
    /// broker-side stop would.
    pub fn settle_externally(&self, ticket: Ticket, at: DateTime<Utc>) -> Option<FillRecord> {
        let mut book = self.book();
        let quote = book.quote.clone()?;
        let pos = book.open.remove(&ticket)?;
        let price = quote.exit_price(pos.direction);
        let pnl = self
            .instrument
            .pnl(pos.direction, pos.entry_price, price, pos.volume);
        let record = FillRecord {
            ticket,
            exit_price: price,
            realized_pnl: pnl,
            closed_at: at,
        };
        book.balance += pnl - self.instrument.commission(pos.volume);
        book.history.push(record.clone());
        Some(record)
    }

    pub fn open_tickets(&self) -> Vec<Ticket> {
        self.book().open.keys().copied().collect()
    }

    pub fn history(&self) -> Vec<FillRecord> {
        self.book().history.clone()
    }

    pub fn balance(&self) -> f64 {
        self.book().balance
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn open_position(&self, request: &OpenRequest) -> Result<OpenFill, ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        if !(request.volume.is_finite() && request.volume > 0.0) {
            return Err(ExecutionError::Rejected(format!(
                "invalid volume {}",
                request.volume
            )));
        }
        let quote = book.quote()?;
        if quote.symbol != request.symbol {
            return Err(ExecutionError::Rejected(format!(
                "unknown symbol {}",
                request.symbol
            )));
        }
        let fill_price = quote.entry_price(request.direction);
        let ticket = Ticket(book.next_ticket);
        book.next_ticket += 1;
        book.open.insert(
            ticket,
            PositionSnapshot {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                volume: request.volume,
                entry_price: fill_price,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
            },
        );
        Ok(OpenFill { ticket, fill_price })
    }

    async fn close_position(&self, ticket: Ticket) -> Result<CloseFill, ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        let quote = book.quote()?.clone();
        let pos = book
            .open
            .remove(&ticket)
            .ok_or_else(|| ExecutionError::Rejected(format!("unknown ticket {ticket}")))?;
        let fill_price = quote.exit_price(pos.direction);
        let pnl = self
            .instrument
            .pnl(pos.direction, pos.entry_price, fill_price, pos.volume);
        book.balance += pnl - self.instrument.commission(pos.volume);
        book.history.push(FillRecord {
            ticket,
            exit_price: fill_price,
            realized_pnl: pnl,
            closed_at: quote.timestamp,
        });
        let realized_pnl = (!book.withhold_profit).then_some(pnl);
        Ok(CloseFill {
            fill_price,
            realized_pnl,
        })
    }

    async fn modify_stop_loss(&self, ticket: Ticket, stop_loss: f64) -> Result<(), ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        let pos = book
            .open
            .get_mut(&ticket)
            .ok_or_else(|| ExecutionError::Rejected(format!("unknown ticket {ticket}")))?;
        pos.stop_loss = stop_loss;
        Ok(())
    }

    async fn query_open_positions(&self) -> Result<Vec<PositionSnapshot>, ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        Ok(book.open.values().cloned().collect())
    }

    async fn query_account(&self) -> Result<AccountSnapshot, ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        let floating: f64 = match book.quote.as_ref() {
            Some(q) => book
                .open
                .values()
                .map(|p| {
                    self.instrument
                        .pnl(p.direction, p.entry_price, q.exit_price(p.direction), p.volume)
                })
                .sum(),
            None => 0.0,
        };
        Ok(AccountSnapshot {
            balance: book.balance,
            equity: book.balance + floating,
        })
    }

    async fn fetch_fill_history(
        &self,
        tickets: &[Ticket],
    ) -> Result<Vec<FillRecord>, ExecutionError> {
        self.delay().await;
        let mut book = self.book();
        book.take_fault()?;
        if book.withhold_profit {
            return Ok(Vec::new());
        }
        Ok(book
            .history
            .iter()
            .filter(|r| tickets.contains(&r.ticket))
            .cloned()
            .collect())
    }
}
