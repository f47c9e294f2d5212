//! Account balance and equity bookkeeping.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Process-wide account figures.
///
/// `balance` changes only when a trade settles. `equity` is
/// `balance + floating P/L` and is refreshed on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub equity: f64,
    pub daily_start_balance: f64,
    pub current_date: Option<NaiveDate>,
}

impl AccountState {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            equity: balance,
            daily_start_balance: balance,
            current_date: None,
        }
    }

    /// Move to `date` if it differs from the current day. Returns true on a change.
    pub fn roll_day(&mut self, date: NaiveDate) -> bool {
        if self.current_date == Some(date) {
            return false;
        }
        let first = self.current_date.is_none();
        self.current_date = Some(date);
        self.daily_start_balance = self.balance;
        !first
    }

    /// Realized profit since the start of the current day.
    pub fn daily_profit(&self) -> f64 {
        self.balance - self.daily_start_balance
    }

    pub fn mark_to_market(&mut self, floating: f64) {
        self.equity = self.balance + floating;
    }

    /// Apply a settled trade. Callers re-mark equity from the remaining positions.
    pub fn settle(&mut self, realized_pnl: f64) {
        self.balance += realized_pnl;
    }
}
