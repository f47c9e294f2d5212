//! Execution venue capability.
//!
//! The engine never calls the venue directly; the decision loop runs these
//! calls in spawned tasks and feeds the results back as execution reports.

mod paper;

pub use paper::PaperGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, Ticket};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ExecutionError {
    /// The venue declined the order. Not retried.
    #[error("rejected by venue: {0}")]
    Rejected(String),
    /// The venue could not be reached. Retried with backoff.
    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Free-form order comment; the engine uses the strategy id.
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenFill {
    pub ticket: Ticket,
    pub fill_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseFill {
    pub fill_price: f64,
    /// Gross profit as reported by the venue, if it reported one.
    pub realized_pnl: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub equity: f64,
}

/// Settlement data for a closed ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub ticket: Ticket,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub closed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn open_position(&self, request: &OpenRequest) -> Result<OpenFill, ExecutionError>;

    async fn close_position(&self, ticket: Ticket) -> Result<CloseFill, ExecutionError>;

    async fn modify_stop_loss(&self, ticket: Ticket, stop_loss: f64) -> Result<(), ExecutionError>;

    async fn query_open_positions(&self) -> Result<Vec<PositionSnapshot>, ExecutionError>;

    async fn query_account(&self) -> Result<AccountSnapshot, ExecutionError>;

    /// Closed-trade records for the given tickets. Tickets the venue has no
    /// record of are omitted.
    async fn fetch_fill_history(&self, tickets: &[Ticket])
        -> Result<Vec<FillRecord>, ExecutionError>;
}
