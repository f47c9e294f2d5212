//! Engine output records and the sinks that receive them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::admission::AdmissionRejection;
use crate::confirm::Confirmation;
use crate::domain::{Candle, ClosedTrade, GapMarker, Position, RequestId, Signal, Ticket};
use crate::gateway::{ExecutionError, OpenRequest};
use crate::risk::RiskDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLimit {
    DailyProfit,
    EquityFloor,
}

/// Everything the engine reports to presentation and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    CandleClosed {
        index: usize,
        candle: Candle,
    },
    GapDetected {
        gap: GapMarker,
    },
    SignalDetected {
        signal: Signal,
    },
    SignalConfirmed {
        signal: Signal,
        confirmation: Confirmation,
    },
    SignalRejected {
        signal: Signal,
        confirmation: Confirmation,
    },
    AdmissionRejected {
        source_id: String,
        reason: AdmissionRejection,
    },
    OrderSubmitted {
        request_id: RequestId,
        request: OpenRequest,
        decision: RiskDecision,
    },
    OrderRejected {
        request_id: RequestId,
        source_id: String,
        error: ExecutionError,
    },
    TradeOpened {
        position: Position,
    },
    StopAdjusted {
        ticket: Ticket,
        from: f64,
        to: f64,
    },
    TradeClosed {
        trade: ClosedTrade,
    },
    /// Settled by reconciliation after the position vanished from the venue.
    ExternallyClosed {
        trade: ClosedTrade,
    },
    RiskLimitTriggered {
        limit: RiskLimit,
        value: f64,
        threshold: f64,
    },
    /// Close retries exhausted. The position is open again.
    CloseFailed {
        ticket: Ticket,
        attempts: u32,
        error: ExecutionError,
    },
}

impl EngineEvent {
    /// Events that must reach an operator, not only the log.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            EngineEvent::RiskLimitTriggered { .. } | EngineEvent::CloseFailed { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::CandleClosed { .. } => "candle_closed",
            EngineEvent::GapDetected { .. } => "gap_detected",
            EngineEvent::SignalDetected { .. } => "signal_detected",
            EngineEvent::SignalConfirmed { .. } => "signal_confirmed",
            EngineEvent::SignalRejected { .. } => "signal_rejected",
            EngineEvent::AdmissionRejected { .. } => "admission_rejected",
            EngineEvent::OrderSubmitted { .. } => "order_submitted",
            EngineEvent::OrderRejected { .. } => "order_rejected",
            EngineEvent::TradeOpened { .. } => "trade_opened",
            EngineEvent::StopAdjusted { .. } => "stop_adjusted",
            EngineEvent::TradeClosed { .. } => "trade_closed",
            EngineEvent::ExternallyClosed { .. } => "externally_closed",
            EngineEvent::RiskLimitTriggered { .. } => "risk_limit_triggered",
            EngineEvent::CloseFailed { .. } => "close_failed",
        }
    }
}

/// Receiver of engine events. Implementations must not fail the caller.
pub trait EventSink {
    fn emit(&mut self, at: DateTime<Utc>, event: &EngineEvent);
}

/// Collects events in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pub events: Vec<EngineEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for VecSink {
    fn emit(&mut self, _at: DateTime<Utc>, event: &EngineEvent) {
        self.events.push(event.clone());
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _at: DateTime<Utc>, _event: &EngineEvent) {}
}

impl<S: EventSink> EventSink for Option<S> {
    fn emit(&mut self, at: DateTime<Utc>, event: &EngineEvent) {
        if let Some(sink) = self {
            sink.emit(at, event);
        }
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, at: DateTime<Utc>, event: &EngineEvent) {
        self.0.emit(at, event);
        self.1.emit(at, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = EngineEvent::AdmissionRejected {
            source_id: "hammer".into(),
            reason: AdmissionRejection::AlreadyAdmittedThisCycle(Category::Candle),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "admission_rejected");
        assert_eq!(json["source_id"], "hammer");
        assert_eq!(event.kind(), "admission_rejected");
        assert!(!event.is_alert());
    }

    #[test]
    fn alerts() {
        let event = EngineEvent::CloseFailed {
            ticket: Ticket(7),
            attempts: 3,
            error: ExecutionError::Unavailable("timeout".into()),
        };
        assert!(event.is_alert());
        let event = EngineEvent::RiskLimitTriggered {
            limit: RiskLimit::DailyProfit,
            value: 205.0,
            threshold: 200.0,
        };
        assert!(event.is_alert());
    }

    #[test]
    fn tee_and_option_forward() {
        let mut sink = (VecSink::new(), Some(VecSink::new()));
        let event = EngineEvent::GapDetected {
            gap: GapMarker {
                after_index: 3,
                from: Utc::now(),
                to: Utc::now(),
                missing: 2,
            },
        };
        sink.emit(Utc::now(), &event);
        assert_eq!(sink.0.count("gap_detected"), 1);
        assert_eq!(sink.1.as_ref().map(|s| s.events.len()), Some(1));
    }
}
