//! Stop ratchet.
//!
//! Stops may tighten, never loosen, even when ATR expands after a
//! favorable move. Longs only move the stop up, shorts only move it down.

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    level: Option<f64>,
    direction: Direction,
    enabled: bool,
}

impl RatchetState {
    /// Ratchet anchored at the position's initial stop.
    pub fn anchored(direction: Direction, initial_stop: f64) -> Self {
        Self {
            level: Some(initial_stop),
            direction,
            enabled: true,
        }
    }

    /// Ratchet for a position without trailing; `propose` never moves it.
    pub fn disabled(direction: Direction) -> Self {
        Self {
            level: None,
            direction,
            enabled: false,
        }
    }

    /// Offer a new stop level.
    ///
    /// Returns `Some(level)` only when the proposal is strictly tighter than
    /// the current level; the ratchet then holds the new level.
    pub fn propose(&mut self, proposed: f64) -> Option<f64> {
        if !self.enabled || !proposed.is_finite() {
            return None;
        }
        let tighter = match (self.level, self.direction) {
            (None, _) => true,
            (Some(current), Direction::Long) => proposed > current,
            (Some(current), Direction::Short) => proposed < current,
            (Some(_), Direction::Neutral) => false,
        };
        if tighter {
            self.level = Some(proposed);
            Some(proposed)
        } else {
            None
        }
    }

    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
