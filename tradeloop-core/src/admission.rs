//! Slot-based admission control.
//!
//! A category is at capacity when its open positions plus its pending
//! (submitted, unconfirmed) opens reach the configured maximum. Each
//! category may admit at most one trade per candle cycle.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::SlotConfig;
use crate::domain::{Category, RequestId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AdmissionRejection {
    #[error("{category} slots full ({occupied}/{max})")]
    CategoryFull {
        category: Category,
        occupied: usize,
        max: usize,
    },
    #[error("{0} already admitted a trade this candle")]
    AlreadyAdmittedThisCycle(Category),
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: SlotConfig,
    cycle: u64,
    admitted: HashSet<Category>,
    pending: BTreeMap<RequestId, Category>,
    next_request: u64,
}

impl AdmissionController {
    pub fn new(slots: SlotConfig) -> Self {
        Self {
            slots,
            cycle: 0,
            admitted: HashSet::new(),
            pending: BTreeMap::new(),
            next_request: 1,
        }
    }

    /// Start a new candle cycle; clears the per-cycle admissions.
    pub fn begin_cycle(&mut self) {
        self.cycle += 1;
        self.admitted.clear();
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn pending_count(&self, category: Category) -> usize {
        self.pending.values().filter(|c| **c == category).count()
    }

    /// Check without reserving.
    pub fn check(&self, category: Category, open: usize) -> Result<(), AdmissionRejection> {
        if self.admitted.contains(&category) {
            return Err(AdmissionRejection::AlreadyAdmittedThisCycle(category));
        }
        let max = self.slots.max(category);
        let occupied = open + self.pending_count(category);
        if occupied >= max {
            return Err(AdmissionRejection::CategoryFull {
                category,
                occupied,
                max,
            });
        }
        Ok(())
    }

    /// Reserve a slot for a new open request.
    ///
    /// `open` is the number of positions of `category` currently held.
    pub fn try_admit(
        &mut self,
        category: Category,
        open: usize,
    ) -> Result<RequestId, AdmissionRejection> {
        self.check(category, open)?;
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.admitted.insert(category);
        self.pending.insert(id, category);
        Ok(id)
    }

    /// The venue opened the position; the slot is now held by it.
    pub fn confirm(&mut self, id: RequestId) -> Option<Category> {
        self.pending.remove(&id)
    }

    /// The open failed; release the reservation. The per-cycle mark stays.
    pub fn rollback(&mut self, id: RequestId) -> Option<Category> {
        self.pending.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(forex: usize) -> AdmissionController {
        AdmissionController::new(SlotConfig {
            forex,
            candle: 1,
            custom: 0,
        })
    }

    #[test]
    fn one_admission_per_category_per_cycle() {
        let mut ac = controller(3);
        ac.begin_cycle();
        assert!(ac.try_admit(Category::Forex, 0).is_ok());
        assert_eq!(
            ac.try_admit(Category::Forex, 0),
            Err(AdmissionRejection::AlreadyAdmittedThisCycle(Category::Forex))
        );
        assert!(ac.try_admit(Category::Candle, 0).is_ok());
        ac.begin_cycle();
        assert!(ac.try_admit(Category::Forex, 0).is_ok());
    }

    #[test]
    fn pending_reservations_occupy_slots() {
        let mut ac = controller(1);
        ac.begin_cycle();
        let id = ac.try_admit(Category::Forex, 0).unwrap();
        ac.begin_cycle();
        assert!(matches!(
            ac.try_admit(Category::Forex, 0),
            Err(AdmissionRejection::CategoryFull { occupied: 1, max: 1, .. })
        ));
        assert_eq!(ac.rollback(id), Some(Category::Forex));
        assert!(ac.try_admit(Category::Forex, 0).is_ok());
    }

    #[test]
    fn confirmed_positions_are_counted_by_caller() {
        let mut ac = controller(2);
        ac.begin_cycle();
        let id = ac.try_admit(Category::Forex, 1).unwrap();
        assert_eq!(ac.confirm(id), Some(Category::Forex));
        ac.begin_cycle();
        assert!(matches!(
            ac.try_admit(Category::Forex, 2),
            Err(AdmissionRejection::CategoryFull { .. })
        ));
    }

    #[test]
    fn zero_slots_disable_a_category() {
        let mut ac = controller(1);
        ac.begin_cycle();
        assert!(ac.try_admit(Category::Custom, 0).is_err());
    }
}
