// Time-gated action driven by caller-supplied timestamps.
use std::time::Duration;

use crate::core::record::Timestamp;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeriodicAction {
    period: Duration,
    next_due: Option<Timestamp>,
}

impl PeriodicAction {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns true when the action is due at `now`, and schedules the next run.
    /// The first call is always due.
    pub fn try_action(&mut self, now: Timestamp) -> bool {
        if let Some(next_due) = self.next_due
            && now < next_due
        {
            return false;
        }
        self.next_due = Some(now.saturating_add(self.period));
        true
    }
}
