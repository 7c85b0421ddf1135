use chrono::NaiveDate;
use std::sync::Mutex;

use crate::model::StudentFee;
use crate::types::{FeeId, FeeStatus};

/// derive the correct status for a fee as of `today`
///
/// paid is sticky: a stored paid status is returned as-is and a fully
/// covered balance resolves to paid regardless of dates. a fee due today
/// is still pending; overdue starts the day after.
pub fn resolve(fee: &StudentFee, today: NaiveDate) -> FeeStatus {
    if fee.status.is_terminal() {
        return FeeStatus::Paid;
    }
    if fee.paid_amount >= fee.amount {
        return FeeStatus::Paid;
    }
    if fee.due_date >= today {
        FeeStatus::Pending
    } else {
        FeeStatus::Overdue
    }
}

/// a stale stored status spotted during a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCorrection {
    pub fee_id: FeeId,
    pub from: FeeStatus,
    pub to: FeeStatus,
}

/// queue of corrections detected on the read path
///
/// reads enqueue and return corrected values immediately; the engine drains
/// the queue afterwards and writes each correction best-effort. a dropped
/// write is harmless, the next read recomputes from scratch.
#[derive(Debug, Default)]
pub struct CorrectionQueue {
    pending: Mutex<Vec<StatusCorrection>>,
}

impl CorrectionQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// record a correction if the transition is legal; illegal transitions
    /// (anything out of paid) are discarded
    pub fn enqueue(&self, fee_id: FeeId, from: FeeStatus, to: FeeStatus) {
        if from == to || !from.can_transition_to(to) {
            return;
        }
        let mut pending = self.pending.lock().expect("correction queue poisoned");
        pending.push(StatusCorrection { fee_id, from, to });
    }

    /// take everything queued so far
    pub fn drain(&self) -> Vec<StatusCorrection> {
        let mut pending = self.pending.lock().expect("correction queue poisoned");
        std::mem::take(&mut *pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .expect("correction queue poisoned")
            .is_empty()
    }
}
