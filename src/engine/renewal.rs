use hourglass_rs::SafeTimeProvider;
use tracing::{debug, warn};

use crate::calendar;
use crate::errors::Result;
use crate::events::Event;
use crate::model::StudentFee;
use crate::pricing;
use crate::store::FeeStore;
use crate::types::{FeeType, PaymentCadence, StudentId};

use super::fees::CreateFeeParams;
use super::FeeEngine;

impl<S: FeeStore> FeeEngine<S> {
    /// generate the next yearly fee when the current paid period is within
    /// one month of ending
    ///
    /// monthly plans renew synchronously on full payment; yearly plans renew
    /// here, lazily, as a side effect of listing fees. idempotent under
    /// arbitrary repeated invocation: once the next fee exists, this is a
    /// no-op.
    pub fn ensure_upcoming_yearly_fee(
        &mut self,
        student_id: StudentId,
        time: &SafeTimeProvider,
    ) -> Result<Option<StudentFee>> {
        let preference = match self.store.preference(student_id)? {
            Some(p) if p.cadence == PaymentCadence::Yearly => p,
            _ => return Ok(None),
        };

        let fees = self.store.fees_for_student(student_id)?;

        // most recent paid yearly period
        let current = fees
            .iter()
            .filter(|f| {
                f.fee_type == FeeType::Yearly && f.status.is_terminal() && f.period_end.is_some()
            })
            .max_by_key(|f| f.period_end);
        let current_end = match current.and_then(|f| f.period_end) {
            Some(end) => end,
            None => return Ok(None),
        };

        let today = time.now().date_naive();
        if !calendar::yearly_renewal_open(current_end, today) {
            debug!(
                student_id = %student_id,
                "yearly period ends {}, renewal window not yet open", current_end
            );
            return Ok(None);
        }

        // already generated
        let already = fees.iter().any(|f| {
            f.fee_type == FeeType::Yearly
                && f.period_start.map_or(false, |start| start > current_end)
        });
        if already {
            return Ok(None);
        }

        let amount = match pricing::active_price(&self.store, FeeType::Yearly, None)? {
            Some(config) => config.amount,
            None => {
                warn!(student_id = %student_id, "no yearly price configured, renewal skipped");
                return Ok(None);
            }
        };

        let period = calendar::next_yearly_period(current_end);
        let fee = self.create_student_fee(
            CreateFeeParams {
                student_id: preference.student_id,
                fee_type: FeeType::Yearly,
                amount,
                due_date: period.due_date,
                period: Some(period),
                belt_grading_id: None,
                notes: None,
            },
            time,
        )?;

        self.events.emit(Event::RenewalGenerated {
            fee_id: fee.id,
            student_id,
            fee_type: FeeType::Yearly,
            period_start: period.start,
            period_end: period.end,
            due_date: period.due_date,
        });

        Ok(Some(fee))
    }
}
