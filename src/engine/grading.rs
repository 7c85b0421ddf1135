use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{FeeError, Result};
use crate::events::Event;
use crate::model::{BeltGrading, StudentFee};
use crate::pricing;
use crate::store::FeeStore;
use crate::types::{BeltLevel, FeeType, StudentId};

use super::fees::CreateFeeParams;
use super::FeeEngine;

/// result of a belt grading: the promotion record plus the fee it billed,
/// when a grading price exists for the new belt
#[derive(Debug, Clone)]
pub struct GradingOutcome {
    pub grading: BeltGrading,
    pub fee: Option<StudentFee>,
}

impl<S: FeeStore> FeeEngine<S> {
    /// record a belt promotion and bill its grading fee
    ///
    /// `from_belt` must match the student's current belt; a mismatch means
    /// the caller is working from stale grading state and nothing is
    /// written. missing pricing for the new belt is a warning, not a
    /// failure: the belt still updates, the fee is just not billed.
    pub fn record_belt_grading(
        &mut self,
        student_id: StudentId,
        from_belt: BeltLevel,
        to_belt: BeltLevel,
        graded_on: NaiveDate,
        actor: &str,
        time: &SafeTimeProvider,
    ) -> Result<GradingOutcome> {
        let student = self
            .store
            .student(student_id)?
            .ok_or(FeeError::StudentNotFound { id: student_id })?;

        if student.current_belt != from_belt {
            return Err(FeeError::BeltMismatch {
                current: student.current_belt,
                reported: from_belt,
            });
        }

        self.store.set_student_belt(student_id, to_belt)?;

        let mut grading = BeltGrading {
            id: Uuid::new_v4(),
            student_id,
            from_belt,
            to_belt,
            graded_on,
            student_fee_id: None,
            recorded_by: actor.to_string(),
        };
        self.store.insert_grading(grading.clone())?;

        let fee = match pricing::active_price(&self.store, FeeType::Grading, Some(to_belt))? {
            Some(config) => {
                let fee = self.create_student_fee(
                    CreateFeeParams {
                        student_id,
                        fee_type: FeeType::Grading,
                        amount: config.amount,
                        due_date: graded_on,
                        period: None,
                        belt_grading_id: Some(grading.id),
                        notes: None,
                    },
                    time,
                )?;
                self.store.set_grading_fee(grading.id, fee.id)?;
                grading.student_fee_id = Some(fee.id);
                Some(fee)
            }
            None => {
                warn!(
                    student_id = %student_id,
                    "no grading price configured for {} belt, fee skipped", to_belt
                );
                None
            }
        };

        self.events.emit(Event::GradingRecorded {
            grading_id: grading.id,
            student_id,
            from_belt,
            to_belt,
            fee_id: grading.student_fee_id,
            graded_on,
        });

        Ok(GradingOutcome { grading, fee })
    }

    pub fn belt_gradings(&self, student_id: StudentId) -> Result<Vec<BeltGrading>> {
        self.store.gradings_for_student(student_id)
    }
}
