use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::warn;

use crate::calendar;
use crate::errors::{FeeError, Result};
use crate::events::Event;
use crate::model::{PaymentPreference, StudentFee};
use crate::pricing;
use crate::store::FeeStore;
use crate::types::{FeeType, PaymentCadence, StudentId};

use super::fees::CreateFeeParams;
use super::FeeEngine;

/// fees created at enrollment; either may be skipped when its price is
/// not configured
#[derive(Debug, Clone)]
pub struct InitializedFees {
    pub preference: PaymentPreference,
    pub registration_fee: Option<StudentFee>,
    pub first_recurring_fee: Option<StudentFee>,
}

/// result of a plan switch
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    /// false when the student was already on the requested plan
    pub changed: bool,
    /// first fee of the new plan; `None` when skipped (already existing
    /// period, or unpriced)
    pub fee: Option<StudentFee>,
}

impl<S: FeeStore> FeeEngine<S> {
    /// set a new student's billing plan and raise their first invoices
    ///
    /// the recurring due date is computed from today against the enrollment
    /// day, so a back-dated enrollment does not make the first invoice
    /// spuriously overdue. unpriced fees are skipped with a warning, the
    /// rest of the initialization proceeds.
    pub fn initialize_student_fees(
        &mut self,
        student_id: StudentId,
        cadence: PaymentCadence,
        enrollment_date: NaiveDate,
        time: &SafeTimeProvider,
    ) -> Result<InitializedFees> {
        let student = self
            .store
            .student(student_id)?
            .ok_or(FeeError::StudentNotFound { id: student_id })?;
        if !student.is_active {
            return Err(FeeError::StudentInactive { id: student_id });
        }

        let preference = PaymentPreference {
            student_id,
            cadence,
            started_from: enrollment_date,
        };
        self.store.upsert_preference(preference.clone())?;
        self.events.emit(Event::PreferenceInitialized {
            student_id,
            cadence,
            started_from: enrollment_date,
        });

        let today = time.now().date_naive();

        let already_registered = self
            .store
            .fees_for_student(student_id)?
            .iter()
            .any(|f| f.fee_type == FeeType::Registration);

        // registration is collected at the desk: due today, never back-dated
        let registration_fee = if already_registered {
            None
        } else {
            match pricing::active_price(&self.store, FeeType::Registration, None)? {
                Some(config) => self.create_initial_fee(
                    CreateFeeParams {
                        student_id,
                        fee_type: FeeType::Registration,
                        amount: config.amount,
                        due_date: today,
                        period: None,
                        belt_grading_id: None,
                        notes: None,
                    },
                    time,
                ),
                None => {
                    warn!(student_id = %student_id, "no registration price configured, fee skipped");
                    None
                }
            }
        };

        let recurring_type = cadence.fee_type();
        let period = match cadence {
            PaymentCadence::Monthly => {
                let anchor = chrono::Datelike::day(&enrollment_date);
                calendar::monthly_period_for(calendar::monthly_due_date(today, anchor))
            }
            PaymentCadence::Yearly => calendar::yearly_period_from(enrollment_date),
        };
        let first_recurring_fee = match pricing::active_price(&self.store, recurring_type, None)? {
            Some(config) => self.create_initial_fee(
                CreateFeeParams {
                    student_id,
                    fee_type: recurring_type,
                    amount: config.amount,
                    due_date: period.due_date,
                    period: Some(period),
                    belt_grading_id: None,
                    notes: None,
                },
                time,
            ),
            None => {
                warn!(student_id = %student_id, "no {} price configured, fee skipped", recurring_type);
                None
            }
        };

        Ok(InitializedFees {
            preference,
            registration_fee,
            first_recurring_fee,
        })
    }

    /// creation during initialization tolerates an already-existing period,
    /// so retrying a half-finished enrollment is safe
    fn create_initial_fee(
        &mut self,
        params: CreateFeeParams,
        time: &SafeTimeProvider,
    ) -> Option<StudentFee> {
        let student_id = params.student_id;
        match self.create_student_fee(params, time) {
            Ok(fee) => Some(fee),
            Err(err @ FeeError::DuplicatePeriod { .. }) => {
                warn!(student_id = %student_id, %err, "initial fee already exists, skipped");
                None
            }
            Err(err) => {
                warn!(student_id = %student_id, %err, "initial fee skipped");
                None
            }
        }
    }

    /// move a student to a different billing plan
    ///
    /// pending or overdue fees of the old plan stay untouched; switching
    /// never cancels old obligations. the first fee of the new plan is
    /// collected immediately (due on the switch date). retrying the same
    /// switch is a no-op.
    pub fn switch_payment_preference(
        &mut self,
        student_id: StudentId,
        new_cadence: PaymentCadence,
        switch_date: NaiveDate,
        time: &SafeTimeProvider,
    ) -> Result<SwitchOutcome> {
        let student = self
            .store
            .student(student_id)?
            .ok_or(FeeError::StudentNotFound { id: student_id })?;
        if !student.is_active {
            return Err(FeeError::StudentInactive { id: student_id });
        }

        let existing = self.store.preference(student_id)?;
        if let Some(pref) = &existing {
            if pref.cadence == new_cadence {
                return Ok(SwitchOutcome {
                    changed: false,
                    fee: None,
                });
            }
        }

        let period = calendar::switch_period(switch_date, new_cadence);
        let fee_type = new_cadence.fee_type();

        // idempotent retry safety: a fee for the identical computed period
        // means an earlier attempt already got this far
        let identical_exists = self
            .store
            .fees_for_student(student_id)?
            .iter()
            .any(|f| {
                f.fee_type == fee_type
                    && f.period_start == Some(period.start)
                    && f.period_end == Some(period.end)
            });

        let fee = if identical_exists {
            None
        } else {
            match pricing::active_price(&self.store, fee_type, None)? {
                Some(config) => Some(self.create_student_fee(
                    CreateFeeParams {
                        student_id,
                        fee_type,
                        amount: config.amount,
                        due_date: period.due_date,
                        period: Some(period),
                        belt_grading_id: None,
                        notes: None,
                    },
                    time,
                )?),
                None => {
                    warn!(student_id = %student_id, "no {} price configured, switch fee skipped", fee_type);
                    None
                }
            }
        };

        self.store.upsert_preference(PaymentPreference {
            student_id,
            cadence: new_cadence,
            started_from: switch_date,
        })?;

        if let Some(old) = existing {
            self.events.emit(Event::PreferenceSwitched {
                student_id,
                old_cadence: old.cadence,
                new_cadence,
                switch_date,
            });
        } else {
            self.events.emit(Event::PreferenceInitialized {
                student_id,
                cadence: new_cadence,
                started_from: switch_date,
            });
        }

        Ok(SwitchOutcome { changed: true, fee })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::engine::fees::{FeeFilter, PaymentRequest};
    use crate::model::Student;
    use crate::store::MemoryStore;
    use crate::types::{FeeStatus, PaymentMethod};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn time_at(y: i32, m: u32, day: u32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(y, m, day, 8, 0, 0).unwrap(),
        ))
    }

    fn priced_engine() -> (FeeEngine<MemoryStore>, StudentId) {
        let mut engine = FeeEngine::new(MemoryStore::new());
        let student = Student::new("Yuki Nakamura");
        let id = student.id;
        engine.register_student(student).unwrap();

        let time = time_at(2024, 1, 1);
        engine
            .set_fee_configuration(FeeType::Registration, Money::from_major(500), None, "admin", &time)
            .unwrap();
        engine
            .set_fee_configuration(FeeType::Monthly, Money::from_major(1_500), None, "admin", &time)
            .unwrap();
        engine
            .set_fee_configuration(FeeType::Yearly, Money::from_major(15_000), None, "admin", &time)
            .unwrap();
        (engine, id)
    }

    #[test]
    fn test_monthly_enrollment_before_anchor() {
        let (mut engine, student_id) = priced_engine();
        // enrolled Jan 15, today is Jan 10: first due Jan 15
        let time = time_at(2024, 1, 10);
        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        let reg = init.registration_fee.unwrap();
        assert_eq!(reg.due_date, d(2024, 1, 10));
        assert_eq!(reg.status, FeeStatus::Pending);
        assert!(reg.period_start.is_none());

        let first = init.first_recurring_fee.unwrap();
        assert_eq!(first.due_date, d(2024, 1, 15));
        assert_eq!(first.period_start, Some(d(2023, 12, 16)));
        assert_eq!(first.period_end, Some(d(2024, 1, 14)));
        assert_eq!(first.status, FeeStatus::Pending);
    }

    #[test]
    fn test_monthly_enrollment_after_anchor() {
        let (mut engine, student_id) = priced_engine();
        // today Jan 20 is past the enrollment day: first due Feb 15
        let time = time_at(2024, 1, 20);
        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        let first = init.first_recurring_fee.unwrap();
        assert_eq!(first.due_date, d(2024, 2, 15));
        assert_eq!(first.status, FeeStatus::Pending);
    }

    #[test]
    fn test_backdated_enrollment_not_overdue() {
        let (mut engine, student_id) = priced_engine();
        // enrollment back-dated six months; invoice still dues forward
        let time = time_at(2024, 7, 20);
        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        let first = init.first_recurring_fee.unwrap();
        assert_eq!(first.due_date, d(2024, 8, 15));
        assert_eq!(first.status, FeeStatus::Pending);
    }

    #[test]
    fn test_yearly_enrollment_period_aligned_to_enrollment() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 1, 10);
        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Yearly, d(2024, 1, 10), &time)
            .unwrap();

        let first = init.first_recurring_fee.unwrap();
        assert_eq!(first.period_start, Some(d(2024, 1, 10)));
        assert_eq!(first.period_end, Some(d(2025, 1, 10)));
        assert_eq!(first.due_date, d(2024, 12, 10));
    }

    #[test]
    fn test_unpriced_registration_skipped_not_fatal() {
        let mut engine = FeeEngine::new(MemoryStore::new());
        let student = Student::new("Taro Ishida");
        let student_id = student.id;
        engine.register_student(student).unwrap();
        let time = time_at(2024, 1, 10);
        engine
            .set_fee_configuration(FeeType::Monthly, Money::from_major(1_500), None, "admin", &time)
            .unwrap();

        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();
        assert!(init.registration_fee.is_none());
        assert!(init.first_recurring_fee.is_some());
    }

    #[test]
    fn test_initialize_retry_is_safe() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 1, 10);

        engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();
        let retry = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        // recurring fee not duplicated on retry
        assert!(retry.first_recurring_fee.is_none());
        let fees = engine
            .student_fees(student_id, FeeFilter::default(), &time)
            .unwrap();
        assert_eq!(
            fees.iter().filter(|f| f.fee_type == FeeType::Monthly).count(),
            1
        );
    }

    #[test]
    fn test_switch_to_same_plan_is_noop() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 1, 10);
        engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        let outcome = engine
            .switch_payment_preference(student_id, PaymentCadence::Monthly, d(2024, 3, 1), &time)
            .unwrap();
        assert!(!outcome.changed);
        assert!(outcome.fee.is_none());
    }

    #[test]
    fn test_switch_creates_immediate_fee_and_keeps_old_obligations() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 1, 10);
        let init = engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();
        let old_fee = init.first_recurring_fee.unwrap();

        let switch_time = time_at(2024, 3, 10);
        let outcome = engine
            .switch_payment_preference(student_id, PaymentCadence::Yearly, d(2024, 3, 10), &switch_time)
            .unwrap();
        assert!(outcome.changed);

        let fee = outcome.fee.unwrap();
        assert_eq!(fee.fee_type, FeeType::Yearly);
        assert_eq!(fee.due_date, d(2024, 3, 10));
        assert_eq!(fee.period_start, Some(d(2024, 3, 10)));
        assert_eq!(fee.period_end, Some(d(2025, 3, 9)));

        // the old monthly fee is still there, now overdue, untouched
        let fees = engine
            .student_fees(student_id, FeeFilter::default(), &switch_time)
            .unwrap();
        let old = fees.iter().find(|f| f.id == old_fee.id).unwrap();
        assert_eq!(old.status, FeeStatus::Overdue);

        let pref = engine.payment_preference(student_id).unwrap().unwrap();
        assert_eq!(pref.cadence, PaymentCadence::Yearly);
        assert_eq!(pref.started_from, d(2024, 3, 10));
    }

    #[test]
    fn test_switch_retry_skips_duplicate_fee() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 1, 10);
        engine
            .initialize_student_fees(student_id, PaymentCadence::Monthly, d(2024, 1, 15), &time)
            .unwrap();

        let switch_time = time_at(2024, 3, 10);
        engine
            .switch_payment_preference(student_id, PaymentCadence::Yearly, d(2024, 3, 10), &switch_time)
            .unwrap();
        // flip back and forth to retry the same switch
        engine
            .switch_payment_preference(student_id, PaymentCadence::Monthly, d(2024, 3, 10), &switch_time)
            .unwrap();
        let retry = engine
            .switch_payment_preference(student_id, PaymentCadence::Yearly, d(2024, 3, 10), &switch_time)
            .unwrap();

        assert!(retry.changed);
        assert!(retry.fee.is_none());

        let fees = engine
            .student_fees(student_id, FeeFilter::default(), &switch_time)
            .unwrap();
        assert_eq!(
            fees.iter().filter(|f| f.fee_type == FeeType::Yearly).count(),
            1
        );
    }

    #[test]
    fn test_switch_full_payment_renews_monthly_from_switch_anchor() {
        let (mut engine, student_id) = priced_engine();
        let time = time_at(2024, 3, 10);
        engine
            .initialize_student_fees(student_id, PaymentCadence::Yearly, d(2024, 1, 10), &time)
            .unwrap();

        let outcome = engine
            .switch_payment_preference(student_id, PaymentCadence::Monthly, d(2024, 3, 10), &time)
            .unwrap();
        let fee = outcome.fee.unwrap();

        let paid = engine
            .record_payment(
                PaymentRequest {
                    fee_id: fee.id,
                    amount: Money::from_major(1_500),
                    method: PaymentMethod::Card,
                    receipt_number: None,
                    notes: None,
                    recorded_by: "admin".to_string(),
                },
                &time,
            )
            .unwrap();

        // next month anchors on the switch day
        let next = paid.next_fee.unwrap();
        assert_eq!(next.due_date, d(2024, 4, 10));
        assert_eq!(next.period_start, Some(d(2024, 4, 10)));
    }
}
