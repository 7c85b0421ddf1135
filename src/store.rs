use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::model::{
    BeltGrading, FeeConfigChange, FeeConfiguration, PaymentPreference, PaymentUpdate, Student,
    StudentFee,
};
use crate::types::{BeltLevel, ConfigId, FeeId, FeeStatus, FeeType, GradingId, StudentId};

/// the seam to the relational store: CRUD plus filter queries and one
/// conditional update. implementations are expected to complete or fail
/// fast; nothing here blocks indefinitely.
pub trait FeeStore {
    // students
    fn put_student(&self, student: Student) -> Result<()>;
    fn student(&self, id: StudentId) -> Result<Option<Student>>;
    fn set_student_belt(&self, id: StudentId, belt: BeltLevel) -> Result<()>;

    // payment preferences, single row per student
    fn upsert_preference(&self, preference: PaymentPreference) -> Result<()>;
    fn preference(&self, student_id: StudentId) -> Result<Option<PaymentPreference>>;

    // fee configurations
    fn active_config(
        &self,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
    ) -> Result<Option<FeeConfiguration>>;
    /// insert a new active row, deactivating the prior active row for the
    /// same (fee_type, belt_level) key in the same operation
    fn insert_config(&self, config: FeeConfiguration) -> Result<()>;
    fn append_config_history(&self, change: FeeConfigChange) -> Result<()>;
    fn config_history(
        &self,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
    ) -> Result<Vec<FeeConfigChange>>;

    // student fees
    /// insert a fee row; rows carrying a period are unique on
    /// (student_id, fee_type, period_start, period_end)
    fn insert_fee(&self, fee: StudentFee) -> Result<()>;
    fn fee(&self, id: FeeId) -> Result<Option<StudentFee>>;
    fn fees_for_student(&self, student_id: StudentId) -> Result<Vec<StudentFee>>;
    /// first pending/overdue fee of the given type whose period overlaps the range
    fn overlapping_fee(
        &self,
        student_id: StudentId,
        fee_type: FeeType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<StudentFee>>;
    fn update_status(&self, id: FeeId, status: FeeStatus) -> Result<()>;
    /// compare-and-swap payment application: applies `update` only if the
    /// stored paid_amount still equals `expected_paid`; returns whether it
    /// applied. this is the engine's one hard concurrency guarantee.
    fn apply_payment_if(
        &self,
        id: FeeId,
        expected_paid: Money,
        update: PaymentUpdate,
    ) -> Result<bool>;

    // belt gradings
    fn insert_grading(&self, grading: BeltGrading) -> Result<()>;
    fn set_grading_fee(&self, grading_id: GradingId, fee_id: FeeId) -> Result<()>;
    fn gradings_for_student(&self, student_id: StudentId) -> Result<Vec<BeltGrading>>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    students: HashMap<StudentId, Student>,
    preferences: HashMap<StudentId, PaymentPreference>,
    configs: Vec<FeeConfiguration>,
    config_history: Vec<FeeConfigChange>,
    fees: HashMap<FeeId, StudentFee>,
    gradings: HashMap<GradingId, BeltGrading>,
}

/// in-memory store with interior locking, used for tests and as the
/// reference implementation of the conditional-update contract
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeeStore for MemoryStore {
    fn put_student(&self, student: Student) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.students.insert(student.id, student);
        Ok(())
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.students.get(&id).cloned())
    }

    fn set_student_belt(&self, id: StudentId, belt: BeltLevel) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let student = inner
            .students
            .get_mut(&id)
            .ok_or(FeeError::StudentNotFound { id })?;
        student.current_belt = belt;
        Ok(())
    }

    fn upsert_preference(&self, preference: PaymentPreference) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.preferences.insert(preference.student_id, preference);
        Ok(())
    }

    fn preference(&self, student_id: StudentId) -> Result<Option<PaymentPreference>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.preferences.get(&student_id).cloned())
    }

    fn active_config(
        &self,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
    ) -> Result<Option<FeeConfiguration>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .configs
            .iter()
            .find(|c| c.is_active && c.fee_type == fee_type && c.belt_level == belt_level)
            .cloned())
    }

    fn insert_config(&self, config: FeeConfiguration) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let key = (config.fee_type, config.belt_level);
        for existing in inner.configs.iter_mut() {
            if existing.is_active && (existing.fee_type, existing.belt_level) == key {
                existing.is_active = false;
            }
        }
        inner.configs.push(config);
        Ok(())
    }

    fn append_config_history(&self, change: FeeConfigChange) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.config_history.push(change);
        Ok(())
    }

    fn config_history(
        &self,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
    ) -> Result<Vec<FeeConfigChange>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .config_history
            .iter()
            .filter(|c| c.fee_type == fee_type && c.belt_level == belt_level)
            .cloned()
            .collect())
    }

    fn insert_fee(&self, fee: StudentFee) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if let (Some(start), Some(end)) = (fee.period_start, fee.period_end) {
            // uniqueness constraint on (student, type, period); the manager's
            // overlap pre-check is the first line, this is the backstop
            let duplicate = inner.fees.values().any(|f| {
                f.student_id == fee.student_id
                    && f.fee_type == fee.fee_type
                    && f.period_start == Some(start)
                    && f.period_end == Some(end)
            });
            if duplicate {
                return Err(FeeError::DuplicatePeriod {
                    student_id: fee.student_id,
                    fee_type: fee.fee_type,
                    start,
                    end,
                });
            }
        }
        inner.fees.insert(fee.id, fee);
        Ok(())
    }

    fn fee(&self, id: FeeId) -> Result<Option<StudentFee>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.fees.get(&id).cloned())
    }

    fn fees_for_student(&self, student_id: StudentId) -> Result<Vec<StudentFee>> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut fees: Vec<StudentFee> = inner
            .fees
            .values()
            .filter(|f| f.student_id == student_id)
            .cloned()
            .collect();
        fees.sort_by_key(|f| (f.due_date, f.created_at));
        Ok(fees)
    }

    fn overlapping_fee(
        &self,
        student_id: StudentId,
        fee_type: FeeType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<StudentFee>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .fees
            .values()
            .find(|f| {
                f.student_id == student_id
                    && f.fee_type == fee_type
                    && f.status.is_outstanding()
                    && f.overlaps(start, end)
            })
            .cloned())
    }

    fn update_status(&self, id: FeeId, status: FeeStatus) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let fee = inner.fees.get_mut(&id).ok_or(FeeError::FeeNotFound { id })?;
        // the transition table is enforced at the row, not just the engine
        if fee.status != status && fee.status.can_transition_to(status) {
            fee.status = status;
        }
        Ok(())
    }

    fn apply_payment_if(
        &self,
        id: FeeId,
        expected_paid: Money,
        update: PaymentUpdate,
    ) -> Result<bool> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let fee = inner.fees.get_mut(&id).ok_or(FeeError::FeeNotFound { id })?;
        if fee.paid_amount != expected_paid {
            return Ok(false);
        }
        fee.paid_amount = update.paid_amount;
        fee.status = update.status;
        fee.paid_at = update.paid_at;
        fee.payment_method = Some(update.payment_method);
        fee.receipt_number = update.receipt_number;
        fee.notes = update.notes;
        Ok(true)
    }

    fn insert_grading(&self, grading: BeltGrading) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.gradings.insert(grading.id, grading);
        Ok(())
    }

    fn set_grading_fee(&self, grading_id: GradingId, fee_id: FeeId) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let grading = inner
            .gradings
            .get_mut(&grading_id)
            .ok_or(FeeError::GradingNotFound { id: grading_id })?;
        grading.student_fee_id = Some(fee_id);
        Ok(())
    }

    fn gradings_for_student(&self, student_id: StudentId) -> Result<Vec<BeltGrading>> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut gradings: Vec<BeltGrading> = inner
            .gradings
            .values()
            .filter(|g| g.student_id == student_id)
            .cloned()
            .collect();
        gradings.sort_by_key(|g| g.graded_on);
        Ok(gradings)
    }
}
