use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{
    BeltLevel, ConfigId, FeeId, FeeStatus, FeeType, GradingId, PaymentCadence, PaymentMethod,
    StudentId,
};

/// the slice of a student record the fee engine reads: recurring fees are
/// gated on `is_active`, gradings validate against `current_belt`.
/// provisioning the full profile is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub is_active: bool,
    pub current_belt: BeltLevel,
}

/// a priced fee template; at most one active row per (fee_type, belt_level)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfiguration {
    pub id: ConfigId,
    pub fee_type: FeeType,
    /// present iff fee_type is grading
    pub belt_level: Option<BeltLevel>,
    pub amount: Money,
    pub is_active: bool,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// price-change history entry, appended when an active amount is superseded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfigChange {
    pub config_id: ConfigId,
    pub fee_type: FeeType,
    pub belt_level: Option<BeltLevel>,
    pub old_amount: Money,
    pub new_amount: Money,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// one-per-student billing plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPreference {
    pub student_id: StudentId,
    pub cadence: PaymentCadence,
    /// date the preference took effect; its day-of-month is the monthly
    /// billing anchor
    pub started_from: NaiveDate,
}

impl PaymentPreference {
    /// day-of-month monthly due dates align to
    pub fn anchor_day(&self) -> u32 {
        use chrono::Datelike;
        self.started_from.day()
    }
}

/// the core transactional entity: one invoice owed by one student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentFee {
    pub id: FeeId,
    pub student_id: StudentId,
    pub fee_type: FeeType,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub status: FeeStatus,
    pub paid_amount: Money,
    pub paid_at: Option<DateTime<Utc>>,
    /// present for monthly/yearly fees, absent for registration/grading
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// present only for grading fees
    pub belt_grading_id: Option<GradingId>,
    pub payment_method: Option<PaymentMethod>,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StudentFee {
    /// unpaid balance
    pub fn remaining(&self) -> Money {
        self.paid_amount.remaining_to(self.amount)
    }

    /// whether this fee's period overlaps the given range
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match (self.period_start, self.period_end) {
            (Some(s), Some(e)) => s <= end && e >= start,
            _ => false,
        }
    }
}

/// state applied to a fee row when a payment lands
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub paid_amount: Money,
    pub status: FeeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
}

/// a belt promotion, optionally linked to the fee it generated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeltGrading {
    pub id: GradingId,
    pub student_id: StudentId,
    pub from_belt: BeltLevel,
    pub to_belt: BeltLevel,
    pub graded_on: NaiveDate,
    /// backfilled after the grading fee is created
    pub student_fee_id: Option<FeeId>,
    pub recorded_by: String,
}

impl Student {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            current_belt: BeltLevel::White,
        }
    }
}
