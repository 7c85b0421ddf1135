use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::Serialize;

use crate::decimal::Money;
use crate::errors::Result;
use crate::model::{BeltGrading, PaymentPreference, StudentFee};
use crate::store::FeeStore;
use crate::types::{BeltLevel, FeeStatus, FeeType, StudentId};

use super::fees::FeeFilter;
use super::FeeEngine;

/// flattened fee row for display
#[derive(Debug, Clone, Serialize)]
pub struct FeeView {
    pub fee_type: FeeType,
    pub amount: Money,
    pub paid_amount: Money,
    pub remaining: Money,
    pub status: FeeStatus,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

impl FeeView {
    pub fn from_fee(fee: &StudentFee) -> Self {
        Self {
            fee_type: fee.fee_type,
            amount: fee.amount,
            paid_amount: fee.paid_amount,
            remaining: fee.remaining(),
            status: fee.status,
            due_date: fee.due_date,
            period_start: fee.period_start,
            period_end: fee.period_end,
        }
    }
}

/// full billing picture for one student
#[derive(Debug, Clone, Serialize)]
pub struct StudentLedgerView {
    pub student_name: String,
    pub current_belt: BeltLevel,
    pub preference: Option<PaymentPreference>,
    pub fees: Vec<FeeView>,
    pub gradings: Vec<BeltGrading>,
    pub total_outstanding: Money,
}

impl<S: FeeStore> FeeEngine<S> {
    /// json snapshot of a student's ledger, statuses resolved as of today
    pub fn ledger_json(&mut self, student_id: StudentId, time: &SafeTimeProvider) -> Result<String> {
        let fees = self.student_fees(student_id, FeeFilter::default(), time)?;
        let student = self
            .student(student_id)?
            .ok_or(crate::errors::FeeError::StudentNotFound { id: student_id })?;

        let view = StudentLedgerView {
            student_name: student.name,
            current_belt: student.current_belt,
            preference: self.payment_preference(student_id)?,
            total_outstanding: fees
                .iter()
                .filter(|f| f.status.is_outstanding())
                .map(|f| f.remaining())
                .sum(),
            fees: fees.iter().map(FeeView::from_fee).collect(),
            gradings: self.belt_gradings(student_id)?,
        };

        Ok(serde_json::to_string_pretty(&view)
            .unwrap_or_else(|e| format!("JSON error: {}", e)))
    }
}
