use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{BeltLevel, FeeId, FeeType, GradingId, StudentId};

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("belt level required for {fee_type} fees")]
    BeltLevelRequired {
        fee_type: FeeType,
    },

    #[error("belt level not allowed for {fee_type} fees")]
    BeltLevelNotAllowed {
        fee_type: FeeType,
    },

    #[error("billing period required for {fee_type} fees")]
    PeriodRequired {
        fee_type: FeeType,
    },

    #[error("billing period not allowed for {fee_type} fees")]
    PeriodNotAllowed {
        fee_type: FeeType,
    },

    #[error("student not found: {id}")]
    StudentNotFound {
        id: StudentId,
    },

    #[error("student not active: {id}")]
    StudentInactive {
        id: StudentId,
    },

    #[error("fee not found: {id}")]
    FeeNotFound {
        id: FeeId,
    },

    #[error("fee already paid: {id}")]
    FeeAlreadyPaid {
        id: FeeId,
    },

    #[error("grading not found: {id}")]
    GradingNotFound {
        id: GradingId,
    },

    #[error("overpayment: remaining {remaining}, requested {requested}")]
    Overpayment {
        remaining: Money,
        requested: Money,
    },

    #[error("payment conflict on fee {id}: balance changed concurrently, reload and retry")]
    PaymentConflict {
        id: FeeId,
    },

    #[error("duplicate {fee_type} period {start}..{end} for student {student_id}")]
    DuplicatePeriod {
        student_id: StudentId,
        fee_type: FeeType,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("belt mismatch: student holds {current}, reported {reported}")]
    BeltMismatch {
        current: BeltLevel,
        reported: BeltLevel,
    },
}

impl FeeError {
    /// bad input; nothing was charged, fix the request
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FeeError::InvalidAmount { .. }
                | FeeError::InvalidDate { .. }
                | FeeError::BeltLevelRequired { .. }
                | FeeError::BeltLevelNotAllowed { .. }
                | FeeError::PeriodRequired { .. }
                | FeeError::PeriodNotAllowed { .. }
                | FeeError::StudentInactive { .. }
                | FeeError::FeeAlreadyPaid { .. }
                | FeeError::Overpayment { .. }
                | FeeError::BeltMismatch { .. }
        )
    }

    /// someone else changed the row; reload and retry
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            FeeError::PaymentConflict { .. } | FeeError::DuplicatePeriod { .. }
        )
    }

    /// referenced entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FeeError::StudentNotFound { .. }
                | FeeError::FeeNotFound { .. }
                | FeeError::GradingNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FeeError>;
