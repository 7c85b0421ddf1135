use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a student
pub type StudentId = Uuid;

/// unique identifier for a student fee
pub type FeeId = Uuid;

/// unique identifier for a fee configuration row
pub type ConfigId = Uuid;

/// unique identifier for a belt grading record
pub type GradingId = Uuid;

/// kinds of fees a student can be charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    /// one-time fee collected at enrollment
    Registration,
    /// recurring membership fee, monthly cadence
    Monthly,
    /// recurring membership fee, yearly cadence
    Yearly,
    /// one-time fee tied to a belt promotion
    Grading,
}

impl FeeType {
    /// recurring fee types carry a billing period, one-time fees do not
    pub fn is_recurring(&self) -> bool {
        matches!(self, FeeType::Monthly | FeeType::Yearly)
    }
}

impl fmt::Display for FeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeeType::Registration => "registration",
            FeeType::Monthly => "monthly",
            FeeType::Yearly => "yearly",
            FeeType::Grading => "grading",
        };
        write!(f, "{}", s)
    }
}

/// billing plan a student is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentCadence {
    Monthly,
    Yearly,
}

impl PaymentCadence {
    /// the fee type this cadence bills as
    pub fn fee_type(&self) -> FeeType {
        match self {
            PaymentCadence::Monthly => FeeType::Monthly,
            PaymentCadence::Yearly => FeeType::Yearly,
        }
    }
}

impl fmt::Display for PaymentCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentCadence::Monthly => write!(f, "monthly"),
            PaymentCadence::Yearly => write!(f, "yearly"),
        }
    }
}

/// how a payment was collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Online,
}

/// belt ranks, ordered from junior to senior
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeltLevel {
    White,
    Yellow,
    Orange,
    Green,
    Blue,
    Purple,
    Brown,
    Red,
    Black,
}

impl fmt::Display for BeltLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BeltLevel::White => "white",
            BeltLevel::Yellow => "yellow",
            BeltLevel::Orange => "orange",
            BeltLevel::Green => "green",
            BeltLevel::Blue => "blue",
            BeltLevel::Purple => "purple",
            BeltLevel::Brown => "brown",
            BeltLevel::Red => "red",
            BeltLevel::Black => "black",
        };
        write!(f, "{}", s)
    }
}

/// fee status with a closed transition table
///
/// legal transitions: pending -> overdue, pending -> paid, overdue -> paid.
/// paid is terminal; nothing moves a fee out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Pending,
    Overdue,
    Paid,
}

impl FeeStatus {
    /// whether this status may transition to `next`
    pub fn can_transition_to(&self, next: FeeStatus) -> bool {
        matches!(
            (self, next),
            (FeeStatus::Pending, FeeStatus::Overdue)
                | (FeeStatus::Pending, FeeStatus::Paid)
                | (FeeStatus::Overdue, FeeStatus::Paid)
        )
    }

    /// terminal status, never re-derived
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeeStatus::Paid)
    }

    /// still owed
    pub fn is_outstanding(&self) -> bool {
        matches!(self, FeeStatus::Pending | FeeStatus::Overdue)
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeStatus::Pending => write!(f, "pending"),
            FeeStatus::Overdue => write!(f, "overdue"),
            FeeStatus::Paid => write!(f, "paid"),
        }
    }
}
