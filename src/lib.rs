pub mod calendar;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod model;
pub mod pricing;
pub mod status;
pub mod store;
pub mod types;

// re-export key types
pub use calendar::BillingPeriod;
pub use decimal::Money;
pub use engine::{
    CreateFeeParams, FeeEngine, FeeFilter, FeeView, GradingOutcome, InitializedFees,
    PaymentOutcome, PaymentRequest, StudentLedgerView, SwitchOutcome,
};
pub use errors::{FeeError, Result};
pub use events::{Event, EventStore};
pub use model::{
    BeltGrading, FeeConfigChange, FeeConfiguration, PaymentPreference, Student, StudentFee,
};
pub use store::{FeeStore, MemoryStore};
pub use types::{
    BeltLevel, ConfigId, FeeId, FeeStatus, FeeType, GradingId, PaymentCadence, PaymentMethod,
    StudentId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
