pub mod fees;
pub mod grading;
pub mod preference;
pub mod renewal;
pub mod serialization;

use hourglass_rs::SafeTimeProvider;

use crate::decimal::Money;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::model::{FeeConfiguration, PaymentPreference, Student};
use crate::pricing;
use crate::status::CorrectionQueue;
use crate::store::FeeStore;
use crate::types::{BeltLevel, FeeType, StudentId};

pub use fees::{CreateFeeParams, FeeFilter, PaymentOutcome, PaymentRequest};
pub use grading::GradingOutcome;
pub use preference::{InitializedFees, SwitchOutcome};
pub use serialization::{FeeView, StudentLedgerView};

/// the fee lifecycle engine: request-scoped operations over a shared store
///
/// there is no background scheduler; renewal behavior is lazily triggered
/// on read, and every time-dependent operation takes the clock explicitly.
pub struct FeeEngine<S: FeeStore> {
    store: S,
    pub events: EventStore,
    corrections: CorrectionQueue,
}

impl<S: FeeStore> FeeEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: EventStore::new(),
            corrections: CorrectionQueue::new(),
        }
    }

    /// seed the minimal student row the engine gates on; full profile
    /// provisioning lives outside the engine
    pub fn register_student(&mut self, student: Student) -> Result<()> {
        self.store.put_student(student)
    }

    pub fn student(&self, id: StudentId) -> Result<Option<Student>> {
        self.store.student(id)
    }

    pub fn payment_preference(&self, student_id: StudentId) -> Result<Option<PaymentPreference>> {
        self.store.preference(student_id)
    }

    /// active price for a fee type; `None` when pricing is not configured
    pub fn fee_configuration(
        &self,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
    ) -> Result<Option<FeeConfiguration>> {
        pricing::active_price(&self.store, fee_type, belt_level)
    }

    /// activate a new price, superseding the prior active row
    pub fn set_fee_configuration(
        &mut self,
        fee_type: FeeType,
        amount: Money,
        belt_level: Option<BeltLevel>,
        actor: &str,
        time: &SafeTimeProvider,
    ) -> Result<FeeConfiguration> {
        pricing::set_price(
            &self.store,
            &mut self.events,
            fee_type,
            amount,
            belt_level,
            actor,
            time,
        )
    }

    /// take events emitted since the last call
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
