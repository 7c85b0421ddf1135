use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    BeltLevel, ConfigId, FeeId, FeeStatus, FeeType, GradingId, PaymentCadence, PaymentMethod,
    StudentId,
};

/// all events the fee engine emits; the notification collaborator consumes
/// these, delivery itself lives outside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // fee lifecycle events
    FeeCreated {
        fee_id: FeeId,
        student_id: StudentId,
        fee_type: FeeType,
        amount: Money,
        due_date: NaiveDate,
    },
    PaymentRecorded {
        fee_id: FeeId,
        student_id: StudentId,
        amount: Money,
        method: PaymentMethod,
        remaining: Money,
        recorded_by: String,
        timestamp: DateTime<Utc>,
    },
    FeePaid {
        fee_id: FeeId,
        student_id: StudentId,
        fee_type: FeeType,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },
    StatusCorrected {
        fee_id: FeeId,
        old_status: FeeStatus,
        new_status: FeeStatus,
    },
    RenewalGenerated {
        fee_id: FeeId,
        student_id: StudentId,
        fee_type: FeeType,
        period_start: NaiveDate,
        period_end: NaiveDate,
        due_date: NaiveDate,
    },

    // plan events
    PreferenceInitialized {
        student_id: StudentId,
        cadence: PaymentCadence,
        started_from: NaiveDate,
    },
    PreferenceSwitched {
        student_id: StudentId,
        old_cadence: PaymentCadence,
        new_cadence: PaymentCadence,
        switch_date: NaiveDate,
    },

    // grading events
    GradingRecorded {
        grading_id: GradingId,
        student_id: StudentId,
        from_belt: BeltLevel,
        to_belt: BeltLevel,
        fee_id: Option<FeeId>,
        graded_on: NaiveDate,
    },

    // pricing events
    ConfigurationChanged {
        config_id: ConfigId,
        fee_type: FeeType,
        belt_level: Option<BeltLevel>,
        old_amount: Option<Money>,
        new_amount: Money,
        changed_by: String,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
