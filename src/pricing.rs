use hourglass_rs::SafeTimeProvider;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::events::{Event, EventStore};
use crate::model::{FeeConfigChange, FeeConfiguration};
use crate::store::FeeStore;
use crate::types::{BeltLevel, FeeType};

/// grading prices are keyed by belt; everything else must not carry one
fn validate_key(fee_type: FeeType, belt_level: Option<BeltLevel>) -> Result<()> {
    match (fee_type, belt_level) {
        (FeeType::Grading, None) => Err(FeeError::BeltLevelRequired { fee_type }),
        (FeeType::Grading, Some(_)) => Ok(()),
        (_, Some(_)) => Err(FeeError::BeltLevelNotAllowed { fee_type }),
        (_, None) => Ok(()),
    }
}

/// resolve the active price for a fee type (and belt, for grading)
///
/// an unset price is `None`, not an error: callers treat it as a soft
/// warning and skip fee creation rather than fail the whole operation.
pub fn active_price<S: FeeStore>(
    store: &S,
    fee_type: FeeType,
    belt_level: Option<BeltLevel>,
) -> Result<Option<FeeConfiguration>> {
    validate_key(fee_type, belt_level)?;
    store.active_config(fee_type, belt_level)
}

/// activate a new price for a key, superseding the prior active row
///
/// the old row is deactivated, never deleted. a history entry is appended
/// only when the amount actually changed.
pub fn set_price<S: FeeStore>(
    store: &S,
    events: &mut EventStore,
    fee_type: FeeType,
    amount: Money,
    belt_level: Option<BeltLevel>,
    actor: &str,
    time: &SafeTimeProvider,
) -> Result<FeeConfiguration> {
    validate_key(fee_type, belt_level)?;
    if amount.is_negative() {
        return Err(FeeError::InvalidAmount { amount });
    }

    let previous = store.active_config(fee_type, belt_level)?;
    let now = time.now();

    let config = FeeConfiguration {
        id: Uuid::new_v4(),
        fee_type,
        belt_level,
        amount,
        is_active: true,
        updated_by: actor.to_string(),
        updated_at: now,
    };
    store.insert_config(config.clone())?;

    if let Some(prior) = &previous {
        if prior.amount != amount {
            store.append_config_history(FeeConfigChange {
                config_id: config.id,
                fee_type,
                belt_level,
                old_amount: prior.amount,
                new_amount: amount,
                changed_by: actor.to_string(),
                changed_at: now,
            })?;
        }
    }

    events.emit(Event::ConfigurationChanged {
        config_id: config.id,
        fee_type,
        belt_level,
        old_amount: previous.map(|p| p.amount),
        new_amount: amount,
        changed_by: actor.to_string(),
    });

    Ok(config)
}
