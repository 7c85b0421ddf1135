use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{FeeError, Result};
use crate::types::PaymentCadence;

/// a billing period with the date payment is expected
///
/// for monthly fees the due date sits one day past the period end (pay for
/// the month just finishing); for yearly fees it sits one month inside the
/// period, creating an early-payment window before the year runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub due_date: NaiveDate,
}

/// number of days in the given month
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    for day in (28..=31).rev() {
        if NaiveDate::from_ymd_opt(year, month, day).is_some() {
            return day;
        }
    }
    28
}

/// build a date, clamping the day to the length of the target month
/// (Jan 31 anchored into February lands on Feb 28/29, never March)
pub fn clamped_ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(last_day_of_month(year, month));
    // month is always 1..=12 and day is clamped, so this cannot fail
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid for month")
}

/// add calendar months, clamping overflow days to the month end
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    clamped_ymd(year, month, date.day())
}

/// add calendar years, clamping Feb 29 to Feb 28 in non-leap targets
pub fn add_years(date: NaiveDate, years: i32) -> NaiveDate {
    clamped_ymd(date.year() + years, date.month(), date.day())
}

/// strict YYYY-MM-DD parse for dates arriving from the boundary
///
/// internal dates are always `NaiveDate`, so this is the only place a
/// malformed calendar date can appear.
pub fn parse_business_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| FeeError::InvalidDate {
        message: format!("expected YYYY-MM-DD, got {:?}", s),
    })
}

/// monthly due date: the anchor day (day-of-month captured at enrollment)
/// of the soonest month that has not yet passed as of `today`
///
/// if today's day-of-month has not reached the anchor, the due date falls
/// this month; otherwise next month. the anchor clamps in short months, so
/// an anchor of 31 dues on Feb 28/29.
pub fn monthly_due_date(today: NaiveDate, anchor_day: u32) -> NaiveDate {
    let this_month = clamped_ymd(today.year(), today.month(), anchor_day);
    if today <= this_month {
        this_month
    } else {
        add_months(this_month, 1)
    }
}

/// monthly period covered by a due date: the month ending the day before
pub fn monthly_period_for(due_date: NaiveDate) -> BillingPeriod {
    BillingPeriod {
        start: add_months(due_date, -1) + Duration::days(1),
        end: due_date - Duration::days(1),
        due_date,
    }
}

/// yearly period starting at `start`: ends one year later (same month/day,
/// clamped), due one calendar month before the end
pub fn yearly_period_from(start: NaiveDate) -> BillingPeriod {
    let end = add_years(start, 1);
    BillingPeriod {
        start,
        end,
        due_date: add_months(end, -1),
    }
}

/// period collected immediately at a plan switch: starts and dues on the
/// switch date, ends one cadence later minus a day
pub fn switch_period(switch_date: NaiveDate, cadence: PaymentCadence) -> BillingPeriod {
    let end = match cadence {
        PaymentCadence::Monthly => add_months(switch_date, 1) - Duration::days(1),
        PaymentCadence::Yearly => add_years(switch_date, 1) - Duration::days(1),
    };
    BillingPeriod {
        start: switch_date,
        end,
        due_date: switch_date,
    }
}

/// the next monthly period after a fully paid one, due on the anchor day
/// of the month following the previous due date
///
/// handles both conventions: the normal postpaid cycle (due the day after
/// the period ends) and the prepaid cycle a plan switch starts (due on the
/// period start), keeping successive periods contiguous in either case.
pub fn next_monthly_period(
    previous: &BillingPeriod,
    anchor_day: u32,
) -> BillingPeriod {
    let next_month = add_months(previous.due_date, 1);
    let due_date = clamped_ymd(next_month.year(), next_month.month(), anchor_day);
    let start = previous.end + Duration::days(1);
    let end = if due_date > start {
        due_date - Duration::days(1)
    } else {
        add_months(due_date, 1) - Duration::days(1)
    };
    BillingPeriod {
        start,
        end,
        due_date,
    }
}

/// the next yearly period, contiguous with the previous one
pub fn next_yearly_period(previous_end: NaiveDate) -> BillingPeriod {
    yearly_period_from(previous_end + Duration::days(1))
}

/// whether the early-renewal window for a yearly period is open: it opens
/// strictly after the date one month before the period end
pub fn yearly_renewal_open(period_end: NaiveDate, today: NaiveDate) -> bool {
    today > add_months(period_end, -1)
}
