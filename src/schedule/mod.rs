//! Calendar arithmetic for recurring plans.
//!
//! Both engines share one primitive, [`add_months`], which adds whole
//! calendar months and clamps to the last day of short months
//! (`2024-01-31 + 1 month = 2024-02-29`). No timezone or business-day
//! adjustment is applied.

pub mod recurrence;
pub mod step_up;

pub use recurrence::{next_occurrence, next_occurrence_str, Cadence};
pub use step_up::{apply_step_up, next_step_up_date, StepUpCadence, StepUpPlan};

use chrono::{Datelike, Months, NaiveDate};

use crate::error::DeskError;

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, DeskError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| DeskError::InvalidDate(format!("'{}': {}", raw, e)))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Add `months` calendar months to `date`, clamping to month end.
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, DeskError> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        DeskError::InvalidDate(format!("{} + {} months is out of range", date, months))
    })
}

/// First date `start + k * months` (k >= 1) that falls on or after `today`.
///
/// Every candidate is computed from `start`, so a Jan 31 anchor yields
/// Feb 29, Mar 31, Apr 30 rather than drifting to the 29th.
pub fn occurrence_on_or_after(
    start: NaiveDate,
    months: u32,
    today: NaiveDate,
) -> Result<NaiveDate, DeskError> {
    if months == 0 {
        return Err(DeskError::InvalidCadence("zero-month interval".to_string()));
    }

    let first = add_months(start, months)?;
    if first >= today {
        return Ok(first);
    }

    // Jump close to `today` in one step, then walk the last period or two.
    let elapsed = (today.year() - start.year()) * 12 + today.month() as i32 - start.month() as i32;
    let mut k = (elapsed.max(0) as u32 / months).max(1);
    loop {
        let candidate = add_months(start, k * months)?;
        if candidate >= today {
            return Ok(candidate);
        }
        k += 1;
    }
}
