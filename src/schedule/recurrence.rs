//! Next-due-date computation for recurring plans.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{add_months, format_date, parse_date};
use crate::error::DeskError;

/// How often a recurring plan falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cadence {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Monthly, Cadence::Quarterly, Cadence::Yearly];

    /// Calendar months between two due dates.
    pub fn months(self) -> u32 {
        match self {
            Cadence::Monthly => 1,
            Cadence::Quarterly => 3,
            Cadence::Yearly => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Monthly => "Monthly",
            Cadence::Quarterly => "Quarterly",
            Cadence::Yearly => "Yearly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Monthly" => Ok(Cadence::Monthly),
            "Quarterly" => Ok(Cadence::Quarterly),
            "Yearly" => Ok(Cadence::Yearly),
            other => Err(DeskError::InvalidCadence(other.to_string())),
        }
    }
}

/// The due date one cadence period after `anchor`.
pub fn next_occurrence(anchor: NaiveDate, cadence: Cadence) -> Result<NaiveDate, DeskError> {
    add_months(anchor, cadence.months())
}

/// [`next_occurrence`] over wire values: `YYYY-MM-DD` in, `YYYY-MM-DD` out.
pub fn next_occurrence_str(anchor: &str, cadence: &str) -> Result<String, DeskError> {
    let cadence: Cadence = cadence.parse()?;
    let anchor = parse_date(anchor)?;
    next_occurrence(anchor, cadence).map(format_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use proptest::prelude::*;

    fn d(raw: &str) -> NaiveDate {
        parse_date(raw).unwrap()
    }

    #[test]
    fn test_next_occurrence_per_cadence() {
        assert_eq!(next_occurrence(d("2024-01-15"), Cadence::Monthly).unwrap(), d("2024-02-15"));
        assert_eq!(next_occurrence(d("2024-01-15"), Cadence::Quarterly).unwrap(), d("2024-04-15"));
        assert_eq!(next_occurrence(d("2024-01-15"), Cadence::Yearly).unwrap(), d("2025-01-15"));
    }

    #[test]
    fn test_next_occurrence_leap_year_rollover() {
        assert_eq!(next_occurrence(d("2024-01-31"), Cadence::Monthly).unwrap(), d("2024-02-29"));
        assert_eq!(next_occurrence(d("2023-11-30"), Cadence::Quarterly).unwrap(), d("2024-02-29"));
        assert_eq!(next_occurrence(d("2024-02-29"), Cadence::Yearly).unwrap(), d("2025-02-28"));
    }

    #[test]
    fn test_next_occurrence_str_errors() {
        assert_eq!(next_occurrence_str("2024-12-15", "Monthly").unwrap(), "2025-01-15");
        assert!(matches!(
            next_occurrence_str("2024-12-15", "Weekly"),
            Err(DeskError::InvalidCadence(c)) if c == "Weekly"
        ));
        assert!(matches!(
            next_occurrence_str("2024-13-01", "Monthly"),
            Err(DeskError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_cadence_literals_round_trip_through_serde() {
        for cadence in Cadence::ALL {
            let json = serde_json::to_string(&cadence).unwrap();
            assert_eq!(json, format!("\"{}\"", cadence.as_str()));
            assert_eq!(cadence.as_str().parse::<Cadence>().unwrap(), cadence);
        }
        assert!(serde_json::from_str::<Cadence>("\"monthly\"").is_err());
    }

    fn anchor_date() -> impl Strategy<Value = NaiveDate> {
        (1990i32..2100, 1u32..=12, 1u32..=31).prop_filter_map("valid calendar date", |(y, m, day)| {
            NaiveDate::from_ymd_opt(y, m, day)
        })
    }

    fn cadence() -> impl Strategy<Value = Cadence> {
        prop::sample::select(Cadence::ALL.to_vec())
    }

    proptest! {
        /// Property: the next occurrence is strictly later by exactly the cadence's month count.
        #[test]
        fn prop_next_occurrence_adds_whole_months(anchor in anchor_date(), cadence in cadence()) {
            let next = next_occurrence(anchor, cadence).unwrap();
            prop_assert!(next > anchor);

            let months_between = (next.year() - anchor.year()) * 12
                + next.month() as i32
                - anchor.month() as i32;
            prop_assert_eq!(months_between, cadence.months() as i32);

            // Day preserved unless the target month is too short.
            if next.day() != anchor.day() {
                prop_assert!(next.day() < anchor.day());
                prop_assert!(next.succ_opt().map(|n| n.month() != next.month()).unwrap_or(true));
            }
        }
    }
}
