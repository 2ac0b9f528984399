//! Scheduled amount increases ("step-ups") for recurring plans.
//!
//! A step-up runs on its own clock. It shares the month arithmetic with
//! the due-date engine but never reads or writes the plan's due date.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::add_months;
use crate::error::DeskError;

/// Interval between two step-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepUpCadence {
    #[serde(rename = "6 months")]
    SixMonths,
    #[serde(rename = "1 year")]
    OneYear,
    #[serde(rename = "2 years")]
    TwoYears,
}

impl StepUpCadence {
    pub const ALL: [StepUpCadence; 3] = [
        StepUpCadence::SixMonths,
        StepUpCadence::OneYear,
        StepUpCadence::TwoYears,
    ];

    pub fn months(self) -> u32 {
        match self {
            StepUpCadence::SixMonths => 6,
            StepUpCadence::OneYear => 12,
            StepUpCadence::TwoYears => 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepUpCadence::SixMonths => "6 months",
            StepUpCadence::OneYear => "1 year",
            StepUpCadence::TwoYears => "2 years",
        }
    }
}

impl fmt::Display for StepUpCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepUpCadence {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6 months" => Ok(StepUpCadence::SixMonths),
            "1 year" => Ok(StepUpCadence::OneYear),
            "2 years" => Ok(StepUpCadence::TwoYears),
            other => Err(DeskError::InvalidCadence(other.to_string())),
        }
    }
}

/// A declared step-up: add `amount` every `cadence`, next on `next_date`.
///
/// Absence of a step-up is `Option::None` on the plan, never a zero amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpPlan {
    pub amount: f64,
    pub cadence: StepUpCadence,
    pub next_date: NaiveDate,
}

impl StepUpPlan {
    /// Declare a step-up anchored at `anchor` (normally the plan's start date).
    pub fn new(amount: f64, cadence: StepUpCadence, anchor: NaiveDate) -> Result<Self, DeskError> {
        validate_step(amount)?;
        Ok(Self {
            amount,
            cadence,
            next_date: next_step_up_date(anchor, cadence)?,
        })
    }
}

/// The step-up date one step-up period after `anchor`.
pub fn next_step_up_date(anchor: NaiveDate, cadence: StepUpCadence) -> Result<NaiveDate, DeskError> {
    add_months(anchor, cadence.months())
}

/// New instalment amount after one step-up. Rounded to cents.
pub fn apply_step_up(current: f64, step: f64) -> Result<f64, DeskError> {
    if !current.is_finite() || current < 0.0 {
        return Err(DeskError::InvalidAmount(format!(
            "current amount must be non-negative, got {}",
            current
        )));
    }
    validate_step(step)?;
    Ok(round_cents(current + step))
}

fn validate_step(step: f64) -> Result<(), DeskError> {
    if !step.is_finite() || step <= 0.0 {
        return Err(DeskError::InvalidAmount(format!(
            "step-up amount must be positive, got {}",
            step
        )));
    }
    Ok(())
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
