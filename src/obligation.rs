//! Recurring plan ("SIP") lifecycle.
//!
//! Status machine:
//!
//! ```text
//!   active --pause--> paused --resume--> active
//!   active|paused --complete--> completed (terminal)
//! ```
//!
//! Every function takes a snapshot and returns a new one; callers persist.
//! `next_date` is only ever derived from `(start_date, frequency)`. The
//! reminder and status operations leave it untouched.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeskError;
use crate::schedule::step_up::round_cents;
use crate::schedule::{
    apply_step_up, next_occurrence, next_step_up_date, occurrence_on_or_after, Cadence,
    StepUpCadence, StepUpPlan,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl ObligationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObligationStatus::Active => "active",
            ObligationStatus::Paused => "paused",
            ObligationStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObligationStatus {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ObligationStatus::Active),
            "paused" => Ok(ObligationStatus::Paused),
            "completed" => Ok(ObligationStatus::Completed),
            other => Err(DeskError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Pause,
    Resume,
    Complete,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Pause => "pause",
            LifecycleEvent::Resume => "resume",
            LifecycleEvent::Complete => "complete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A periodic fixed-amount commitment belonging to one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringObligation {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    pub amount: f64,
    pub frequency: Cadence,
    pub start_date: NaiveDate,
    pub next_date: NaiveDate,
    #[serde(default)]
    pub status: ObligationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_sent: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_up: Option<StepUpPlan>,
    pub created_at: DateTime<Utc>,
}

/// Form input for a new plan, before any schedule fields are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObligation {
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    pub amount: f64,
    pub frequency: Cadence,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_up: Option<StepUpRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpRequest {
    pub amount: f64,
    pub cadence: StepUpCadence,
}

impl RecurringObligation {
    /// Build an active plan with `next_date` and any step-up date computed.
    pub fn new(id: String, draft: NewObligation, created_at: DateTime<Utc>) -> Result<Self, DeskError> {
        validate_amount(draft.amount)?;
        let step_up = draft
            .step_up
            .map(|req| StepUpPlan::new(req.amount, req.cadence, draft.start_date))
            .transpose()?;

        Ok(Self {
            id,
            customer_id: draft.customer_id,
            customer_name: draft.customer_name,
            amount: round_cents(draft.amount),
            frequency: draft.frequency,
            start_date: draft.start_date,
            next_date: next_occurrence(draft.start_date, draft.frequency)?,
            status: ObligationStatus::Active,
            last_reminder_sent: None,
            step_up,
            created_at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ObligationStatus::Active
    }
}

pub(crate) fn validate_amount(amount: f64) -> Result<(), DeskError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DeskError::InvalidAmount(format!(
            "instalment must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Transition table for the status machine.
pub fn transition(
    status: ObligationStatus,
    event: LifecycleEvent,
) -> Result<ObligationStatus, DeskError> {
    use LifecycleEvent::*;
    use ObligationStatus::*;

    match (status, event) {
        (Active, Pause) => Ok(Paused),
        (Paused, Resume) => Ok(Active),
        (Active | Paused, Complete) => Ok(Completed),
        (Active, Resume) | (Paused, Pause) | (Completed, _) => {
            Err(DeskError::transition(status, event))
        }
    }
}

/// Apply a lifecycle event. Schedule fields are carried over unchanged.
pub fn apply_event(
    obligation: &RecurringObligation,
    event: LifecycleEvent,
) -> Result<RecurringObligation, DeskError> {
    let status = transition(obligation.status, event)?;
    Ok(RecurringObligation {
        status,
        ..obligation.clone()
    })
}

/// Pause an active plan or resume a paused one.
pub fn toggle_status(obligation: &RecurringObligation) -> Result<RecurringObligation, DeskError> {
    let event = match obligation.status {
        ObligationStatus::Active => LifecycleEvent::Pause,
        ObligationStatus::Paused => LifecycleEvent::Resume,
        ObligationStatus::Completed => {
            return Err(DeskError::transition(obligation.status, "toggle"));
        }
    };
    apply_event(obligation, event)
}

/// Record that a reminder went out on `today`.
pub fn mark_reminder_sent(
    obligation: &RecurringObligation,
    today: NaiveDate,
) -> Result<RecurringObligation, DeskError> {
    if !obligation.is_active() {
        return Err(DeskError::NotActive(obligation.status.to_string()));
    }
    Ok(RecurringObligation {
        last_reminder_sent: Some(today),
        ..obligation.clone()
    })
}

/// Re-derive `next_date` (and the step-up date) from the plan's anchor.
///
/// Run after `start_date`, `frequency` or the step-up fields are edited.
/// Idempotent: the result depends only on those fields.
pub fn recompute_schedule(obligation: &RecurringObligation) -> Result<RecurringObligation, DeskError> {
    let next_date = next_occurrence(obligation.start_date, obligation.frequency)?;
    let step_up = match &obligation.step_up {
        Some(plan) => Some(StepUpPlan {
            next_date: next_step_up_date(obligation.start_date, plan.cadence)?,
            ..plan.clone()
        }),
        None => None,
    };

    log::debug!(
        "Recomputed schedule for {}: next {} ({})",
        obligation.id,
        next_date,
        obligation.frequency
    );

    Ok(RecurringObligation {
        next_date,
        step_up,
        ..obligation.clone()
    })
}

/// Keep an edited plan's step-up clock past the step-ups already folded
/// into `amount`.
///
/// `recompute_schedule` restarts the clock at `start + cadence`. When the
/// plan already had a step-up, the new date is the first step-up (from the
/// possibly new anchor and cadence) after the last one applied.
pub fn carry_step_up_clock(
    previous: &RecurringObligation,
    recomputed: RecurringObligation,
) -> Result<RecurringObligation, DeskError> {
    let (old, new) = match (&previous.step_up, &recomputed.step_up) {
        (Some(old), Some(new)) => (old, new),
        _ => return Ok(recomputed),
    };

    let old_months = old.cadence.months();
    let last_applied = old
        .next_date
        .checked_sub_months(Months::new(old_months))
        .ok_or_else(|| DeskError::InvalidDate(format!("{} - {} months", old.next_date, old_months)))?;
    let after = last_applied
        .succ_opt()
        .ok_or_else(|| DeskError::InvalidDate(format!("no day after {}", last_applied)))?;
    let next_date = occurrence_on_or_after(recomputed.start_date, new.cadence.months(), after)?
        .max(new.next_date);

    let step_up = Some(StepUpPlan {
        next_date,
        ..new.clone()
    });
    Ok(RecurringObligation {
        step_up,
        ..recomputed
    })
}

/// Move a past-due `next_date` to the first occurrence on or after `today`.
///
/// Completed plans and dates already in the future are returned unchanged.
/// The step-up schedule is left to [`apply_due_step_up`].
pub fn roll_forward(
    obligation: &RecurringObligation,
    today: NaiveDate,
) -> Result<RecurringObligation, DeskError> {
    if obligation.status == ObligationStatus::Completed || obligation.next_date >= today {
        return Ok(obligation.clone());
    }
    let next_date = occurrence_on_or_after(obligation.start_date, obligation.frequency.months(), today)?;
    Ok(RecurringObligation {
        next_date,
        ..obligation.clone()
    })
}

/// Apply every step-up that fell due on or before `today`.
///
/// Returns the updated plan and how many step-ups were applied. Only
/// active plans step up; the primary `next_date` is never touched.
pub fn apply_due_step_up(
    obligation: &RecurringObligation,
    today: NaiveDate,
) -> Result<(RecurringObligation, u32), DeskError> {
    let plan = match &obligation.step_up {
        Some(plan) if obligation.is_active() => plan,
        _ => return Ok((obligation.clone(), 0)),
    };

    let mut amount = obligation.amount;
    let mut next_date = plan.next_date;
    let mut applied = 0;
    while next_date <= today {
        amount = apply_step_up(amount, plan.amount)?;
        let after = next_date
            .succ_opt()
            .ok_or_else(|| DeskError::InvalidDate(format!("no day after {}", next_date)))?;
        next_date = occurrence_on_or_after(obligation.start_date, plan.cadence.months(), after)?;
        applied += 1;
    }

    Ok((
        RecurringObligation {
            amount,
            step_up: Some(StepUpPlan {
                next_date,
                ..plan.clone()
            }),
            ..obligation.clone()
        },
        applied,
    ))
}

/// Active plans due within `lead_days` of `today` (or overdue) whose
/// reminder for the current cycle has not gone out yet. Sorted by due date.
pub fn reminders_due(
    obligations: &[RecurringObligation],
    today: NaiveDate,
    lead_days: u32,
) -> Vec<&RecurringObligation> {
    let horizon = today
        .checked_add_days(Days::new(lead_days as u64))
        .unwrap_or(NaiveDate::MAX);

    let mut due: Vec<&RecurringObligation> = obligations
        .iter()
        .filter(|o| o.is_active() && o.next_date <= horizon)
        .filter(|o| {
            let window_opens = o
                .next_date
                .checked_sub_days(Days::new(lead_days as u64))
                .unwrap_or(NaiveDate::MIN);
            o.last_reminder_sent.map_or(true, |sent| sent < window_opens)
        })
        .collect();
    due.sort_by_key(|o| o.next_date);
    due
}
