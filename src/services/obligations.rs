// Obligations service: SIP plan creation, lifecycle, reminders and schedule upkeep.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_all, load};
use crate::activity::{record_activity, ActivityKind, EntityKind};
use crate::error::DeskError;
use crate::obligation::{self, LifecycleEvent, NewObligation, RecurringObligation, StepUpRequest};
use crate::schedule::step_up::round_cents;
use crate::schedule::{Cadence, StepUpPlan};
use crate::store::{new_id, to_record, Collection, Filter, Store};
use crate::types::Customer;

/// Optional fields keep their stored value when omitted on write; clear them
/// explicitly so a removed step-up does not survive the merge.
const CLEARABLE_FIELDS: [&str; 2] = ["stepUp", "lastReminderSent"];

fn save(store: &dyn Store, obligation: &RecurringObligation) -> Result<(), DeskError> {
    let mut record = to_record(obligation)?;
    for field in CLEARABLE_FIELDS {
        record.entry(field.to_string()).or_insert(Value::Null);
    }
    store.update(Collection::RecurringObligations, &obligation.id, record)?;
    Ok(())
}

pub fn get_obligation(store: &dyn Store, id: &str) -> Result<RecurringObligation, DeskError> {
    load(store, Collection::RecurringObligations, id)
}

pub fn list_obligations(store: &dyn Store) -> Result<Vec<RecurringObligation>, DeskError> {
    decode_all(store.list(Collection::RecurringObligations, &Filter::All)?)
}

pub fn list_for_customer(
    store: &dyn Store,
    customer_id: &str,
) -> Result<Vec<RecurringObligation>, DeskError> {
    decode_all(store.list(
        Collection::RecurringObligations,
        &Filter::field_equals("customerId", customer_id),
    )?)
}

/// Set up a plan for an existing client.
pub fn create_obligation(
    store: &dyn Store,
    mut draft: NewObligation,
) -> Result<RecurringObligation, DeskError> {
    let customer: Customer = load(store, Collection::Customers, &draft.customer_id)?;
    if draft.customer_name.trim().is_empty() {
        draft.customer_name = customer.name;
    }

    let obligation = RecurringObligation::new(
        new_id(Collection::RecurringObligations),
        draft,
        Utc::now(),
    )?;
    store.create(Collection::RecurringObligations, to_record(&obligation)?)?;
    record_activity(
        store,
        ActivityKind::ObligationCreated,
        EntityKind::Obligation,
        &obligation.id,
        Some(format!(
            "{} {} from {}",
            obligation.amount, obligation.frequency, obligation.start_date
        )),
    );
    log::info!(
        "Created plan {} for {}: next due {}",
        obligation.id,
        obligation.customer_id,
        obligation.next_date
    );
    Ok(obligation)
}

fn event_kind(event: LifecycleEvent) -> ActivityKind {
    match event {
        LifecycleEvent::Pause => ActivityKind::ObligationPaused,
        LifecycleEvent::Resume => ActivityKind::ObligationResumed,
        LifecycleEvent::Complete => ActivityKind::ObligationCompleted,
    }
}

/// Pause, resume or complete a plan.
pub fn apply_lifecycle_event(
    store: &dyn Store,
    id: &str,
    event: LifecycleEvent,
) -> Result<RecurringObligation, DeskError> {
    let current = get_obligation(store, id)?;
    let updated = obligation::apply_event(&current, event)?;
    save(store, &updated)?;
    record_activity(store, event_kind(event), EntityKind::Obligation, id, None);
    log::info!("Plan {} {} -> {}", id, current.status, updated.status);
    Ok(updated)
}

/// The "toggle" button: pause if active, resume if paused.
pub fn toggle_obligation(store: &dyn Store, id: &str) -> Result<RecurringObligation, DeskError> {
    let current = get_obligation(store, id)?;
    let updated = obligation::toggle_status(&current)?;
    save(store, &updated)?;
    let kind = if updated.is_active() {
        ActivityKind::ObligationResumed
    } else {
        ActivityKind::ObligationPaused
    };
    record_activity(store, kind, EntityKind::Obligation, id, None);
    Ok(updated)
}

pub fn mark_reminder_sent(
    store: &dyn Store,
    id: &str,
    today: NaiveDate,
) -> Result<RecurringObligation, DeskError> {
    let current = get_obligation(store, id)?;
    let updated = obligation::mark_reminder_sent(&current, today)?;
    save(store, &updated)?;
    record_activity(
        store,
        ActivityKind::ReminderSent,
        EntityKind::Obligation,
        id,
        Some(format!("due {}", updated.next_date)),
    );
    Ok(updated)
}

/// Edits to the fields the schedule is derived from.
///
/// `step_up: Some(None)` removes the step-up; `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEdit {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub frequency: Option<Cadence>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "double_option")]
    pub step_up: Option<Option<StepUpRequest>>,
}

/// Distinguishes an absent `stepUp` key from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Apply a schedule edit and recompute the derived dates.
pub fn edit_schedule(
    store: &dyn Store,
    id: &str,
    edit: ScheduleEdit,
) -> Result<RecurringObligation, DeskError> {
    let current = get_obligation(store, id)?;
    let mut updated = current.clone();

    if let Some(amount) = edit.amount {
        obligation::validate_amount(amount)?;
        updated.amount = round_cents(amount);
    }
    if let Some(frequency) = edit.frequency {
        updated.frequency = frequency;
    }
    if let Some(start_date) = edit.start_date {
        updated.start_date = start_date;
    }
    if let Some(step_up) = edit.step_up {
        updated.step_up = step_up
            .map(|req| StepUpPlan::new(req.amount, req.cadence, updated.start_date))
            .transpose()?;
    }

    let updated = obligation::recompute_schedule(&updated)?;
    let updated = obligation::carry_step_up_clock(&current, updated)?;
    save(store, &updated)?;
    record_activity(
        store,
        ActivityKind::ScheduleRecomputed,
        EntityKind::Obligation,
        id,
        Some(format!("next due {}", updated.next_date)),
    );
    Ok(updated)
}

/// Plans needing a reminder today.
pub fn due_reminders(
    store: &dyn Store,
    today: NaiveDate,
    lead_days: u32,
) -> Result<Vec<RecurringObligation>, DeskError> {
    let all = list_obligations(store)?;
    Ok(obligation::reminders_due(&all, today, lead_days)
        .into_iter()
        .cloned()
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUpSummary {
    pub rolled_forward: usize,
    pub stepped_up: usize,
}

/// Bring every active plan up to `today`: roll past-due dates forward and
/// apply step-ups that have fallen due.
pub fn catch_up(store: &dyn Store, today: NaiveDate) -> Result<CatchUpSummary, DeskError> {
    let mut summary = CatchUpSummary::default();

    for current in list_obligations(store)? {
        if !current.is_active() {
            continue;
        }

        let rolled = obligation::roll_forward(&current, today)?;
        let (updated, applied) = obligation::apply_due_step_up(&rolled, today)?;
        if updated == current {
            continue;
        }

        save(store, &updated)?;
        if rolled.next_date != current.next_date {
            summary.rolled_forward += 1;
            record_activity(
                store,
                ActivityKind::ScheduleRolledForward,
                EntityKind::Obligation,
                &current.id,
                Some(format!("{} -> {}", current.next_date, updated.next_date)),
            );
        }
        if applied > 0 {
            summary.stepped_up += 1;
            record_activity(
                store,
                ActivityKind::StepUpApplied,
                EntityKind::Obligation,
                &current.id,
                Some(format!("{} -> {}", current.amount, updated.amount)),
            );
        }
    }

    if summary != CatchUpSummary::default() {
        log::info!(
            "Catch-up: {} plans rolled forward, {} stepped up",
            summary.rolled_forward,
            summary.stepped_up
        );
    }
    Ok(summary)
}
