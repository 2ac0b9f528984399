//! Activity log: one entry per stage move, conversion or plan lifecycle event.
//!
//! The log is a side channel. A failed write is logged and swallowed so it
//! never turns a successful user action into an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeskError;
use crate::store::{from_record, new_id, to_record, Collection, Filter, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    LeadCreated,
    StageChanged,
    StatusChanged,
    NoteAdded,
    Converted,
    ObligationCreated,
    ObligationPaused,
    ObligationResumed,
    ObligationCompleted,
    ReminderSent,
    ScheduleRecomputed,
    ScheduleRolledForward,
    StepUpApplied,
}

/// What kind of record an entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Prospect,
    Customer,
    Obligation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub kind: ActivityKind,
    pub entity_type: EntityKind,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append an entry. Returns the entry id, or `None` if the write failed.
pub fn record_activity(
    store: &dyn Store,
    kind: ActivityKind,
    entity_type: EntityKind,
    entity_id: &str,
    detail: Option<String>,
) -> Option<String> {
    let entry = ActivityEntry {
        id: new_id(Collection::ActivityLog),
        kind,
        entity_type,
        entity_id: entity_id.to_string(),
        detail,
        created_at: Utc::now(),
    };

    let result = to_record(&entry).and_then(|record| store.create(Collection::ActivityLog, record));
    match result {
        Ok(id) => Some(id),
        Err(e) => {
            log::warn!("Failed to record {:?} for {}: {}", kind, entity_id, e);
            None
        }
    }
}

/// Entries for one record, oldest first.
pub fn history(store: &dyn Store, entity_id: &str) -> Result<Vec<ActivityEntry>, DeskError> {
    let records = store.list(Collection::ActivityLog, &Filter::field_equals("entityId", entity_id))?;
    records
        .into_iter()
        .map(|r| from_record(r).map_err(DeskError::from))
        .collect()
}
