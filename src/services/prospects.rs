// Prospects service: lead intake, stage moves, status and notes.

use chrono::Utc;
use serde_json::json;

use super::{decode_all, load, patch};
use crate::activity::{record_activity, ActivityKind, EntityKind};
use crate::error::DeskError;
use crate::pipeline::{self, Stage, StagePolicy};
use crate::store::{new_id, to_record, Collection, Filter, Store};
use crate::types::{Config, LeadStatus, Note, Prospect};

/// Record a new lead at the first stage.
pub fn create_prospect(
    store: &dyn Store,
    name: &str,
    email: &str,
    phone: &str,
    interests: Vec<String>,
) -> Result<Prospect, DeskError> {
    let prospect = Prospect::new(
        new_id(Collection::Prospects),
        name,
        email,
        phone,
        interests,
        Utc::now(),
    );
    store.create(Collection::Prospects, to_record(&prospect)?)?;
    record_activity(store, ActivityKind::LeadCreated, EntityKind::Prospect, &prospect.id, None);
    log::info!("Created lead {} ({})", prospect.id, prospect.name);
    Ok(prospect)
}

pub fn get_prospect(store: &dyn Store, id: &str) -> Result<Prospect, DeskError> {
    load(store, Collection::Prospects, id)
}

pub fn list_prospects(store: &dyn Store) -> Result<Vec<Prospect>, DeskError> {
    decode_all(store.list(Collection::Prospects, &Filter::All)?)
}

/// Persist a stage change and log it. No write when the stage is unchanged.
fn save_stage(store: &dyn Store, prospect: Prospect, stage: Stage) -> Result<Prospect, DeskError> {
    if stage == prospect.stage {
        return Ok(prospect);
    }

    store.update(Collection::Prospects, &prospect.id, patch(json!({ "stage": stage })))?;
    record_activity(
        store,
        ActivityKind::StageChanged,
        EntityKind::Prospect,
        &prospect.id,
        Some(format!("{} -> {}", prospect.stage, stage)),
    );
    log::info!("Lead {} moved {} -> {}", prospect.id, prospect.stage, stage);
    Ok(Prospect { stage, ..prospect })
}

/// Move a lead one stage forward. Lost leads stay where they are.
pub fn advance_prospect(store: &dyn Store, id: &str) -> Result<Prospect, DeskError> {
    let prospect = get_prospect(store, id)?;
    if prospect.is_lost() {
        return Err(DeskError::transition(LeadStatus::Lost, "advance"));
    }
    let next = pipeline::advance(prospect.stage);
    save_stage(store, prospect, next)
}

pub fn retreat_prospect(store: &dyn Store, id: &str) -> Result<Prospect, DeskError> {
    let prospect = get_prospect(store, id)?;
    let previous = pipeline::retreat(prospect.stage);
    save_stage(store, prospect, previous)
}

/// Jump a lead to `target` (a stage literal) under the configured policy.
pub fn set_prospect_stage(
    store: &dyn Store,
    config: &Config,
    id: &str,
    target: &str,
) -> Result<Prospect, DeskError> {
    let prospect = get_prospect(store, id)?;
    let stage = StagePolicy::from_config(config).set_stage(prospect.stage, target)?;
    if prospect.is_lost() && stage > prospect.stage {
        return Err(DeskError::transition(LeadStatus::Lost, "advance"));
    }
    save_stage(store, prospect, stage)
}

/// Change the sales status (`new`, `contacted`, `qualified`, `lost`).
pub fn set_prospect_status(store: &dyn Store, id: &str, status: &str) -> Result<Prospect, DeskError> {
    let status: LeadStatus = status.parse()?;
    let prospect = get_prospect(store, id)?;
    if status == prospect.status {
        return Ok(prospect);
    }

    store.update(Collection::Prospects, id, patch(json!({ "status": status })))?;
    record_activity(
        store,
        ActivityKind::StatusChanged,
        EntityKind::Prospect,
        id,
        Some(format!("{} -> {}", prospect.status, status)),
    );
    Ok(Prospect { status, ..prospect })
}

/// Append a note. Blank notes are ignored.
pub fn add_note(store: &dyn Store, id: &str, text: &str) -> Result<Prospect, DeskError> {
    let mut prospect = get_prospect(store, id)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(prospect);
    }

    prospect.notes.push(Note {
        text: trimmed.to_string(),
        created_at: Utc::now(),
    });
    store.update(Collection::Prospects, id, patch(json!({ "notes": prospect.notes })))?;
    record_activity(store, ActivityKind::NoteAdded, EntityKind::Prospect, id, None);
    Ok(prospect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::history;
    use crate::store::MemoryStore;

    fn seed(store: &MemoryStore) -> Prospect {
        create_prospect(
            store,
            " Asha Rao ",
            "asha@example.com",
            "",
            vec!["Mutual Funds - SIP".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_create_then_advance_and_retreat() {
        let store = MemoryStore::new();
        let lead = seed(&store);
        assert_eq!(lead.name, "Asha Rao");
        assert_eq!(lead.stage, Stage::Generated);

        let moved = advance_prospect(&store, &lead.id).unwrap();
        assert_eq!(moved.stage, Stage::KycStarted);
        assert_eq!(get_prospect(&store, &lead.id).unwrap().stage, Stage::KycStarted);

        let back = retreat_prospect(&store, &lead.id).unwrap();
        assert_eq!(back.stage, Stage::Generated);

        // Clamped at the first stage: no write, no log entry.
        retreat_prospect(&store, &lead.id).unwrap();
        let kinds: Vec<ActivityKind> = history(&store, &lead.id).unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::LeadCreated, ActivityKind::StageChanged, ActivityKind::StageChanged]
        );
    }

    #[test]
    fn test_lost_lead_does_not_advance() {
        let store = MemoryStore::new();
        let lead = seed(&store);
        set_prospect_status(&store, &lead.id, "lost").unwrap();

        assert!(matches!(
            advance_prospect(&store, &lead.id),
            Err(DeskError::InvalidTransition { .. })
        ));
        assert!(set_prospect_stage(&store, &Config::default(), &lead.id, "kyc_completed").is_err());
        assert_eq!(get_prospect(&store, &lead.id).unwrap().stage, Stage::Generated);
    }

    #[test]
    fn test_set_stage_honours_policy() {
        let store = MemoryStore::new();
        let lead = seed(&store);
        let permissive = Config::default();
        let strict = Config {
            enforce_monotonic_stages: true,
            ..Config::default()
        };

        set_prospect_stage(&store, &permissive, &lead.id, "mandate_generated").unwrap();
        assert!(matches!(
            set_prospect_stage(&store, &strict, &lead.id, "kyc_started"),
            Err(DeskError::InvalidTransition { .. })
        ));
        let moved = set_prospect_stage(&store, &permissive, &lead.id, "kyc_started").unwrap();
        assert_eq!(moved.stage, Stage::KycStarted);

        assert!(matches!(
            set_prospect_stage(&store, &permissive, &lead.id, "onboarded"),
            Err(DeskError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_status_and_notes() {
        let store = MemoryStore::new();
        let lead = seed(&store);

        assert!(matches!(
            set_prospect_status(&store, &lead.id, "won"),
            Err(DeskError::UnknownStatus(_))
        ));
        set_prospect_status(&store, &lead.id, "qualified").unwrap();

        add_note(&store, &lead.id, "Called, wants SIP of 5k").unwrap();
        add_note(&store, &lead.id, "   ").unwrap();
        let lead = add_note(&store, &lead.id, "KYC docs received").unwrap();

        let stored = get_prospect(&store, &lead.id).unwrap();
        assert_eq!(stored.status, LeadStatus::Qualified);
        assert_eq!(stored.notes.len(), 2);
        assert_eq!(stored.notes[1].text, "KYC docs received");
    }

    #[test]
    fn test_missing_lead_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            advance_prospect(&store, "lead-ghost"),
            Err(DeskError::NotFound { .. })
        ));
    }
}
