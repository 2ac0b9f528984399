//! End-to-end desk flows through the public API.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};

use clientdesk_lib::conversion::{convert, product_flags};
use clientdesk_lib::obligation::{NewObligation, StepUpRequest};
use clientdesk_lib::pipeline::{advance, Stage};
use clientdesk_lib::schedule::{
    apply_step_up, next_occurrence_str, next_step_up_date, Cadence, StepUpCadence,
};
use clientdesk_lib::services::{conversion, obligations, prospects};
use clientdesk_lib::types::Prospect;
use clientdesk_lib::{DeskError, MemoryStore, SqliteStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn tags(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn monthly_plan_next_date() {
    assert_eq!(next_occurrence_str("2024-01-15", "Monthly").unwrap(), "2024-02-15");
    assert!(matches!(
        next_occurrence_str("2024-01-15", "Weekly"),
        Err(DeskError::InvalidCadence(_))
    ));
}

#[test]
fn yearly_step_up() {
    assert_eq!(
        next_step_up_date(d(2024, 3, 1), StepUpCadence::OneYear).unwrap(),
        d(2025, 3, 1)
    );
    assert_eq!(apply_step_up(5000.0, 1000.0).unwrap(), 6000.0);
}

#[test]
fn interests_become_product_flags() {
    let flags = product_flags(&tags(&["Mutual Funds - SIP", "Health Insurance"]));
    assert!(flags.mutual_fund);
    assert!(flags.sip);
    assert!(flags.health_insurance);
    assert!(!flags.lump_sum);
    assert!(!flags.life_insurance);
    assert!(!flags.tax_planning);
    assert!(!flags.pension);
}

#[test]
fn lost_lead_is_only_refused_by_the_service() {
    let mut lead = Prospect::new(
        "lead-1".to_string(),
        "Asha",
        "asha@example.com",
        "",
        vec![],
        Utc::now(),
    );
    lead.status = "lost".parse().unwrap();
    assert_eq!(advance(lead.stage), Stage::KycStarted);

    let store = MemoryStore::new();
    let stored = prospects::create_prospect(&store, "Asha", "asha@example.com", "", vec![]).unwrap();
    prospects::set_prospect_status(&store, &stored.id, "lost").unwrap();
    assert!(matches!(
        prospects::advance_prospect(&store, &stored.id),
        Err(DeskError::InvalidTransition { .. })
    ));
}

#[test]
fn conversion_gate_rejects_known_email() {
    let lead = Prospect::new(
        "lead-1".to_string(),
        "Asha",
        "asha@example.com",
        "",
        vec![],
        Utc::now(),
    );
    let mut existing = HashSet::new();
    existing.insert("ASHA@example.com".to_string());
    assert!(convert(&lead, &existing, "cust-1".into(), Utc::now()).is_ok());

    existing.insert("asha@example.com".to_string());
    assert!(matches!(
        convert(&lead, &existing, "cust-2".into(), Utc::now()),
        Err(DeskError::DuplicateConversion(_))
    ));
}

#[test]
fn lead_to_plan_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("desk.db");

    let customer_id = {
        let store = SqliteStore::open_at(&path).expect("open");
        let lead = prospects::create_prospect(
            &store,
            "Ravi Kumar",
            "ravi@example.com",
            "+91 98000 11111",
            tags(&["Mutual Funds - SIP"]),
        )
        .unwrap();
        prospects::advance_prospect(&store, &lead.id).unwrap();

        let customer = conversion::convert_prospect(&store, &lead.id).unwrap();
        assert!(customer.products.sip);

        let twin = prospects::create_prospect(&store, "Ravi K", "ravi@example.com", "", vec![]).unwrap();
        assert!(matches!(
            conversion::convert_prospect(&store, &twin.id),
            Err(DeskError::DuplicateConversion(_))
        ));

        obligations::create_obligation(
            &store,
            NewObligation {
                customer_id: customer.id.clone(),
                customer_name: String::new(),
                amount: 5000.0,
                frequency: Cadence::Monthly,
                start_date: d(2024, 3, 1),
                step_up: Some(StepUpRequest {
                    amount: 1000.0,
                    cadence: StepUpCadence::OneYear,
                }),
            },
        )
        .unwrap();
        customer.id
    };

    let store = SqliteStore::open_at(&path).expect("reopen");
    assert_eq!(prospects::list_prospects(&store).unwrap().len(), 1);

    let plans = obligations::list_for_customer(&store, &customer_id).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].customer_name, "Ravi Kumar");
    assert_eq!(plans[0].next_date, d(2024, 4, 1));

    obligations::catch_up(&store, d(2025, 3, 10)).unwrap();
    let plan = obligations::get_obligation(&store, &plans[0].id).unwrap();
    assert_eq!(plan.amount, 6000.0);
    assert_eq!(plan.next_date, d(2025, 4, 1));
}
