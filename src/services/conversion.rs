// Conversion service: turn a lead into a client in one atomic write.

use std::collections::HashSet;

use chrono::Utc;

use super::{decode_all, load};
use crate::activity::{record_activity, ActivityKind, EntityKind};
use crate::conversion;
use crate::error::DeskError;
use crate::services::prospects::get_prospect;
use crate::store::{new_id, to_record, Collection, Filter, StoreError, Store};
use crate::types::{Customer, LeadStatus};

pub fn get_customer(store: &dyn Store, id: &str) -> Result<Customer, DeskError> {
    load(store, Collection::Customers, id)
}

pub fn list_customers(store: &dyn Store) -> Result<Vec<Customer>, DeskError> {
    decode_all(store.list(Collection::Customers, &Filter::All)?)
}

/// Convert lead `prospect_id` into a client.
///
/// The client is created and the lead removed together; on any failure
/// neither happens. A second conversion with the same email is refused
/// even when it races the first. Lost leads are not converted.
pub fn convert_prospect(store: &dyn Store, prospect_id: &str) -> Result<Customer, DeskError> {
    let prospect = get_prospect(store, prospect_id)?;
    if prospect.is_lost() {
        return Err(DeskError::transition(LeadStatus::Lost, "convert"));
    }
    let existing: HashSet<String> = list_customers(store)?
        .into_iter()
        .map(|c| c.email)
        .collect();

    let customer = conversion::convert(
        &prospect,
        &existing,
        new_id(Collection::Customers),
        Utc::now(),
    )?;

    store
        .commit_conversion(prospect_id, to_record(&customer)?)
        .map_err(|e| match e {
            StoreError::Conflict(_) => DeskError::DuplicateConversion(customer.email.clone()),
            other => DeskError::from(other),
        })?;

    record_activity(
        store,
        ActivityKind::Converted,
        EntityKind::Customer,
        &customer.id,
        Some(format!("from {}", prospect_id)),
    );
    log::info!(
        "Converted lead {} to client {} ({})",
        prospect_id,
        customer.id,
        customer.email
    );
    Ok(customer)
}
