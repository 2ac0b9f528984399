//! Lead → client conversion gate.
//!
//! The only path that creates a [`Customer`]. The email check here is
//! advisory: it sees whatever snapshot the caller passes in. Durable
//! uniqueness comes from [`Store::commit_conversion`](crate::store::Store::commit_conversion).

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::DeskError;
use crate::schedule::{next_occurrence, Cadence};
use crate::types::{Customer, ProductFlags, Prospect};

/// Map free-text interest tags onto product flags.
///
/// Broad families match by substring ("Mutual Funds - SIP" sets both the
/// mutual-fund and SIP flags); insurance and tax products need the exact tag.
pub fn product_flags(interests: &[String]) -> ProductFlags {
    let has = |needle: &str| interests.iter().any(|tag| tag.contains(needle));
    let exact = |name: &str| interests.iter().any(|tag| tag == name);

    ProductFlags {
        mutual_fund: has("Mutual Funds"),
        sip: has("SIP"),
        lump_sum: has("Lump Sum"),
        health_insurance: exact("Health Insurance"),
        life_insurance: exact("Life Insurance"),
        tax_planning: exact("Tax Planning"),
        pension: has("Pension"),
    }
}

/// Build the client record for `prospect`.
///
/// Fails with `DuplicateConversion` when the email (exact, case-sensitive)
/// is already held by a client. The SIP schedule starts on the conversion
/// date with a monthly cadence.
pub fn convert(
    prospect: &Prospect,
    existing_emails: &HashSet<String>,
    id: String,
    converted_at: DateTime<Utc>,
) -> Result<Customer, DeskError> {
    if existing_emails.contains(&prospect.email) {
        return Err(DeskError::DuplicateConversion(prospect.email.clone()));
    }

    let start = converted_at.date_naive();
    let next = next_occurrence(start, Cadence::Monthly)?;

    Ok(Customer {
        id,
        name: prospect.name.clone(),
        email: prospect.email.clone(),
        phone: prospect.phone.clone(),
        products: product_flags(&prospect.interests),
        sip_start_date: Some(start),
        sip_next_date: Some(next),
        converted_from: Some(prospect.id.clone()),
        created_at: converted_at,
    })
}
