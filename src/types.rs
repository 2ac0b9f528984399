use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeskError;
use crate::pipeline::Stage;

/// Configuration stored in ~/.clientdesk/config.json
///
/// Every field has a default, so an empty object (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// SQLite file backing the store. Defaults to `~/.clientdesk/clientdesk.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Days ahead of a due date at which a plan shows up as needing a reminder.
    #[serde(default = "default_reminder_lead_days")]
    pub reminder_lead_days: u32,
    /// Refuse direct stage jumps backwards (explicit retreat is still allowed).
    #[serde(default)]
    pub enforce_monotonic_stages: bool,
}

fn default_reminder_lead_days() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            reminder_lead_days: default_reminder_lead_days(),
            enforce_monotonic_stages: false,
        }
    }
}

// =============================================================================
// Leads
// =============================================================================

/// Sales status of a lead, independent of its onboarding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Lost,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(DeskError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A potential client ("lead") moving through onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Free-text product interests, e.g. "Mutual Funds - SIP".
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub stage: Stage,
    /// Append-only.
    #[serde(default)]
    pub notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
}

impl Prospect {
    /// A fresh lead at the first stage with status `new`.
    pub fn new(
        id: String,
        name: &str,
        email: &str,
        phone: &str,
        interests: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            phone: phone.trim().to_string(),
            interests,
            status: LeadStatus::New,
            stage: Stage::default(),
            notes: Vec::new(),
            created_at,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.status == LeadStatus::Lost
    }
}

// =============================================================================
// Clients
// =============================================================================

/// Products a client holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFlags {
    pub mutual_fund: bool,
    pub sip: bool,
    pub lump_sum: bool,
    pub health_insurance: bool,
    pub life_insurance: bool,
    pub tax_planning: bool,
    pub pension: bool,
}

/// An onboarded client. Only ever created by conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub products: ProductFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_next_date: Option<NaiveDate>,
    /// Lead this client was converted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_from: Option<String>,
    pub created_at: DateTime<Utc>,
}
