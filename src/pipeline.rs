//! Onboarding pipeline for leads.
//!
//! Eight stages in a fixed order. Stages compare by position, not name.
//! The machine enforces membership and boundary clamping only; whether a
//! lead may jump backwards is a [`StagePolicy`] decision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Generated,
    KycStarted,
    KycCompleted,
    AccountNumberIssued,
    AccountCreated,
    MandateGenerated,
    MandateAccepted,
    SipActivated,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Generated,
        Stage::KycStarted,
        Stage::KycCompleted,
        Stage::AccountNumberIssued,
        Stage::AccountCreated,
        Stage::MandateGenerated,
        Stage::MandateAccepted,
        Stage::SipActivated,
    ];

    pub const FIRST: Stage = Stage::Generated;
    pub const LAST: Stage = Stage::SipActivated;

    /// Position in the pipeline, 0-based.
    pub fn index(self) -> usize {
        match self {
            Stage::Generated => 0,
            Stage::KycStarted => 1,
            Stage::KycCompleted => 2,
            Stage::AccountNumberIssued => 3,
            Stage::AccountCreated => 4,
            Stage::MandateGenerated => 5,
            Stage::MandateAccepted => 6,
            Stage::SipActivated => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    /// Wire literal.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generated => "generated",
            Stage::KycStarted => "kyc_started",
            Stage::KycCompleted => "kyc_completed",
            Stage::AccountNumberIssued => "account_number_issued",
            Stage::AccountCreated => "account_created",
            Stage::MandateGenerated => "mandate_generated",
            Stage::MandateAccepted => "mandate_accepted",
            Stage::SipActivated => "sip_activated",
        }
    }

    /// Human label for the stage tracker.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Generated => "Lead Generated",
            Stage::KycStarted => "KYC Started",
            Stage::KycCompleted => "KYC Completed",
            Stage::AccountNumberIssued => "Account Number Issued",
            Stage::AccountCreated => "Account Created",
            Stage::MandateGenerated => "Mandate Generated",
            Stage::MandateAccepted => "Mandate Accepted",
            Stage::SipActivated => "SIP Activated",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::LAST
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DeskError::UnknownStage(s.to_string()))
    }
}

/// Next stage; the last stage stays put.
pub fn advance(current: Stage) -> Stage {
    Stage::from_index(current.index() + 1).unwrap_or(current)
}

/// Previous stage; the first stage stays put.
pub fn retreat(current: Stage) -> Stage {
    match current.index().checked_sub(1) {
        Some(i) => Stage::from_index(i).unwrap_or(current),
        None => current,
    }
}

/// Rules for direct stage assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StagePolicy {
    /// Reject `set_stage` targets earlier than the current stage.
    pub monotonic: bool,
}

impl StagePolicy {
    pub fn from_config(config: &crate::types::Config) -> Self {
        Self {
            monotonic: config.enforce_monotonic_stages,
        }
    }

    /// Jump straight to `target` (a wire literal).
    pub fn set_stage(self, current: Stage, target: &str) -> Result<Stage, DeskError> {
        let target: Stage = target.parse()?;
        if self.monotonic && target < current {
            return Err(DeskError::transition(current, format!("move back to {}", target)));
        }
        Ok(target)
    }
}

/// Direct jump with the default (permissive) policy.
pub fn set_stage(current: Stage, target: &str) -> Result<Stage, DeskError> {
    StagePolicy::default().set_stage(current, target)
}
