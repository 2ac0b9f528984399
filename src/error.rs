//! Error types for the desk core
//!
//! Errors are classified by how the UI should react:
//! - Validation: malformed input to a pure computation (re-prompt the user)
//! - Rejected: the action violates a state machine's transition table
//! - Conflict: a uniqueness rule was hit (already converted)
//! - Storage: the backing store failed or the record is gone

use thiserror::Error;

use crate::store::StoreError;

/// Error types for desk operations
#[derive(Debug, Error)]
pub enum DeskError {
    // Validation errors
    #[error("Invalid cadence: {0}")]
    InvalidCadence(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    // Rejected transitions
    #[error("Cannot {event} a {from} record")]
    InvalidTransition { from: String, event: String },

    #[error("Obligation is {0}, not active")]
    NotActive(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    // Conflicts
    #[error("A client with email {0} already exists")]
    DuplicateConversion(String),

    // Storage
    #[error("{collection} record not found: {id}")]
    NotFound { collection: String, id: String },

    #[error("Store error: {0}")]
    Store(String),
}

impl DeskError {
    pub(crate) fn transition(from: impl ToString, event: impl ToString) -> Self {
        DeskError::InvalidTransition {
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    /// Returns true if the caller should re-prompt the user for input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DeskError::InvalidCadence(_)
                | DeskError::InvalidDate(_)
                | DeskError::InvalidAmount(_)
                | DeskError::UnknownStatus(_)
        )
    }

    /// Returns true if the action was refused by a state machine
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DeskError::InvalidTransition { .. } | DeskError::NotActive(_) | DeskError::UnknownStage(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DeskError::InvalidCadence(_) => "Pick Monthly, Quarterly or Yearly.",
            DeskError::InvalidDate(_) => "Enter the date as YYYY-MM-DD.",
            DeskError::InvalidAmount(_) => "Enter an amount greater than zero.",
            DeskError::UnknownStatus(_) => "Pick one of the listed statuses.",
            DeskError::InvalidTransition { .. } => "Refresh and check the record's current state.",
            DeskError::NotActive(_) => "Resume the plan before sending a reminder.",
            DeskError::UnknownStage(_) => "Pick one of the pipeline stages.",
            DeskError::DuplicateConversion(_) => "This lead was already converted. Open the client instead.",
            DeskError::NotFound { .. } => "The record was removed. Refresh the list.",
            DeskError::Store(_) => "Check the database file and try again.",
        }
    }
}

impl From<StoreError> for DeskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => DeskError::NotFound {
                collection: collection.as_str().to_string(),
                id,
            },
            StoreError::Conflict(key) => DeskError::DuplicateConversion(key),
            other => DeskError::Store(other.to_string()),
        }
    }
}

/// Serializable error representation for the UI layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Validation,
    Rejected,
    Conflict,
    Storage,
}

impl From<&DeskError> for ErrorPayload {
    fn from(err: &DeskError) -> Self {
        let error_type = if err.is_validation() {
            ErrorType::Validation
        } else if err.is_rejection() {
            ErrorType::Rejected
        } else if matches!(err, DeskError::DuplicateConversion(_)) {
            ErrorType::Conflict
        } else {
            ErrorType::Storage
        };

        ErrorPayload {
            message: err.to_string(),
            error_type,
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
