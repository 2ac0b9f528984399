//! Record store the desk persists through.
//!
//! The core never talks to a database directly: services hand it JSON
//! records keyed by collection. Two adapters ship with the crate:
//! [`MemoryStore`] (tests, embedding) and [`SqliteStore`] (the app's local
//! database at `~/.clientdesk/clientdesk.db`).
//!
//! Uniqueness of client email is enforced by the store, not by the caller's
//! snapshot: [`Store::commit_conversion`] creates the client and removes the
//! lead in one step, or fails with [`StoreError::Conflict`].

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod sqlite;
mod subscription;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use subscription::Subscription;
pub(crate) use subscription::{ChangeFeed, SnapshotSource};

/// A stored record: a JSON object with a string `id` field.
pub type Record = Map<String, Value>;

/// Errors raised by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: String },

    #[error("Already taken: {0}")]
    Conflict(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Prospects,
    Customers,
    RecurringObligations,
    ActivityLog,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Prospects,
        Collection::Customers,
        Collection::RecurringObligations,
        Collection::ActivityLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Prospects => "prospects",
            Collection::Customers => "customers",
            Collection::RecurringObligations => "recurringObligations",
            Collection::ActivityLog => "activityLog",
        }
    }

    /// Prefix for generated record ids.
    fn id_prefix(self) -> &'static str {
        match self {
            Collection::Prospects => "lead",
            Collection::Customers => "cust",
            Collection::RecurringObligations => "sip",
            Collection::ActivityLog => "act",
        }
    }

    fn slot(self) -> usize {
        match self {
            Collection::Prospects => 0,
            Collection::Customers => 1,
            Collection::RecurringObligations => 2,
            Collection::ActivityLog => 3,
        }
    }

    /// Value that must be unique within the collection, if any.
    pub(crate) fn unique_key(self, record: &Record) -> Option<String> {
        match self {
            Collection::Customers => record
                .get("email")
                .and_then(Value::as_str)
                .map(str::to_string),
            Collection::Prospects | Collection::RecurringObligations | Collection::ActivityLog => {
                None
            }
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown collection: {}", s))
    }
}

/// Row filter for `list` and `subscribe`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    FieldEquals { field: String, value: Value },
}

impl Filter {
    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Filter::FieldEquals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals { field, value } => record.get(field) == Some(value),
        }
    }
}

/// Persistence contract consumed by the services layer.
pub trait Store: Send + Sync {
    /// Insert `record`, assigning an id if it has none. Returns the id.
    fn create(&self, collection: Collection, record: Record) -> Result<String, StoreError>;

    /// Shallow-merge `partial` into the record. `id` is never changed.
    fn update(&self, collection: Collection, id: &str, partial: Record) -> Result<(), StoreError>;

    fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError>;

    /// Records in insertion order.
    fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    /// Snapshot stream of the collection, starting with its current contents.
    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription;

    /// Create `customer` unless its email is taken, and delete the source
    /// lead, as one atomic write.
    fn commit_conversion(&self, prospect_id: &str, customer: Record) -> Result<String, StoreError>;
}

/// Generate a record id, e.g. `cust-3f2a…`.
pub fn new_id(collection: Collection) -> String {
    format!("{}-{}", collection.id_prefix(), Uuid::new_v4())
}

/// Read the record's id, generating and inserting one if absent or empty.
pub(crate) fn ensure_id(collection: Collection, record: &mut Record) -> String {
    match record.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = new_id(collection);
            record.insert("id".to_string(), Value::String(id.clone()));
            id
        }
    }
}

/// Shallow merge used by every adapter's `update`.
pub(crate) fn merge(target: &mut Record, partial: Record) {
    for (key, value) in partial {
        if key == "id" {
            continue;
        }
        target.insert(key, value);
    }
}

/// Serialize an entity into a record.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

/// Deserialize a record into an entity.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut r = record(json!({"id": "lead-7", "name": "A"}));
        assert_eq!(ensure_id(Collection::Prospects, &mut r), "lead-7");

        let mut r = record(json!({"name": "A"}));
        let id = ensure_id(Collection::Customers, &mut r);
        assert!(id.starts_with("cust-"));
        assert_eq!(r.get("id"), Some(&Value::String(id)));
    }

    #[test]
    fn test_merge_ignores_id() {
        let mut r = record(json!({"id": "x", "status": "active", "amount": 10}));
        merge(&mut r, record(json!({"id": "y", "status": "paused"})));
        assert_eq!(r, record(json!({"id": "x", "status": "paused", "amount": 10})));
    }

    #[test]
    fn test_filter_field_equals() {
        let r = record(json!({"customerId": "cust-1"}));
        assert!(Filter::field_equals("customerId", "cust-1").matches(&r));
        assert!(!Filter::field_equals("customerId", "cust-2").matches(&r));
        assert!(Filter::All.matches(&r));
    }

    #[test]
    fn test_collection_literals() {
        for c in Collection::ALL {
            assert_eq!(c.as_str().parse::<Collection>().unwrap(), c);
        }
        assert!("leads".parse::<Collection>().is_err());
    }
}
