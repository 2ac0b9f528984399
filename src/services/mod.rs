// Services: load a record, run one core computation, persist, log activity.
// Callers (UI commands, the CLI) go through these rather than the store.

pub mod conversion;
pub mod obligations;
pub mod prospects;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DeskError;
use crate::store::{from_record, Collection, Record, Store};

/// Build a partial record from a `json!` object literal.
pub(crate) fn patch(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Fetch and decode one record, or `NotFound`.
pub(crate) fn load<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    id: &str,
) -> Result<T, DeskError> {
    let record = store
        .get(collection, id)?
        .ok_or_else(|| DeskError::NotFound {
            collection: collection.as_str().to_string(),
            id: id.to_string(),
        })?;
    Ok(from_record(record)?)
}

/// Decode every record in a list, failing on the first malformed one.
pub(crate) fn decode_all<T: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<T>, DeskError> {
    records
        .into_iter()
        .map(|r| from_record(r).map_err(DeskError::from))
        .collect()
}
