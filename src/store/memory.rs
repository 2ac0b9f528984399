//! In-process store. Every write happens under one lock, so
//! `commit_conversion` is atomic by construction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    ensure_id, merge, ChangeFeed, Collection, Filter, Record, SnapshotSource, Store, StoreError,
    Subscription,
};

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    collections: Mutex<HashMap<Collection, Vec<Record>>>,
    feed: ChangeFeed,
}

impl SnapshotSource for MemoryInner {
    fn snapshot(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                collections: Mutex::new(HashMap::new()),
                feed: ChangeFeed::new(),
            }),
        }
    }
}

fn position(records: &[Record], id: &str) -> Option<usize> {
    records
        .iter()
        .position(|r| r.get("id").and_then(|v| v.as_str()) == Some(id))
}

/// Conflict check against every record except `skip_id`.
fn check_unique(
    collection: Collection,
    records: &[Record],
    candidate: &Record,
    skip_id: Option<&str>,
) -> Result<(), StoreError> {
    let Some(key) = collection.unique_key(candidate) else {
        return Ok(());
    };
    let taken = records.iter().any(|r| {
        let same_record = skip_id.is_some() && r.get("id").and_then(|v| v.as_str()) == skip_id;
        !same_record && collection.unique_key(r).as_deref() == Some(key.as_str())
    });
    if taken {
        return Err(StoreError::Conflict(key));
    }
    Ok(())
}

impl Store for MemoryStore {
    fn create(&self, collection: Collection, mut record: Record) -> Result<String, StoreError> {
        let id = ensure_id(collection, &mut record);
        {
            let mut collections = self.inner.collections.lock();
            let records = collections.entry(collection).or_default();
            if position(records, &id).is_some() {
                return Err(StoreError::Conflict(id));
            }
            check_unique(collection, records, &record, None)?;
            records.push(record);
        }
        self.inner.feed.notify(collection);
        Ok(id)
    }

    fn update(&self, collection: Collection, id: &str, partial: Record) -> Result<(), StoreError> {
        {
            let mut collections = self.inner.collections.lock();
            let records = collections.entry(collection).or_default();
            let idx = position(records, id).ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
            let mut merged = records[idx].clone();
            merge(&mut merged, partial);
            check_unique(collection, records, &merged, Some(id))?;
            records[idx] = merged;
        }
        self.inner.feed.notify(collection);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        {
            let mut collections = self.inner.collections.lock();
            let records = collections.entry(collection).or_default();
            let idx = position(records, id).ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
            records.remove(idx);
        }
        self.inner.feed.notify(collection);
        Ok(())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        let collections = self.inner.collections.lock();
        Ok(collections
            .get(&collection)
            .and_then(|records| position(records, id).map(|idx| records[idx].clone())))
    }

    fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let collections = self.inner.collections.lock();
        Ok(collections
            .get(&collection)
            .map(|records| records.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription {
        let source: Arc<dyn SnapshotSource> = self.inner.clone();
        self.inner.feed.subscribe(collection, filter, &source)
    }

    fn commit_conversion(&self, prospect_id: &str, mut customer: Record) -> Result<String, StoreError> {
        let id = ensure_id(Collection::Customers, &mut customer);
        {
            let mut collections = self.inner.collections.lock();

            let lead_idx = collections
                .get(&Collection::Prospects)
                .and_then(|leads| position(leads, prospect_id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: Collection::Prospects,
                    id: prospect_id.to_string(),
                })?;

            let customers = collections.entry(Collection::Customers).or_default();
            if position(customers, &id).is_some() {
                return Err(StoreError::Conflict(id));
            }
            check_unique(Collection::Customers, customers, &customer, None)?;
            customers.push(customer);

            if let Some(leads) = collections.get_mut(&Collection::Prospects) {
                leads.remove(lead_idx);
            }
        }
        self.inner.feed.notify(Collection::Customers);
        self.inner.feed.notify(Collection::Prospects);
        Ok(id)
    }
}
