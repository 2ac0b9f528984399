//! Snapshot subscriptions shared by the store adapters.
//!
//! Each collection has a version counter in a `tokio::sync::watch` channel.
//! Writers bump it; subscribers wake, re-read the collection and yield the
//! full snapshot. Intermediate versions may coalesce into one snapshot.

use std::sync::{Arc, Weak};

use tokio::sync::watch;

use super::{Collection, Filter, Record, StoreError};

/// Something that can read a whole collection.
pub(crate) trait SnapshotSource: Send + Sync {
    fn snapshot(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;
}

/// Per-collection change counters.
pub(crate) struct ChangeFeed {
    senders: [watch::Sender<u64>; 4],
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self {
            senders: std::array::from_fn(|_| watch::channel(0u64).0),
        }
    }

    pub(crate) fn notify(&self, collection: Collection) {
        self.senders[collection.slot()].send_modify(|version| *version += 1);
    }

    pub(crate) fn subscribe(
        &self,
        collection: Collection,
        filter: Filter,
        source: &Arc<dyn SnapshotSource>,
    ) -> Subscription {
        Subscription {
            collection,
            filter,
            source: Arc::downgrade(source),
            changes: self.senders[collection.slot()].subscribe(),
            primed: false,
        }
    }
}

/// Lazy, unbounded stream of collection snapshots.
///
/// The first [`next`](Subscription::next) yields the current contents
/// immediately; each later call waits for a write. The stream ends (`None`)
/// once the store is dropped.
pub struct Subscription {
    collection: Collection,
    filter: Filter,
    source: Weak<dyn SnapshotSource>,
    changes: watch::Receiver<u64>,
    primed: bool,
}

impl Subscription {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub async fn next(&mut self) -> Option<Result<Vec<Record>, StoreError>> {
        if self.primed && self.changes.changed().await.is_err() {
            return None;
        }
        self.primed = true;
        self.changes.borrow_and_update();

        let source = self.source.upgrade()?;
        let snapshot = source.snapshot(self.collection).map(|records| {
            records
                .into_iter()
                .filter(|record| self.filter.matches(record))
                .collect()
        });
        Some(snapshot)
    }

    /// A fresh subscription over the same collection and filter.
    pub fn restart(&self) -> Subscription {
        Subscription {
            collection: self.collection,
            filter: self.filter.clone(),
            source: self.source.clone(),
            changes: self.changes.clone(),
            primed: false,
        }
    }
}
