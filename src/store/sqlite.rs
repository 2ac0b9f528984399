//! SQLite-backed store.
//!
//! The database lives at `~/.clientdesk/clientdesk.db` unless the config
//! names another file. Records are stored as JSON bodies in one `records`
//! table; client email uniqueness is a partial unique index, so two
//! conversions racing on the same email cannot both commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;

use super::{
    ensure_id, merge, ChangeFeed, Collection, Filter, Record, SnapshotSource, Store, StoreError,
    Subscription,
};

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SnapshotSource for SqliteInner {
    fn snapshot(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn.lock();
        query_collection(&conn, collection)
    }
}

impl SqliteStore {
    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(Self::default_path()?)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// A private in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        crate::migrations::run_migrations(&conn).map_err(StoreError::Migration)?;
        Ok(Self {
            inner: Arc::new(SqliteInner {
                conn: Mutex::new(conn),
                feed: ChangeFeed::new(),
            }),
        })
    }

    /// Resolve the default database path: `~/.clientdesk/clientdesk.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeDirNotFound)?;
        Ok(home.join(".clientdesk").join("clientdesk.db"))
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.inner.conn.lock();
        run_in_transaction(&conn, f)
    }
}

/// `BEGIN IMMEDIATE` .. `COMMIT`, rolling back if `f` or the commit fails
/// so the connection never stays inside an open transaction.
fn run_in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = f(conn).and_then(|val| {
        conn.execute_batch("COMMIT")?;
        Ok(val)
    });
    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            log::warn!("Rollback failed: {}", e);
        }
    }
    result
}

fn query_collection(conn: &Connection, collection: Collection) -> Result<Vec<Record>, StoreError> {
    let mut stmt = conn.prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY seq")?;
    let bodies = stmt
        .query_map(params![collection.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    bodies.iter().map(|body| parse_body(body)).collect()
}

fn parse_body(body: &str) -> Result<Record, StoreError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

fn fetch(conn: &Connection, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;
    body.as_deref().map(parse_body).transpose()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn insert(conn: &Connection, collection: Collection, id: &str, record: &Record) -> Result<(), StoreError> {
    let unique_key = collection.unique_key(record);
    let body = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO records (collection, id, unique_key, body) VALUES (?1, ?2, ?3, ?4)",
        params![collection.as_str(), id, unique_key, body],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            StoreError::Conflict(unique_key.clone().unwrap_or_else(|| id.to_string()))
        } else {
            StoreError::Sqlite(e)
        }
    })?;
    Ok(())
}

impl Store for SqliteStore {
    fn create(&self, collection: Collection, mut record: Record) -> Result<String, StoreError> {
        let id = ensure_id(collection, &mut record);
        self.with_transaction(|conn| insert(conn, collection, &id, &record))?;
        self.inner.feed.notify(collection);
        Ok(id)
    }

    fn update(&self, collection: Collection, id: &str, partial: Record) -> Result<(), StoreError> {
        self.with_transaction(|conn| {
            let mut record = fetch(conn, collection, id)?.ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
            merge(&mut record, partial);

            let unique_key = collection.unique_key(&record);
            let body = serde_json::to_string(&record)?;
            conn.execute(
                "UPDATE records SET body = ?1, unique_key = ?2, updated_at = datetime('now')
                 WHERE collection = ?3 AND id = ?4",
                params![body, unique_key, collection.as_str(), id],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::Conflict(unique_key.clone().unwrap_or_else(|| id.to_string()))
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
            Ok(())
        })?;
        self.inner.feed.notify(collection);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let removed = self.with_transaction(|conn| {
            Ok(conn.execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
            )?)
        })?;
        if removed == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        self.inner.feed.notify(collection);
        Ok(())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.inner.conn.lock();
        fetch(&conn, collection, id)
    }

    fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let conn = self.inner.conn.lock();
        Ok(query_collection(&conn, collection)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription {
        let source: Arc<dyn SnapshotSource> = self.inner.clone();
        self.inner.feed.subscribe(collection, filter, &source)
    }

    fn commit_conversion(&self, prospect_id: &str, mut customer: Record) -> Result<String, StoreError> {
        let id = ensure_id(Collection::Customers, &mut customer);
        self.with_transaction(|conn| {
            insert(conn, Collection::Customers, &id, &customer)?;
            let removed = conn.execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                params![Collection::Prospects.as_str(), prospect_id],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound {
                    collection: Collection::Prospects,
                    id: prospect_id.to_string(),
                });
            }
            Ok(())
        })?;
        self.inner.feed.notify(Collection::Customers);
        self.inner.feed.notify(Collection::Prospects);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            SqliteStore::open_at(dir.path().join("clientdesk_test.db")).expect("open test store");
        (dir, store)
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_crud_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("desk.db");

        let id = {
            let store = SqliteStore::open_at(&path).unwrap();
            let id = store
                .create(Collection::Prospects, record(json!({"name": "Asha", "stage": "generated"})))
                .unwrap();
            store
                .update(Collection::Prospects, &id, record(json!({"stage": "kyc_started"})))
                .unwrap();
            id
        };

        let store = SqliteStore::open_at(&path).unwrap();
        let got = store.get(Collection::Prospects, &id).unwrap().unwrap();
        assert_eq!(got.get("stage"), Some(&json!("kyc_started")));
        assert_eq!(got.get("id"), Some(&json!(id)));
    }

    #[test]
    fn test_list_keeps_insertion_order_and_filters() {
        let (_dir, store) = test_store();
        for (i, customer) in ["cust-1", "cust-2", "cust-1"].iter().enumerate() {
            store
                .create(
                    Collection::RecurringObligations,
                    record(json!({"id": format!("sip-{}", i), "customerId": customer})),
                )
                .unwrap();
        }
        let mine = store
            .list(Collection::RecurringObligations, &Filter::field_equals("customerId", "cust-1"))
            .unwrap();
        let ids: Vec<&str> = mine.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["sip-0", "sip-2"]);
    }

    #[test]
    fn test_not_found_and_duplicate_id() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.delete(Collection::Customers, "ghost"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.update(Collection::Customers, "ghost", Record::new()),
            Err(StoreError::NotFound { .. })
        ));

        store.create(Collection::Prospects, record(json!({"id": "lead-1"}))).unwrap();
        assert!(matches!(
            store.create(Collection::Prospects, record(json!({"id": "lead-1"}))),
            Err(StoreError::Conflict(id)) if id == "lead-1"
        ));
    }

    #[test]
    fn test_commit_conversion_rolls_back_on_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        let lead_a = store
            .create(Collection::Prospects, record(json!({"email": "a@x.com"})))
            .unwrap();
        let lead_b = store
            .create(Collection::Prospects, record(json!({"email": "a@x.com"})))
            .unwrap();

        store
            .commit_conversion(&lead_a, record(json!({"email": "a@x.com"})))
            .unwrap();
        let err = store
            .commit_conversion(&lead_b, record(json!({"email": "a@x.com"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(key) if key == "a@x.com"));

        assert!(store.get(Collection::Prospects, &lead_a).unwrap().is_none());
        assert!(store.get(Collection::Prospects, &lead_b).unwrap().is_some());
        assert_eq!(store.list(Collection::Customers, &Filter::All).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_conversion_requires_lead() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .commit_conversion("lead-missing", record(json!({"email": "z@x.com"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.list(Collection::Customers, &Filter::All).unwrap().is_empty());
    }

    #[test]
    fn test_failed_commit_leaves_connection_usable() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .unwrap();

        // The deferred foreign key is only checked at COMMIT.
        let result = run_in_transaction(&conn, |conn| {
            conn.execute("INSERT INTO child (parent_id) VALUES (42)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(conn.is_autocommit(), "transaction must be closed");

        run_in_transaction(&conn, |conn| {
            conn.execute("INSERT INTO parent (id) VALUES (1)", [])?;
            Ok(())
        })
        .expect("next transaction can begin");
        let children: i64 = conn
            .query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, 0);
    }

    #[tokio::test]
    async fn test_subscription_sees_writes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut sub = store.subscribe(Collection::ActivityLog, Filter::All);
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store
            .create(Collection::ActivityLog, record(json!({"kind": "converted"})))
            .unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }
}
