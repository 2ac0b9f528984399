//! Numbered schema migrations for the record table.
//!
//! SQL files are embedded with `include_str!` and applied in order. The
//! `schema_version` table holds one row per applied version; each file and
//! its version row commit together, so a failed step leaves the previous
//! version intact.

use rusqlite::{backup::Backup, Connection};

/// `(version, sql)`, ascending.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, include_str!("migrations/001_baseline.sql")),
    (2, include_str!("migrations/002_activity_entity_index.sql")),
];

fn latest_known() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

fn schema_version(conn: &Connection) -> Result<i32, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))?;

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Hot copy to `<db>.pre-migration.bak` before touching an existing file.
fn snapshot_file(conn: &Connection) -> Result<(), String> {
    let path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;
    if path.is_empty() {
        return Ok(());
    }

    let target = format!("{}.pre-migration.bak", path);
    let mut dest =
        Connection::open(&target).map_err(|e| format!("Failed to open backup file: {}", e))?;
    Backup::new(conn, &mut dest)
        .and_then(|backup| backup.step(-1).map(|_| ()))
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup written to {}", target);
    Ok(())
}

fn apply(conn: &Connection, version: i32, sql: &str) -> Result<(), String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("Migration v{} could not start: {}", version, e))?;
    tx.execute_batch(sql)
        .map_err(|e| format!("Migration v{} failed: {}", version, e))?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| format!("Failed to record migration v{}: {}", version, e))?;
    tx.commit()
        .map_err(|e| format!("Migration v{} could not commit: {}", version, e))
}

/// Bring the schema up to date. Returns how many migrations ran.
///
/// A database written by a newer build is refused rather than downgraded.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    let current = schema_version(conn)?;
    if current > latest_known() {
        return Err(format!(
            "Database schema version ({}) is newer than this version of clientdesk supports ({}). \
             Please upgrade clientdesk.",
            current,
            latest_known()
        ));
    }

    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }
    if current > 0 {
        snapshot_file(conn)?;
    }

    for (version, sql) in &pending {
        apply(conn, *version, sql)?;
        log::info!("Applied migration v{}", version);
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(conn: &Connection, collection: &str, id: &str, key: Option<&str>) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO records (collection, id, unique_key, body) VALUES (?1, ?2, ?3, '{}')",
            rusqlite::params![collection, id, key],
        )
    }

    #[test]
    fn test_fresh_db_gets_record_table_and_constraints() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        assert_eq!(run_migrations(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), 2);

        insert(&conn, "customers", "c1", Some("a@x.com")).expect("records table should exist");
        assert!(
            insert(&conn, "customers", "c2", Some("a@x.com")).is_err(),
            "unique_key must be unique per collection"
        );
        insert(&conn, "prospects", "c1", None).expect("same id in another collection is fine");
        insert(&conn, "prospects", "c2", None).expect("NULL keys never collide");
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn test_newer_database_is_refused() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        schema_version(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.contains("newer than this version"), "unexpected error: {}", err);
    }

    #[test]
    fn test_upgrade_of_existing_file_takes_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("desk.db");
        let conn = Connection::open(&db_path).expect("open db");
        schema_version(&conn).unwrap();
        apply(&conn, 1, MIGRATIONS[0].1).unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert!(dir.path().join("desk.db.pre-migration.bak").exists());
    }
}
